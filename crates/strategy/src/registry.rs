use crate::bollinger::BollingerStrategy;
use crate::ma_crossover::MaCrossoverStrategy;
use crate::rsi::RsiStrategy;
use anyhow::Result;
use signal_trader_core::events::{Bar, SignalDirection};
use signal_trader_core::traits::SignalSource;
use std::collections::HashMap;

/// A stateless indicator strategy over a bar window.
pub trait BarStrategy: Send + Sync {
    /// Identifier used in configuration, lower case.
    fn id(&self) -> &'static str;

    /// Shortest window the strategy can evaluate.
    fn min_bars(&self) -> usize;

    /// # Errors
    /// Returns an error if the window is shorter than [`min_bars`](Self::min_bars).
    fn signal(&self, bars: &[Bar]) -> Result<SignalDirection>;
}

/// [`SignalSource`] that dispatches on the configured strategy identifier.
///
/// Identifiers match case-insensitively, and the desktop app's names
/// (`Bollinger_Bands`, `Moving_Average`, `RSI`) are accepted as aliases.
pub struct StrategyRegistry {
    strategies: HashMap<&'static str, Box<dyn BarStrategy>>,
    aliases: HashMap<&'static str, &'static str>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(BollingerStrategy::default()));
        registry.register(Box::new(MaCrossoverStrategy::default()));
        registry.register(Box::new(RsiStrategy::default()));
        registry.alias("moving_average", "ma_crossover");
        registry
    }
}

impl StrategyRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    pub fn register(&mut self, strategy: Box<dyn BarStrategy>) {
        self.strategies.insert(strategy.id(), strategy);
    }

    pub fn alias(&mut self, alias: &'static str, id: &'static str) {
        self.aliases.insert(alias, id);
    }

    #[must_use]
    pub fn get(&self, strategy_id: &str) -> Option<&dyn BarStrategy> {
        let normalized = strategy_id.trim().to_ascii_lowercase();
        let id = self
            .aliases
            .get(normalized.as_str())
            .copied()
            .unwrap_or(normalized.as_str());
        self.strategies.get(id).map(|s| &**s)
    }

    /// Registered identifiers, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.strategies.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl SignalSource for StrategyRegistry {
    fn evaluate(&self, bars: &[Bar], strategy_id: &str) -> Result<SignalDirection> {
        let strategy = self.get(strategy_id).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown strategy: {}. Available: {}",
                strategy_id,
                self.ids().join(", ")
            )
        })?;
        strategy.signal(bars)
    }
}
