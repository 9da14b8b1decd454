use anyhow::{anyhow, Context, Result};
use signal_trader_core::config::TradingConfig;
use signal_trader_core::events::{Bar, SignalEvent};
use signal_trader_core::traits::SignalSource;
use std::sync::Arc;

/// Turns a bar window into a [`SignalEvent`] stamped with the last bar.
pub struct SignalEvaluator {
    source: Arc<dyn SignalSource>,
}

impl SignalEvaluator {
    #[must_use]
    pub fn new(source: Arc<dyn SignalSource>) -> Self {
        Self { source }
    }

    /// # Errors
    /// Returns an error if the window is empty or the strategy cannot evaluate it.
    pub fn evaluate(&self, bars: &[Bar], config: &TradingConfig) -> Result<SignalEvent> {
        let last = bars
            .last()
            .ok_or_else(|| anyhow!("empty bar window for {}", config.symbol))?;

        let direction = self
            .source
            .evaluate(bars, &config.strategy)
            .with_context(|| format!("strategy {} failed on {}", config.strategy, config.symbol))?;

        Ok(SignalEvent {
            symbol: config.symbol.clone(),
            direction,
            price: last.close,
            timestamp: last.timestamp,
        })
    }
}
