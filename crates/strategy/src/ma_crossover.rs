use crate::registry::BarStrategy;
use anyhow::Result;
use rust_decimal::Decimal;
use signal_trader_core::events::{Bar, SignalDirection};
use std::cmp::Ordering;

/// Trend following on two simple moving averages of the close.
///
/// LONG while the fast average is above the slow one, SHORT while below, FLAT
/// when they are equal.
#[derive(Debug, Clone)]
pub struct MaCrossoverStrategy {
    fast_period: usize,
    slow_period: usize,
}

impl Default for MaCrossoverStrategy {
    fn default() -> Self {
        Self::new(20, 50)
    }
}

impl MaCrossoverStrategy {
    /// # Panics
    ///
    /// Panics if `fast_period` is zero or not shorter than `slow_period`.
    #[must_use]
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        assert!(
            fast_period > 0 && fast_period < slow_period,
            "fast period must be non-zero and shorter than slow period"
        );
        Self {
            fast_period,
            slow_period,
        }
    }

    fn calculate_ma(bars: &[Bar]) -> Decimal {
        let sum: Decimal = bars.iter().map(|b| b.close).sum();
        sum / Decimal::from(bars.len())
    }
}

impl BarStrategy for MaCrossoverStrategy {
    fn id(&self) -> &'static str {
        "ma_crossover"
    }

    fn min_bars(&self) -> usize {
        self.slow_period
    }

    fn signal(&self, bars: &[Bar]) -> Result<SignalDirection> {
        if bars.len() < self.slow_period {
            anyhow::bail!("need {} bars, have {}", self.slow_period, bars.len());
        }

        let fast_ma = Self::calculate_ma(&bars[bars.len() - self.fast_period..]);
        let slow_ma = Self::calculate_ma(&bars[bars.len() - self.slow_period..]);

        Ok(match fast_ma.cmp(&slow_ma) {
            Ordering::Greater => SignalDirection::Long,
            Ordering::Less => SignalDirection::Short,
            Ordering::Equal => SignalDirection::Flat,
        })
    }
}
