use crate::registry::BarStrategy;
use anyhow::Result;
use rust_decimal::prelude::ToPrimitive;
use signal_trader_core::events::{Bar, SignalDirection};

/// Mean reversion against Bollinger bands.
///
/// A close below the lower band signals LONG, above the upper band SHORT. The
/// last breakout is held until the opposite band is crossed; FLAT until the
/// window has seen any breakout at all.
#[derive(Debug, Clone)]
pub struct BollingerStrategy {
    window: usize,
    std_dev: f64,
}

impl Default for BollingerStrategy {
    fn default() -> Self {
        Self::new(24, 1.0)
    }
}

impl BollingerStrategy {
    /// # Panics
    ///
    /// Panics if `window < 2` (sample deviation needs two points).
    #[must_use]
    pub fn new(window: usize, std_dev: f64) -> Self {
        assert!(window >= 2, "bollinger window must be at least 2");
        Self { window, std_dev }
    }

    /// Returns `(lower, upper)` over `closes`, using the sample standard deviation.
    fn bands(&self, closes: &[f64]) -> (f64, f64) {
        let n = closes.len() as f64;
        let mean = closes.iter().sum::<f64>() / n;
        let variance = closes.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let width = variance.sqrt() * self.std_dev;
        (mean - width, mean + width)
    }
}

impl BarStrategy for BollingerStrategy {
    fn id(&self) -> &'static str {
        "bollinger_bands"
    }

    fn min_bars(&self) -> usize {
        self.window
    }

    fn signal(&self, bars: &[Bar]) -> Result<SignalDirection> {
        if bars.len() < self.window {
            anyhow::bail!("need {} bars, have {}", self.window, bars.len());
        }

        let closes = bars
            .iter()
            .map(|b| {
                b.close
                    .to_f64()
                    .ok_or_else(|| anyhow::anyhow!("close {} out of range", b.close))
            })
            .collect::<Result<Vec<f64>>>()?;

        let mut current = SignalDirection::Flat;
        for end in self.window..=closes.len() {
            let window = &closes[end - self.window..end];
            let close = window[window.len() - 1];
            let (lower, upper) = self.bands(window);
            if close < lower {
                current = SignalDirection::Long;
            } else if close > upper {
                current = SignalDirection::Short;
            }
        }

        Ok(current)
    }
}
