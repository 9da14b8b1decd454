use crate::registry::BarStrategy;
use anyhow::Result;
use rust_decimal::Decimal;
use signal_trader_core::events::{Bar, SignalDirection};

/// RSI mean reversion: LONG when oversold, SHORT when overbought, FLAT between.
#[derive(Debug, Clone)]
pub struct RsiStrategy {
    period: usize,
    oversold: Decimal,
    overbought: Decimal,
}

impl Default for RsiStrategy {
    fn default() -> Self {
        Self::new(14, Decimal::from(30), Decimal::from(70))
    }
}

impl RsiStrategy {
    /// # Panics
    ///
    /// Panics if `period` is zero or the thresholds are inverted.
    #[must_use]
    pub fn new(period: usize, oversold: Decimal, overbought: Decimal) -> Self {
        assert!(period > 0, "rsi period must be non-zero");
        assert!(oversold < overbought, "oversold must be below overbought");
        Self {
            period,
            oversold,
            overbought,
        }
    }

    /// Simple-average RSI over the last `period` close-to-close changes.
    fn rsi(&self, bars: &[Bar]) -> Decimal {
        let changes = bars[bars.len() - self.period - 1..]
            .windows(2)
            .map(|w| w[1].close - w[0].close);

        let (gains, losses) = changes.fold((Decimal::ZERO, Decimal::ZERO), |(g, l), change| {
            if change > Decimal::ZERO {
                (g + change, l)
            } else {
                (g, l - change)
            }
        });

        let hundred = Decimal::ONE_HUNDRED;
        match (gains.is_zero(), losses.is_zero()) {
            (true, true) => Decimal::from(50),
            (_, true) => hundred,
            _ => {
                // Period lengths cancel in avg_gain / avg_loss
                let rs = gains / losses;
                hundred - hundred / (Decimal::ONE + rs)
            }
        }
    }
}

impl BarStrategy for RsiStrategy {
    fn id(&self) -> &'static str {
        "rsi"
    }

    fn min_bars(&self) -> usize {
        self.period + 1
    }

    fn signal(&self, bars: &[Bar]) -> Result<SignalDirection> {
        if bars.len() < self.min_bars() {
            anyhow::bail!("need {} bars, have {}", self.min_bars(), bars.len());
        }

        let rsi = self.rsi(bars);
        Ok(if rsi < self.oversold {
            SignalDirection::Long
        } else if rsi > self.overbought {
            SignalDirection::Short
        } else {
            SignalDirection::Flat
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_bars::bars_from_closes;

    #[test]
    fn steady_decline_is_oversold() {
        let closes: Vec<i64> = (80..=100).rev().collect();
        assert_eq!(
            RsiStrategy::default().signal(&bars_from_closes(&closes)).unwrap(),
            SignalDirection::Long
        );
    }

    #[test]
    fn steady_rally_is_overbought() {
        let closes: Vec<i64> = (80..=100).collect();
        assert_eq!(
            RsiStrategy::default().signal(&bars_from_closes(&closes)).unwrap(),
            SignalDirection::Short
        );
    }

    #[test]
    fn choppy_market_is_flat() {
        let closes: Vec<i64> = (0..20).map(|i| if i % 2 == 0 { 100 } else { 101 }).collect();
        assert_eq!(
            RsiStrategy::default().signal(&bars_from_closes(&closes)).unwrap(),
            SignalDirection::Flat
        );
    }

    #[test]
    fn needs_period_plus_one_bars() {
        let strategy = RsiStrategy::new(3, Decimal::from(30), Decimal::from(70));
        assert!(strategy.signal(&bars_from_closes(&[1, 2, 3])).is_err());
        assert!(strategy.signal(&bars_from_closes(&[1, 2, 3, 4])).is_ok());
    }
}
