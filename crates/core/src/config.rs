use crate::error::ConfigError;
use crate::interval::Interval;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable snapshot of every parameter the engine reads during a tick.
///
/// Snapshots are replaced wholesale by the config watcher and shared as
/// `Arc<TradingConfig>`; nothing mutates one after it has been published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    pub timeframe: String,
    pub strategy: String,
    pub symbol: String,
    /// Seconds between trading ticks.
    pub check_interval: u64,
    pub enabled: bool,

    /// Allow a LONG and a SHORT on the same symbol at once.
    pub hedge_mode: bool,
    /// Fixed base-asset quantity; `None` sizes from risk.
    pub fixed_quantity: Option<Decimal>,
    /// Number of bars requested per market data refresh.
    pub bar_limit: usize,
    /// Bound on every exchange call, in seconds.
    pub exchange_timeout_secs: u64,
    /// Seconds between config polls.
    pub config_poll_secs: u64,

    /// Stamped by whoever wrote the live file. Observability only.
    pub last_updated: Option<DateTime<Utc>>,

    pub risk: RiskParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskParams {
    pub total_capital: Decimal,
    /// Fraction of equity lost if a stop-loss fills.
    pub risk_per_trade: Decimal,
    pub max_concurrent_trades: usize,
    /// Drawdown fraction that trips the kill switch.
    pub global_drawdown_limit: Decimal,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    /// Empty means every symbol is tradeable.
    pub tradeable_assets: Vec<String>,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            timeframe: "1h".to_string(),
            strategy: "bollinger_bands".to_string(),
            symbol: "BTCUSDT".to_string(),
            check_interval: 60,
            enabled: true,
            hedge_mode: false,
            fixed_quantity: None,
            bar_limit: 500,
            exchange_timeout_secs: 10,
            config_poll_secs: 30,
            last_updated: None,
            risk: RiskParams::default(),
        }
    }
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            total_capital: dec!(100000),
            risk_per_trade: dec!(0.01),
            max_concurrent_trades: 5,
            global_drawdown_limit: dec!(0.20),
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.04),
            tradeable_assets: Vec::new(),
        }
    }
}

impl TradingConfig {
    /// Checks every field and reports all violations at once.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` listing each field that breaks its invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.timeframe.trim().is_empty() {
            problems.push("timeframe must not be empty".to_string());
        } else if let Err(e) = self.timeframe.parse::<Interval>() {
            problems.push(e.to_string());
        }
        if self.strategy.trim().is_empty() {
            problems.push("strategy must not be empty".to_string());
        }
        if self.symbol.trim().is_empty() {
            problems.push("symbol must not be empty".to_string());
        }
        if self.check_interval < 1 {
            problems.push("check_interval must be >= 1 second".to_string());
        }
        if self.bar_limit < 1 {
            problems.push("bar_limit must be >= 1".to_string());
        }
        if self.exchange_timeout_secs < 1 {
            problems.push("exchange_timeout_secs must be >= 1".to_string());
        }
        if self.config_poll_secs < 1 {
            problems.push("config_poll_secs must be >= 1".to_string());
        }
        if let Some(quantity) = self.fixed_quantity {
            if quantity <= Decimal::ZERO {
                problems.push(format!("fixed_quantity must be > 0, got {quantity}"));
            }
        }

        let risk = &self.risk;
        if risk.total_capital <= Decimal::ZERO {
            problems.push(format!("total_capital must be > 0, got {}", risk.total_capital));
        }
        if !in_unit_interval(risk.risk_per_trade) {
            problems.push(format!(
                "risk_per_trade must be in (0, 1], got {}",
                risk.risk_per_trade
            ));
        }
        if risk.max_concurrent_trades < 1 {
            problems.push("max_concurrent_trades must be >= 1".to_string());
        }
        if !in_unit_interval(risk.global_drawdown_limit) {
            problems.push(format!(
                "global_drawdown_limit must be in (0, 1], got {}",
                risk.global_drawdown_limit
            ));
        }
        if risk.stop_loss_pct <= Decimal::ZERO || risk.stop_loss_pct >= Decimal::ONE {
            problems.push(format!(
                "stop_loss_pct must be in (0, 1), got {}",
                risk.stop_loss_pct
            ));
        }
        if risk.take_profit_pct <= Decimal::ZERO || risk.take_profit_pct >= Decimal::ONE {
            problems.push(format!(
                "take_profit_pct must be in (0, 1), got {}",
                risk.take_profit_pct
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    #[must_use]
    pub const fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }

    /// Equality that ignores `last_updated`, so a re-stamped but otherwise
    /// identical file does not count as a change.
    #[must_use]
    pub fn same_settings(&self, other: &Self) -> bool {
        let mut a = self.clone();
        a.last_updated = None;
        let mut b = other.clone();
        b.last_updated = None;
        a == b
    }

    #[must_use]
    pub fn is_tradeable(&self, symbol: &str) -> bool {
        self.risk.tradeable_assets.is_empty()
            || self.risk.tradeable_assets.iter().any(|s| s == symbol)
    }

    /// Human-readable list of the settings that differ from `previous`.
    #[must_use]
    pub fn describe_changes(&self, previous: &Self) -> Vec<String> {
        let mut changes = Vec::new();
        if self.timeframe != previous.timeframe {
            changes.push(format!("timeframe {} -> {}", previous.timeframe, self.timeframe));
        }
        if self.strategy != previous.strategy {
            changes.push(format!("strategy {} -> {}", previous.strategy, self.strategy));
        }
        if self.symbol != previous.symbol {
            changes.push(format!("symbol {} -> {}", previous.symbol, self.symbol));
        }
        if self.check_interval != previous.check_interval {
            changes.push(format!(
                "check_interval {}s -> {}s",
                previous.check_interval, self.check_interval
            ));
        }
        if self.enabled != previous.enabled {
            changes.push(format!("enabled {} -> {}", previous.enabled, self.enabled));
        }
        if self.hedge_mode != previous.hedge_mode {
            changes.push(format!("hedge_mode {} -> {}", previous.hedge_mode, self.hedge_mode));
        }
        if self.fixed_quantity != previous.fixed_quantity {
            changes.push(format!(
                "fixed_quantity {:?} -> {:?}",
                previous.fixed_quantity, self.fixed_quantity
            ));
        }
        if self.risk != previous.risk {
            changes.push("risk parameters".to_string());
        }
        if changes.is_empty() && !self.same_settings(previous) {
            changes.push("tuning parameters".to_string());
        }
        changes
    }
}

fn in_unit_interval(value: Decimal) -> bool {
    value > Decimal::ZERO && value <= Decimal::ONE
}
