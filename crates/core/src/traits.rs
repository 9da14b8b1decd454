use crate::config::TradingConfig;
use crate::error::ConfigError;
use crate::events::{Bar, BrokerPosition, FillEvent, OrderEvent, SignalDirection};
use crate::position::Position;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Exchange connectivity. Possibly slow, possibly failing, and never assumed
/// to place orders idempotently.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Most recent `limit` bars, oldest first.
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Bar>>;

    async fn fetch_balance(&self) -> Result<Decimal>;

    /// Only used to reconcile against the ledger at startup.
    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>>;

    async fn place_order(&self, order: OrderEvent) -> Result<FillEvent>;
}

/// Strategy evaluation over a bar window.
pub trait SignalSource: Send + Sync {
    /// # Errors
    /// Returns an error if `strategy_id` is unknown or the window cannot be evaluated.
    fn evaluate(&self, bars: &[Bar], strategy_id: &str) -> Result<SignalDirection>;
}

/// The "close all positions before exiting?" question asked once during shutdown.
pub trait ShutdownConfirm: Send {
    fn confirm_close_all(&mut self, open_positions: &[Position]) -> bool;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Where configuration snapshots come from.
pub trait ConfigSource: Send + Sync {
    /// Reads and parses a full snapshot. Validation happens in the watcher.
    ///
    /// # Errors
    /// Returns `ConfigError::Load` if the source is unreadable or malformed.
    fn load(&self) -> Result<TradingConfig, ConfigError>;

    /// File whose modification should trigger an early poll, if any.
    fn watch_path(&self) -> Option<PathBuf> {
        None
    }
}
