//! End-to-end wiring: live config file, config watcher, execution loop and the
//! built-in strategies, against an in-memory exchange.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_trader_core::{
    Bar, BrokerPosition, CloseReason, ConfigLoader, ConfigWatcher, ExchangeClient,
    FileConfigSource, FillEvent, KillSwitch, LiveConfigUpdate, OrderEvent, Side, SystemClock,
};
use signal_trader_engine::{EngineParts, ExecutionLoop};
use signal_trader_strategy::StrategyRegistry;
use std::path::Path;
use std::sync::{Arc, Mutex};

// =============================================================================
// Helper Functions
// =============================================================================

/// Serves a fixed close series as hourly bars and fills at the last close.
struct SeriesExchange {
    closes: Mutex<Vec<Decimal>>,
}

impl SeriesExchange {
    fn new(closes: Vec<Decimal>) -> Self {
        Self {
            closes: Mutex::new(closes),
        }
    }

    fn set(&self, closes: Vec<Decimal>) {
        *self.closes.lock().unwrap() = closes;
    }

    fn last_close(&self) -> Decimal {
        *self.closes.lock().unwrap().last().unwrap()
    }
}

#[async_trait]
impl ExchangeClient for SeriesExchange {
    async fn fetch_ohlcv(&self, symbol: &str, _timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
        let closes = self.closes.lock().unwrap();
        let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let skip = closes.len().saturating_sub(limit);
        Ok(closes
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(i, &close)| Bar {
                symbol: symbol.to_string(),
                open: close,
                high: close,
                low: close,
                close,
                volume: dec!(10),
                timestamp: start + Duration::hours(i as i64),
            })
            .collect())
    }

    async fn fetch_balance(&self) -> Result<Decimal> {
        Ok(dec!(100000))
    }

    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>> {
        Ok(Vec::new())
    }

    async fn place_order(&self, order: OrderEvent) -> Result<FillEvent> {
        Ok(FillEvent {
            order_id: "fill-1".to_string(),
            symbol: order.symbol,
            direction: order.direction,
            quantity: order.quantity,
            price: self.last_close(),
            commission: Decimal::ZERO,
            timestamp: Utc::now(),
        })
    }
}

/// 60 closes climbing from 100 to 159.
fn rising() -> Vec<Decimal> {
    (100..160).map(Decimal::from).collect()
}

/// 60 closes falling from 220 to 161.
fn falling() -> Vec<Decimal> {
    (161..221).rev().map(Decimal::from).collect()
}

fn write_live(dir: &Path, update: LiveConfigUpdate) {
    ConfigLoader::update_live_file(dir, &update).unwrap();
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_live_file_drives_the_loop() {
    let dir = tempfile::tempdir().unwrap();
    write_live(
        dir.path(),
        LiveConfigUpdate {
            strategy: Some("Moving_Average".to_string()),
            symbol: Some("BTCUSDT".to_string()),
            check_interval: Some(60),
            ..Default::default()
        },
    );

    let config = ConfigLoader::load(dir.path()).unwrap();
    assert_eq!(config.strategy, "Moving_Average");
    let (watcher, config_rx) =
        ConfigWatcher::new(FileConfigSource::new(dir.path()), config).unwrap();

    let exchange = Arc::new(SeriesExchange::new(rising()));
    let (mut engine, _handle) = ExecutionLoop::new(EngineParts {
        exchange: exchange.clone(),
        signal_source: Arc::new(StrategyRegistry::default()),
        config_rx,
        clock: Arc::new(SystemClock),
        kill_switch: KillSwitch::new(),
    });

    // Uptrend opens a long
    engine.tick().await.unwrap();
    let open = engine.ledger().open_positions();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].side, Side::Long);
    assert_eq!(open[0].entry_price, dec!(159));

    // Disabled from the frontend: the downtrend is ignored
    write_live(
        dir.path(),
        LiveConfigUpdate {
            enabled: Some(false),
            ..Default::default()
        },
    );
    assert!(watcher.poll().is_some());
    exchange.set(falling());
    engine.tick().await.unwrap();
    assert_eq!(engine.ledger().active_count(), 1);

    // An invalid edit is dropped and trading stays disabled
    write_live(
        dir.path(),
        LiveConfigUpdate {
            enabled: Some(true),
            check_interval: Some(0),
            ..Default::default()
        },
    );
    assert!(watcher.poll().is_none());
    assert!(!watcher.current().enabled);
    engine.tick().await.unwrap();
    assert_eq!(engine.ledger().active_count(), 1);

    // Re-enabled: the short signal flattens the long
    write_live(
        dir.path(),
        LiveConfigUpdate {
            enabled: Some(true),
            check_interval: Some(60),
            ..Default::default()
        },
    );
    assert!(watcher.poll().is_some());
    engine.tick().await.unwrap();

    assert_eq!(engine.ledger().active_count(), 0);
    let closed: Vec<_> = engine.ledger().closed_positions().collect();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].close_reason, Some(CloseReason::Signal));
    assert!(engine.ledger().realized_pnl() > Decimal::ZERO);
}

#[tokio::test]
async fn test_short_history_skips_signal_but_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    write_live(
        dir.path(),
        LiveConfigUpdate {
            strategy: Some("ma_crossover".to_string()),
            ..Default::default()
        },
    );
    let config = ConfigLoader::load(dir.path()).unwrap();
    let (_watcher, config_rx) =
        ConfigWatcher::new(FileConfigSource::new(dir.path()), config).unwrap();

    // Ten bars is too few for a 50-bar average
    let exchange = Arc::new(SeriesExchange::new(rising()[..10].to_vec()));
    let (mut engine, _handle) = ExecutionLoop::new(EngineParts {
        exchange,
        signal_source: Arc::new(StrategyRegistry::default()),
        config_rx,
        clock: Arc::new(SystemClock),
        kill_switch: KillSwitch::new(),
    });

    engine.tick().await.unwrap();
    assert_eq!(engine.ledger().active_count(), 0);
}
