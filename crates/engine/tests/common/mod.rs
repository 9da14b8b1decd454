//! Shared fixtures: a scripted exchange, scripted signals and canned shutdown answers.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use signal_trader_core::{
    Bar, BrokerPosition, ExchangeClient, FillEvent, KillSwitch, OrderDirection, OrderEvent,
    Position, ShutdownConfirm, SignalDirection, SignalSource, SystemClock, TradingConfig,
};
use signal_trader_engine::{BotHandle, EngineEvent, EngineParts, ExecutionLoop};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

// =============================================================================
// Mock exchange
// =============================================================================

#[derive(Default)]
struct MockState {
    prices: HashMap<String, Decimal>,
    orders: Vec<OrderEvent>,
    broker_positions: Vec<BrokerPosition>,
    fail_fetches: bool,
    fail_orders: bool,
    /// Added to buy fills and taken off sell fills.
    fill_offset: Decimal,
    fetch_delay: StdDuration,
    order_delay: StdDuration,
    /// When each `fetch_ohlcv` call started.
    fetch_times: Vec<Instant>,
}

/// Fills every order at the symbol's current price (plus any fill offset) with
/// zero commission.
#[derive(Default)]
pub struct MockExchange {
    state: Mutex<MockState>,
}

impl MockExchange {
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.lock().unwrap().prices.insert(symbol.to_string(), price);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.state.lock().unwrap().fail_fetches = fail;
    }

    pub fn fail_orders(&self, fail: bool) {
        self.state.lock().unwrap().fail_orders = fail;
    }

    pub fn set_fill_offset(&self, offset: Decimal) {
        self.state.lock().unwrap().fill_offset = offset;
    }

    pub fn set_fetch_delay(&self, delay: StdDuration) {
        self.state.lock().unwrap().fetch_delay = delay;
    }

    pub fn set_order_delay(&self, delay: StdDuration) {
        self.state.lock().unwrap().order_delay = delay;
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().fetch_times.clone()
    }

    pub fn set_broker_positions(&self, positions: Vec<BrokerPosition>) {
        self.state.lock().unwrap().broker_positions = positions;
    }

    pub fn orders(&self) -> Vec<OrderEvent> {
        self.state.lock().unwrap().orders.clone()
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn fetch_ohlcv(&self, symbol: &str, _timeframe: &str, limit: usize) -> Result<Vec<Bar>> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.fetch_times.push(Instant::now());
            state.fetch_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        if state.fail_fetches {
            bail!("connection reset by peer");
        }
        let price = *state
            .prices
            .get(symbol)
            .ok_or_else(|| anyhow!("no market for {symbol}"))?;

        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Ok((0..limit.min(5))
            .map(|i| Bar {
                symbol: symbol.to_string(),
                open: price,
                high: price,
                low: price,
                close: price,
                volume: Decimal::ONE,
                timestamp: start + Duration::hours(i as i64),
            })
            .collect())
    }

    async fn fetch_balance(&self) -> Result<Decimal> {
        Ok(dec!(100000))
    }

    async fn fetch_positions(&self) -> Result<Vec<BrokerPosition>> {
        Ok(self.state.lock().unwrap().broker_positions.clone())
    }

    async fn place_order(&self, order: OrderEvent) -> Result<FillEvent> {
        let delay = self.state.lock().unwrap().order_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.fail_orders {
            bail!("order rejected: service unavailable");
        }
        let price = match order.price {
            Some(price) => price,
            None => {
                let mid = *state
                    .prices
                    .get(&order.symbol)
                    .ok_or_else(|| anyhow!("no market for {}", order.symbol))?;
                match order.direction {
                    OrderDirection::Buy => mid + state.fill_offset,
                    OrderDirection::Sell => mid - state.fill_offset,
                }
            }
        };
        state.orders.push(order.clone());

        Ok(FillEvent {
            order_id: format!("mock-{}", state.orders.len()),
            symbol: order.symbol,
            direction: order.direction,
            quantity: order.quantity,
            price,
            commission: Decimal::ZERO,
            timestamp: Utc::now(),
        })
    }
}

// =============================================================================
// Scripted signals and shutdown answers
// =============================================================================

pub struct ScriptedSignals {
    direction: Mutex<SignalDirection>,
}

impl ScriptedSignals {
    pub fn set(&self, direction: SignalDirection) {
        *self.direction.lock().unwrap() = direction;
    }
}

impl SignalSource for ScriptedSignals {
    fn evaluate(&self, _bars: &[Bar], _strategy_id: &str) -> Result<SignalDirection> {
        Ok(*self.direction.lock().unwrap())
    }
}

/// Answers the close-all prompt the same way every time.
pub struct Answer(pub bool);

impl ShutdownConfirm for Answer {
    fn confirm_close_all(&mut self, _open_positions: &[Position]) -> bool {
        self.0
    }
}

/// Fails the test if the loop asks about open positions.
pub struct NeverAsked;

impl ShutdownConfirm for NeverAsked {
    fn confirm_close_all(&mut self, open_positions: &[Position]) -> bool {
        panic!("asked to close {} positions with none expected", open_positions.len());
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub engine: ExecutionLoop,
    pub handle: BotHandle,
    pub exchange: Arc<MockExchange>,
    pub signals: Arc<ScriptedSignals>,
    pub config_tx: watch::Sender<Arc<TradingConfig>>,
}

impl Harness {
    /// Publishes a modified copy of the current config, as the watcher would.
    pub fn update_config(&self, change: impl FnOnce(&mut TradingConfig)) {
        let mut config = TradingConfig::clone(&self.config_tx.borrow());
        change(&mut config);
        self.config_tx.send_replace(Arc::new(config));
    }
}

/// 100k capital, 0.5 fixed quantity, any symbol tradeable.
pub fn test_config() -> TradingConfig {
    let mut config = TradingConfig::default();
    config.symbol = "BTCUSDT".to_string();
    config.fixed_quantity = Some(dec!(0.5));
    config.risk.tradeable_assets.clear();
    config
}

pub fn harness(config: TradingConfig) -> Harness {
    let exchange = Arc::new(MockExchange::default());
    exchange.set_price(&config.symbol, dec!(100000));
    let signals = Arc::new(ScriptedSignals {
        direction: Mutex::new(SignalDirection::Flat),
    });
    let (config_tx, config_rx) = watch::channel(Arc::new(config));

    let (engine, handle) = ExecutionLoop::new(EngineParts {
        exchange: exchange.clone(),
        signal_source: signals.clone(),
        config_rx,
        clock: Arc::new(SystemClock),
        kill_switch: KillSwitch::new(),
    });

    Harness {
        engine,
        handle,
        exchange,
        signals,
        config_tx,
    }
}

pub fn drain_events(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
