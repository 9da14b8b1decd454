use crate::bot_handle::BotHandle;
use crate::commands::{EngineCommand, EngineState, EngineStatus, RunSummary};
use crate::events::EngineEvent;
use crate::market_feed::{call_exchange, MarketDataFeed};
use crate::signal_evaluator::SignalEvaluator;
use rust_decimal::Decimal;
use signal_trader_core::config::TradingConfig;
use signal_trader_core::error::{PositionMismatch, TradingError};
use signal_trader_core::events::{
    BrokerPosition, OrderEvent, OrderType, Side, SignalDirection, SignalEvent,
};
use signal_trader_core::kill_switch::{DrawdownTracker, KillSwitch};
use signal_trader_core::position::{CloseReason, OpenRequest, PositionId, PositionLedger};
use signal_trader_core::traits::{Clock, ExchangeClient, ShutdownConfirm, SignalSource};
use signal_trader_strategy::{Decision, RiskLimiter};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;

/// Everything the loop needs from the outside world.
pub struct EngineParts {
    pub exchange: Arc<dyn ExchangeClient>,
    pub signal_source: Arc<dyn SignalSource>,
    /// Fed by the config watcher; the loop only ever reads the latest snapshot.
    pub config_rx: watch::Receiver<Arc<TradingConfig>>,
    pub clock: Arc<dyn Clock>,
    pub kill_switch: KillSwitch,
}

/// Periodic trading loop. Owns the ledger and the drawdown tracker; everything
/// else is observed through channels.
pub struct ExecutionLoop {
    exchange: Arc<dyn ExchangeClient>,
    feed: MarketDataFeed,
    evaluator: SignalEvaluator,
    limiter: RiskLimiter,
    clock: Arc<dyn Clock>,

    ledger: PositionLedger,
    drawdown: DrawdownTracker,
    last_drawdown: Decimal,
    kill_switch: KillSwitch,

    config_rx: watch::Receiver<Arc<TradingConfig>>,
    rx: mpsc::Receiver<EngineCommand>,
    event_tx: broadcast::Sender<EngineEvent>,
    status_tx: watch::Sender<EngineStatus>,

    state: EngineState,
    ticks: u64,
    /// Direction whose intent is already reflected in the ledger, per symbol.
    last_acted: HashMap<String, SignalDirection>,
    last_signal: Option<SignalEvent>,
}

impl ExecutionLoop {
    /// Builds the loop and the handle used to control it.
    ///
    /// Starting capital is taken from the config snapshot current at this point
    /// and stays fixed for the life of the loop.
    #[must_use]
    pub fn new(parts: EngineParts) -> (Self, BotHandle) {
        let starting_capital = parts.config_rx.borrow().risk.total_capital;
        let (tx, rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(256);
        let (status_tx, _) = watch::channel(EngineStatus::starting(starting_capital));

        let engine = Self {
            exchange: Arc::clone(&parts.exchange),
            feed: MarketDataFeed::new(parts.exchange),
            evaluator: SignalEvaluator::new(parts.signal_source),
            limiter: RiskLimiter::new(),
            clock: parts.clock,
            ledger: PositionLedger::new(starting_capital),
            drawdown: DrawdownTracker::new(starting_capital),
            last_drawdown: Decimal::ZERO,
            kill_switch: parts.kill_switch,
            config_rx: parts.config_rx,
            rx,
            event_tx,
            status_tx,
            state: EngineState::Starting,
            ticks: 0,
            last_acted: HashMap::new(),
            last_signal: None,
        };
        (engine, BotHandle::new(tx))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<EngineStatus> {
        self.status_tx.subscribe()
    }

    #[must_use]
    pub const fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    #[must_use]
    pub const fn kill_switch(&self) -> &KillSwitch {
        &self.kill_switch
    }

    #[must_use]
    pub const fn state(&self) -> EngineState {
        self.state
    }

    /// Runs until a shutdown command arrives (or every handle is dropped), then
    /// drains.
    ///
    /// # Errors
    /// Returns `ReconciliationMismatch` if the exchange reports positions the
    /// ledger does not know about, or `TransientIo` if positions could not be
    /// fetched at startup. Per-tick failures never end the loop.
    pub async fn run(mut self, mut confirm: impl ShutdownConfirm) -> Result<RunSummary, TradingError> {
        tracing::info!("Execution loop starting");
        self.reconcile().await?;

        self.state = EngineState::Running;
        self.publish_status();

        loop {
            let interval = self.config_rx.borrow().tick_interval();
            let deadline = Instant::now() + interval;

            if let Err(e) = self.tick().await {
                self.record_tick_failure(&e);
            }
            self.publish_status();

            if self.wait_for_next_tick(deadline).await {
                break;
            }
        }

        self.drain(&mut confirm).await
    }

    /// One pass: refresh, mark to market, act on the signal (when enabled and not
    /// draining), monitor stops and targets, re-check drawdown.
    ///
    /// Stops and targets are checked on every tick with whatever prices arrived,
    /// even when the bar window or a signal order failed.
    ///
    /// # Errors
    /// The first `TransientIo` raised during the tick, returned once the tick has
    /// finished. The ledger holds only fills the exchange confirmed.
    pub async fn tick(&mut self) -> Result<(), TradingError> {
        let config = self.config_rx.borrow_and_update().clone();
        self.ticks += 1;
        let trading = config.enabled && self.state != EngineState::Draining;

        let open_symbols = self.ledger.active_symbols();
        let snapshot = self.feed.refresh(&config, &open_symbols, trading).await;
        let account = self.ledger.mark_to_market(&snapshot.latest_prices);
        self.check_drawdown(account.equity, &config);

        let mut failures = snapshot.failures;
        if trading {
            if snapshot.bars.is_empty() {
                tracing::warn!("Skipping signal for {}: no market data", config.symbol);
            } else {
                match self.evaluator.evaluate(&snapshot.bars, &config) {
                    Ok(signal) => {
                        if let Err(e) = self.act_on_signal(signal, &config).await {
                            failures.push(e);
                        }
                    }
                    Err(e) => tracing::warn!("Skipping signal for {}: {:#}", config.symbol, e),
                }
            }
        } else if !config.enabled {
            tracing::debug!("Trading disabled, monitoring exits only");
        }

        if let Err(e) = self.monitor_exits(&config).await {
            failures.push(e);
        }

        let account = self.ledger.account_state();
        self.check_drawdown(account.equity, &config);

        tracing::debug!(
            tick = self.ticks,
            equity = %account.equity,
            open = account.open_positions,
            "Tick complete"
        );
        match failures.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn act_on_signal(&mut self, signal: SignalEvent, config: &TradingConfig) -> Result<(), TradingError> {
        self.emit(EngineEvent::SignalGenerated(signal.clone()));
        self.last_signal = Some(signal.clone());

        if self.last_acted.get(&signal.symbol) == Some(&signal.direction) {
            tracing::debug!("{} signal unchanged for {}", signal.direction, signal.symbol);
            return Ok(());
        }

        let account = self.ledger.account_state();
        let active: Vec<_> = self.ledger.active_positions().cloned().collect();
        let decision = self.limiter.evaluate(
            &signal,
            &account,
            self.kill_switch.is_active(),
            &active,
            config,
        );

        match decision {
            Decision::Hold => {
                self.last_acted.insert(signal.symbol, signal.direction);
            }
            Decision::Reject { reason } => {
                tracing::warn!("{} {} rejected: {}", signal.symbol, signal.direction, reason);
                self.emit(EngineEvent::Rejected {
                    symbol: signal.symbol,
                    reason,
                });
            }
            Decision::Close {
                symbol,
                position_ids,
                reason,
            } => {
                tracing::info!(
                    "{} signal on {}: closing {} position(s)",
                    signal.direction,
                    symbol,
                    position_ids.len()
                );
                for id in position_ids {
                    self.close_position(id, reason, config).await?;
                }
                // A reversal only flattens; the next tick evaluates the new side afresh
                self.last_acted.insert(symbol, SignalDirection::Flat);
            }
            Decision::Open {
                symbol,
                side,
                size,
                entry_price,
                stop_loss,
                take_profit,
            } => {
                tracing::info!(
                    "{} signal on {}: opening {} {} @ ~{}",
                    signal.direction,
                    symbol,
                    side,
                    size,
                    entry_price
                );
                let brackets = (stop_loss, take_profit);
                self.open_position(symbol.clone(), side, size, brackets, config).await?;
                self.last_acted.insert(symbol, signal.direction);
            }
        }
        Ok(())
    }

    /// Places the entry and records the fill.
    ///
    /// `brackets` are the stop and target the size was computed against; they are
    /// kept as-is so a stop-out loses the sized risk plus execution costs.
    async fn open_position(
        &mut self,
        symbol: String,
        side: Side,
        size: Decimal,
        (stop_loss, take_profit): (Decimal, Decimal),
        config: &TradingConfig,
    ) -> Result<(), TradingError> {
        let max = config.risk.max_concurrent_trades;
        self.ledger.check_open(&symbol, side, max)?;

        let order = OrderEvent {
            symbol: symbol.clone(),
            order_type: OrderType::Market,
            direction: side.entry_direction(),
            quantity: size,
            price: None,
            reduce_only: false,
            timestamp: self.clock.now(),
        };
        self.emit(EngineEvent::OrderPlaced(order.clone()));

        let fill = call_exchange(
            "place_order",
            config.exchange_timeout(),
            self.exchange.place_order(order),
        )
        .await?;
        self.emit(EngineEvent::OrderFilled(fill.clone()));

        let position = self.ledger.open(
            OpenRequest {
                symbol,
                side,
                size: fill.quantity,
                entry_price: fill.price,
                stop_loss,
                take_profit,
                commission: fill.commission,
                opened_at: fill.timestamp,
            },
            max,
        )?;

        tracing::info!(
            "Opened {} {} {} @ {} (stop {}, target {})",
            position.id,
            position.side,
            position.symbol,
            position.entry_price,
            position.stop_loss,
            position.take_profit
        );
        self.emit(EngineEvent::PositionOpened(position));
        Ok(())
    }

    /// Sends a reduce-only market exit for `id` and records the fill.
    ///
    /// Returns `None` when the position is already closing or closed, which makes
    /// a second close path in the same tick a no-op.
    async fn close_position(
        &mut self,
        id: PositionId,
        reason: CloseReason,
        config: &TradingConfig,
    ) -> Result<Option<Decimal>, TradingError> {
        let Some(position) = self.ledger.begin_close(id)? else {
            tracing::debug!("Position {} already closing or closed", id);
            return Ok(None);
        };

        let order = OrderEvent {
            symbol: position.symbol.clone(),
            order_type: OrderType::Market,
            direction: position.side.exit_direction(),
            quantity: position.size,
            price: None,
            reduce_only: true,
            timestamp: self.clock.now(),
        };
        self.emit(EngineEvent::OrderPlaced(order.clone()));

        let fill = match call_exchange(
            "place_order",
            config.exchange_timeout(),
            self.exchange.place_order(order),
        )
        .await
        {
            Ok(fill) => fill,
            Err(e) => {
                self.ledger.abort_close(id);
                return Err(e);
            }
        };
        self.emit(EngineEvent::OrderFilled(fill.clone()));

        let pnl = self
            .ledger
            .close(id, fill.price, fill.commission, reason, fill.timestamp)?;

        tracing::info!(
            "Closed {} {} {} @ {} ({}): pnl {}",
            id,
            position.side,
            position.symbol,
            fill.price,
            reason,
            pnl
        );
        if let Some(closed) = self.ledger.get(id).cloned() {
            self.emit(EngineEvent::PositionClosed {
                position: closed,
                pnl,
            });
        }
        Ok(Some(pnl))
    }

    /// Closes every open position whose latest price crossed its stop or target.
    async fn monitor_exits(&mut self, config: &TradingConfig) -> Result<(), TradingError> {
        let exits: Vec<(PositionId, CloseReason)> = self
            .ledger
            .open_positions()
            .iter()
            .filter_map(|p| {
                let price = self.ledger.last_price(&p.symbol)?;
                p.exit_trigger(price).map(|reason| (p.id, reason))
            })
            .collect();

        let mut first_error = None;
        for (id, reason) in exits {
            if let Err(e) = self.close_position(id, reason, config).await {
                tracing::warn!("{} exit for {} failed: {}", reason, id, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn check_drawdown(&mut self, equity: Decimal, config: &TradingConfig) {
        let (drawdown, tripped) =
            self.drawdown
                .check(equity, config.risk.global_drawdown_limit, &self.kill_switch);
        self.last_drawdown = drawdown;
        if tripped {
            self.emit(EngineEvent::KillSwitchTripped {
                equity,
                peak: self.drawdown.peak(),
                drawdown,
            });
        }
    }

    fn reset_kill_switch(&mut self) {
        let equity = self.ledger.account_state().equity;
        self.kill_switch.reset();
        self.drawdown.rebase(equity);
        self.last_drawdown = Decimal::ZERO;
        tracing::warn!("Kill switch reset by operator, peak equity rebased to {}", equity);
        self.emit(EngineEvent::KillSwitchReset { equity });
        self.publish_status();
    }

    /// Compares exchange positions with the ledger before the first tick.
    async fn reconcile(&mut self) -> Result<(), TradingError> {
        let timeout = self.config_rx.borrow().exchange_timeout();

        match call_exchange("fetch_balance", timeout, self.exchange.fetch_balance()).await {
            Ok(balance) => tracing::info!("Exchange balance: {}", balance),
            Err(e) => tracing::warn!("Could not fetch balance: {}", e),
        }

        let broker = call_exchange("fetch_positions", timeout, self.exchange.fetch_positions()).await?;
        let mismatches = find_mismatches(&self.ledger, &broker);
        if !mismatches.is_empty() {
            let err = TradingError::ReconciliationMismatch { mismatches };
            tracing::error!("Refusing to trade: {}", err);
            return Err(err);
        }

        tracing::info!("Reconciled {} exchange position(s) with the ledger", broker.len());
        Ok(())
    }

    /// Waits until `deadline`, serving commands meanwhile. Returns `true` when
    /// the loop should shut down.
    async fn wait_for_next_tick(&mut self, deadline: Instant) -> bool {
        loop {
            tokio::select! {
                () = tokio::time::sleep_until(deadline) => return false,
                cmd = self.rx.recv() => match cmd {
                    Some(EngineCommand::Shutdown) => {
                        tracing::info!("Shutdown requested");
                        return true;
                    }
                    None => {
                        tracing::info!("All handles dropped, shutting down");
                        return true;
                    }
                    Some(EngineCommand::ResetKillSwitch) => self.reset_kill_switch(),
                    Some(EngineCommand::GetStatus(reply)) => {
                        let _ = reply.send(self.status());
                    }
                },
            }
        }
    }

    async fn drain(&mut self, confirm: &mut impl ShutdownConfirm) -> Result<RunSummary, TradingError> {
        self.state = EngineState::Draining;
        self.publish_status();

        // Last monitoring pass before deciding what to do with what's left
        if let Err(e) = self.tick().await {
            self.record_tick_failure(&e);
        }

        let config = self.config_rx.borrow().clone();
        let open = self.ledger.open_positions();
        let mut closed_on_shutdown = 0;

        if !open.is_empty() {
            if confirm.confirm_close_all(&open) {
                tracing::info!("Closing {} open position(s) at market", open.len());
                for position in &open {
                    match self.close_position(position.id, CloseReason::Shutdown, &config).await {
                        Ok(Some(_)) => closed_on_shutdown += 1,
                        Ok(None) => {}
                        Err(e) => tracing::error!("Failed to close {} on shutdown: {}", position.id, e),
                    }
                }
            } else {
                tracing::warn!("Leaving {} position(s) open on the exchange", open.len());
            }
        }

        self.state = EngineState::Stopped;
        self.publish_status();

        let account = self.ledger.account_state();
        let summary = RunSummary {
            ticks: self.ticks,
            final_equity: account.equity,
            realized_pnl: account.realized_pnl,
            trades_closed: self.ledger.closed_positions().count(),
            closed_on_shutdown,
            left_open: self.ledger.active_positions().cloned().collect(),
            kill_switch_active: self.kill_switch.is_active(),
        };
        tracing::info!(
            "Execution loop stopped after {} ticks: equity {}, realized {}",
            summary.ticks,
            summary.final_equity,
            summary.realized_pnl
        );
        Ok(summary)
    }

    fn record_tick_failure(&self, error: &TradingError) {
        tracing::warn!("Tick {} abandoned: {}", self.ticks, error);
        self.emit(EngineEvent::TickFailed {
            message: error.to_string(),
            timestamp: self.clock.now(),
        });
    }

    #[must_use]
    pub fn status(&self) -> EngineStatus {
        let account = self.ledger.account_state();
        EngineStatus {
            state: self.state,
            last_heartbeat: self.clock.now(),
            ticks: self.ticks,
            equity: account.equity,
            starting_capital: account.starting_capital,
            realized_pnl: account.realized_pnl,
            unrealized_pnl: account.unrealized_pnl,
            peak_equity: self.drawdown.peak(),
            drawdown: self.last_drawdown,
            kill_switch_active: self.kill_switch.is_active(),
            open_positions: self.ledger.active_positions().cloned().collect(),
            last_signal: self.last_signal.clone(),
        }
    }

    fn publish_status(&self) {
        // Ignore if no receivers
        let _ = self.status_tx.send(self.status());
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }
}

/// Per `(symbol, side)` size disagreements between the ledger and the exchange.
fn find_mismatches(ledger: &PositionLedger, broker: &[BrokerPosition]) -> Vec<PositionMismatch> {
    let mut sizes: BTreeMap<(String, Side), (Decimal, Decimal)> = BTreeMap::new();

    for position in ledger.active_positions() {
        sizes
            .entry((position.symbol.clone(), position.side))
            .or_default()
            .0 += position.size;
    }
    for position in broker.iter().filter(|p| !p.size.is_zero()) {
        sizes
            .entry((position.symbol.clone(), position.side))
            .or_default()
            .1 += position.size;
    }

    sizes
        .into_iter()
        .filter(|(_, (ledger_size, exchange_size))| ledger_size != exchange_size)
        .map(|((symbol, side), (ledger_size, exchange_size))| PositionMismatch {
            symbol,
            side,
            ledger_size,
            exchange_size,
        })
        .collect()
}
