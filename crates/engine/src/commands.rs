use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use signal_trader_core::events::SignalEvent;
use signal_trader_core::position::Position;
use tokio::sync::oneshot;

#[derive(Debug)]
pub enum EngineCommand {
    /// Begin draining: stop opening, ask about open positions, then exit.
    Shutdown,
    /// Operator override after a drawdown breach.
    ResetKillSwitch,
    GetStatus(oneshot::Sender<EngineStatus>),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub last_heartbeat: DateTime<Utc>,
    pub ticks: u64,

    pub equity: Decimal,
    pub starting_capital: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub peak_equity: Decimal,
    pub drawdown: Decimal,
    pub kill_switch_active: bool,

    pub open_positions: Vec<Position>,
    pub last_signal: Option<SignalEvent>,
}

impl EngineStatus {
    #[must_use]
    pub fn starting(starting_capital: Decimal) -> Self {
        Self {
            state: EngineState::Starting,
            last_heartbeat: Utc::now(),
            ticks: 0,
            equity: starting_capital,
            starting_capital,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            peak_equity: starting_capital,
            drawdown: Decimal::ZERO,
            kill_switch_active: false,
            open_positions: Vec::new(),
            last_signal: None,
        }
    }
}

/// What the loop hands back once it has stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub ticks: u64,
    pub final_equity: Decimal,
    pub realized_pnl: Decimal,
    pub trades_closed: usize,
    pub closed_on_shutdown: usize,
    /// Positions still open when the loop exited (operator declined to close, or a close failed).
    pub left_open: Vec<Position>,
    pub kill_switch_active: bool,
}
