use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use signal_trader_core::events::{FillEvent, OrderEvent, SignalEvent};
use signal_trader_core::position::Position;
use signal_trader_strategy::RejectReason;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Strategy produced a signal for the configured symbol
    SignalGenerated(SignalEvent),

    /// Risk limiter refused to open
    Rejected { symbol: String, reason: RejectReason },

    /// Order submitted to exchange
    OrderPlaced(OrderEvent),

    /// Order filled by exchange
    OrderFilled(FillEvent),

    PositionOpened(Position),

    /// Position closed (realized `PnL` net of commissions)
    PositionClosed { position: Position, pnl: Decimal },

    KillSwitchTripped {
        equity: Decimal,
        peak: Decimal,
        drawdown: Decimal,
    },

    KillSwitchReset { equity: Decimal },

    /// Tick abandoned after an exchange failure
    TickFailed {
        message: String,
        timestamp: DateTime<Utc>,
    },
}
