use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use signal_trader_core::config::TradingConfig;
use signal_trader_core::events::{Side, SignalEvent};
use signal_trader_core::position::{AccountState, CloseReason, Position, PositionId, PositionStatus};
use signal_trader_core::position_sizing::{bracket_prices, calculate_position_size, round_quantity};
use std::fmt;

/// What the engine should do with one actionable signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Decision {
    Open {
        symbol: String,
        side: Side,
        size: Decimal,
        entry_price: Decimal,
        stop_loss: Decimal,
        take_profit: Decimal,
    },
    Close {
        symbol: String,
        position_ids: Vec<PositionId>,
        reason: CloseReason,
    },
    /// Nothing to do: already flat, or already positioned on the signalled side.
    Hold,
    Reject { reason: RejectReason },
}

impl Decision {
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    KillSwitchActive,
    CapacityExceeded { open: usize, max: usize },
    SymbolNotTradeable(String),
    InvalidPrice(Decimal),
    ZeroSize,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KillSwitchActive => write!(f, "kill switch active"),
            Self::CapacityExceeded { open, max } => {
                write!(f, "capacity exceeded ({open}/{max} positions open)")
            }
            Self::SymbolNotTradeable(symbol) => write!(f, "{symbol} is not in tradeable assets"),
            Self::InvalidPrice(price) => write!(f, "invalid entry price {price}"),
            Self::ZeroSize => write!(f, "position size rounds to zero"),
        }
    }
}

/// Turns signals into risk-bounded decisions. Stateless; everything it needs is
/// passed in, so the same inputs always give the same decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskLimiter;

impl RiskLimiter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Evaluates `signal` against the current account.
    ///
    /// # Arguments
    /// * `signal` - Actionable signal (already de-duplicated by the caller)
    /// * `account` - Mark-to-market account state; `equity` drives sizing
    /// * `kill_switch_active` - Whether the drawdown latch is set
    /// * `open_positions` - Every open position across all symbols
    /// * `config` - Snapshot in effect for this tick
    #[must_use]
    pub fn evaluate(
        &self,
        signal: &SignalEvent,
        account: &AccountState,
        kill_switch_active: bool,
        open_positions: &[Position],
        config: &TradingConfig,
    ) -> Decision {
        let on_symbol: Vec<&Position> = open_positions
            .iter()
            .filter(|p| p.symbol == signal.symbol && p.status == PositionStatus::Open)
            .collect();

        let Some(side) = signal.direction.side() else {
            if on_symbol.is_empty() {
                return Decision::Hold;
            }
            return Decision::Close {
                symbol: signal.symbol.clone(),
                position_ids: on_symbol.iter().map(|p| p.id).collect(),
                reason: CloseReason::Signal,
            };
        };

        if on_symbol.iter().any(|p| p.side == side) {
            return Decision::Hold;
        }

        if !config.hedge_mode {
            let opposite: Vec<PositionId> = on_symbol
                .iter()
                .filter(|p| p.side == side.opposite())
                .map(|p| p.id)
                .collect();
            // Reversal flattens first; the new side opens on a later tick
            if !opposite.is_empty() {
                return Decision::Close {
                    symbol: signal.symbol.clone(),
                    position_ids: opposite,
                    reason: CloseReason::Signal,
                };
            }
        }

        self.evaluate_open(signal, side, account, kill_switch_active, open_positions.len(), config)
    }

    fn evaluate_open(
        &self,
        signal: &SignalEvent,
        side: Side,
        account: &AccountState,
        kill_switch_active: bool,
        open_count: usize,
        config: &TradingConfig,
    ) -> Decision {
        let risk = &config.risk;

        if kill_switch_active {
            return reject(RejectReason::KillSwitchActive);
        }
        if !config.is_tradeable(&signal.symbol) {
            return reject(RejectReason::SymbolNotTradeable(signal.symbol.clone()));
        }
        if open_count >= risk.max_concurrent_trades {
            return reject(RejectReason::CapacityExceeded {
                open: open_count,
                max: risk.max_concurrent_trades,
            });
        }

        let entry_price = signal.price;
        if entry_price <= Decimal::ZERO {
            return reject(RejectReason::InvalidPrice(entry_price));
        }

        let (stop_loss, take_profit) =
            bracket_prices(side, entry_price, risk.stop_loss_pct, risk.take_profit_pct);

        let size = match config.fixed_quantity {
            Some(quantity) => round_quantity(quantity),
            None => match calculate_position_size(account.equity, risk.risk_per_trade, entry_price, stop_loss) {
                Ok(size) => size,
                Err(e) => {
                    tracing::debug!("Sizing failed for {}: {}", signal.symbol, e);
                    return reject(RejectReason::InvalidPrice(entry_price));
                }
            },
        };
        if size <= Decimal::ZERO {
            return reject(RejectReason::ZeroSize);
        }

        Decision::Open {
            symbol: signal.symbol.clone(),
            side,
            size,
            entry_price,
            stop_loss,
            take_profit,
        }
    }
}

const fn reject(reason: RejectReason) -> Decision {
    Decision::Reject { reason }
}
