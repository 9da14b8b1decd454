use crate::events::Side;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    /// Exit order in flight.
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    Signal,
    StopLoss,
    TakeProfit,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "signal"),
            Self::StopLoss => write!(f, "stop-loss"),
            Self::TakeProfit => write!(f, "take-profit"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: String,
    pub side: Side,
    pub opened_at: DateTime<Utc>,
    pub entry_price: Decimal,
    /// Base-asset quantity, always positive.
    pub size: Decimal,
    /// Fixed at open, never moved.
    pub stop_loss: Decimal,
    /// Fixed at open, never moved.
    pub take_profit: Decimal,
    pub entry_commission: Decimal,
    pub status: PositionStatus,
    pub exit_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub closed_at: Option<DateTime<Utc>>,
    pub close_reason: Option<CloseReason>,
}

impl Position {
    /// Open or closing; still carries market risk.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, PositionStatus::Open | PositionStatus::Closing)
    }

    /// Gross P&L if the position were closed at `price`.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        match self.side {
            Side::Long => (price - self.entry_price) * self.size,
            Side::Short => (self.entry_price - price) * self.size,
        }
    }

    /// Which exit threshold `price` has crossed, stop-loss checked first.
    #[must_use]
    pub fn exit_trigger(&self, price: Decimal) -> Option<CloseReason> {
        let (stop_hit, target_hit) = match self.side {
            Side::Long => (price <= self.stop_loss, price >= self.take_profit),
            Side::Short => (price >= self.stop_loss, price <= self.take_profit),
        };
        if stop_hit {
            Some(CloseReason::StopLoss)
        } else if target_hit {
            Some(CloseReason::TakeProfit)
        } else {
            None
        }
    }
}

/// Everything needed to record a confirmed entry fill.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub symbol: String,
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub commission: Decimal,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("capacity exceeded: {open} open positions, max {max}")]
    CapacityExceeded { open: usize, max: usize },

    #[error("{symbol} {side} position already open")]
    DuplicatePosition { symbol: String, side: Side },

    #[error("unknown position {0}")]
    UnknownPosition(PositionId),
}

/// Mark-to-market view of the account derived from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub starting_capital: Decimal,
    pub equity: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub open_positions: usize,
}

/// Authoritative record of positions and P&L.
///
/// Uniqueness per `(symbol, side)` and the concurrency cap are enforced here, at
/// the point of mutation, not only when a decision is made.
#[derive(Debug, Clone)]
pub struct PositionLedger {
    starting_capital: Decimal,
    positions: BTreeMap<PositionId, Position>,
    next_id: u64,
    realized_pnl: Decimal,
    last_prices: HashMap<String, Decimal>,
}

impl PositionLedger {
    #[must_use]
    pub fn new(starting_capital: Decimal) -> Self {
        Self {
            starting_capital,
            positions: BTreeMap::new(),
            next_id: 1,
            realized_pnl: Decimal::ZERO,
            last_prices: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn starting_capital(&self) -> Decimal {
        self.starting_capital
    }

    #[must_use]
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.positions.values().filter(|p| p.is_active()).count()
    }

    pub fn active_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_active())
    }

    /// Positions in `Open` state only (not those with an exit in flight).
    #[must_use]
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Open)
            .cloned()
            .collect()
    }

    pub fn closed_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions
            .values()
            .filter(|p| p.status == PositionStatus::Closed)
    }

    #[must_use]
    pub fn get(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(&id)
    }

    #[must_use]
    pub fn find_active(&self, symbol: &str, side: Side) -> Option<&Position> {
        self.active_positions()
            .find(|p| p.symbol == symbol && p.side == side)
    }

    /// Symbols that still carry risk and therefore need a price every tick.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.active_positions().map(|p| p.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }

    /// Whether a new `(symbol, side)` position would be accepted right now.
    ///
    /// # Errors
    /// `DuplicatePosition` or `CapacityExceeded`.
    pub fn check_open(&self, symbol: &str, side: Side, max_concurrent: usize) -> Result<(), LedgerError> {
        if self.find_active(symbol, side).is_some() {
            return Err(LedgerError::DuplicatePosition {
                symbol: symbol.to_string(),
                side,
            });
        }
        let open = self.active_count();
        if open >= max_concurrent {
            return Err(LedgerError::CapacityExceeded {
                open,
                max: max_concurrent,
            });
        }
        Ok(())
    }

    /// Records a confirmed entry fill.
    ///
    /// # Errors
    /// `DuplicatePosition` or `CapacityExceeded`; the ledger is unchanged.
    pub fn open(&mut self, request: OpenRequest, max_concurrent: usize) -> Result<Position, LedgerError> {
        self.check_open(&request.symbol, request.side, max_concurrent)?;

        let id = PositionId(self.next_id);
        self.next_id += 1;

        let position = Position {
            id,
            symbol: request.symbol,
            side: request.side,
            opened_at: request.opened_at,
            entry_price: request.entry_price,
            size: request.size,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            entry_commission: request.commission,
            status: PositionStatus::Open,
            exit_price: None,
            realized_pnl: None,
            closed_at: None,
            close_reason: None,
        };
        self.last_prices
            .entry(position.symbol.clone())
            .or_insert(position.entry_price);
        self.positions.insert(id, position.clone());
        Ok(position)
    }

    /// Marks a position `Closing` before its exit order is sent.
    ///
    /// Returns `None` if the position is already closing or closed, so a second
    /// close path in the same tick becomes a no-op.
    ///
    /// # Errors
    /// `UnknownPosition`.
    pub fn begin_close(&mut self, id: PositionId) -> Result<Option<Position>, LedgerError> {
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(LedgerError::UnknownPosition(id))?;
        if position.status != PositionStatus::Open {
            return Ok(None);
        }
        position.status = PositionStatus::Closing;
        Ok(Some(position.clone()))
    }

    /// Reverts a `Closing` position to `Open` after its exit order failed.
    pub fn abort_close(&mut self, id: PositionId) {
        if let Some(position) = self.positions.get_mut(&id) {
            if position.status == PositionStatus::Closing {
                position.status = PositionStatus::Open;
            }
        }
    }

    /// Records a confirmed exit fill and returns realized P&L net of commissions.
    ///
    /// Idempotent: closing an already closed position returns the P&L realized the
    /// first time and changes nothing.
    ///
    /// # Errors
    /// `UnknownPosition`.
    pub fn close(
        &mut self,
        id: PositionId,
        exit_price: Decimal,
        commission: Decimal,
        reason: CloseReason,
        closed_at: DateTime<Utc>,
    ) -> Result<Decimal, LedgerError> {
        let position = self
            .positions
            .get_mut(&id)
            .ok_or(LedgerError::UnknownPosition(id))?;

        if let (PositionStatus::Closed, Some(pnl)) = (position.status, position.realized_pnl) {
            return Ok(pnl);
        }

        let pnl = position.unrealized_pnl(exit_price) - position.entry_commission - commission;
        position.status = PositionStatus::Closed;
        position.exit_price = Some(exit_price);
        position.realized_pnl = Some(pnl);
        position.closed_at = Some(closed_at);
        position.close_reason = Some(reason);
        self.realized_pnl += pnl;

        Ok(pnl)
    }

    #[must_use]
    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.last_prices.get(symbol).copied()
    }

    /// Updates latest prices and returns the resulting account state.
    pub fn mark_to_market(&mut self, latest_prices: &HashMap<String, Decimal>) -> AccountState {
        for (symbol, price) in latest_prices {
            self.last_prices.insert(symbol.clone(), *price);
        }
        self.account_state()
    }

    /// Account state at the last known prices. Positions without a price are
    /// marked at entry.
    #[must_use]
    pub fn account_state(&self) -> AccountState {
        let unrealized_pnl: Decimal = self
            .active_positions()
            .map(|p| {
                let price = self.last_prices.get(&p.symbol).copied().unwrap_or(p.entry_price);
                p.unrealized_pnl(price)
            })
            .sum();

        AccountState {
            starting_capital: self.starting_capital,
            equity: self.starting_capital + self.realized_pnl + unrealized_pnl,
            realized_pnl: self.realized_pnl,
            unrealized_pnl,
            open_positions: self.active_count(),
        }
    }
}
