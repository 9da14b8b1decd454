//! Error taxonomy for the trading engine.
//!
//! Only [`TradingError::ReconciliationMismatch`] needs an operator before trading
//! can proceed; every other variant heals on a later tick.

use crate::events::Side;
use crate::position::LedgerError;
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while validating or loading a configuration snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more fields violate their invariants.
    #[error("invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),

    /// The source could not be read or parsed (missing, half-written, malformed).
    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// One side of a startup reconciliation that does not line up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMismatch {
    pub symbol: String,
    pub side: Side,
    /// Size the ledger believes is open (zero when the ledger has nothing).
    pub ledger_size: Decimal,
    /// Size the exchange reports (zero when the exchange has nothing).
    pub exchange_size: Decimal,
}

impl std::fmt::Display for PositionMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: ledger={} exchange={}",
            self.symbol, self.side, self.ledger_size, self.exchange_size
        )
    }
}

#[derive(Debug, Error)]
pub enum TradingError {
    /// Network failure or timeout talking to the exchange. The tick is abandoned.
    #[error("{operation} failed: {message}")]
    TransientIo {
        operation: &'static str,
        message: String,
    },

    /// Malformed configuration. The previous snapshot stays authoritative.
    #[error(transparent)]
    Validation(#[from] ConfigError),

    /// A ledger mutation was refused (unknown id, duplicate, capacity).
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Ledger and exchange disagree about open positions at startup.
    #[error("reconciliation mismatch: {}", format_mismatches(.mismatches))]
    ReconciliationMismatch { mismatches: Vec<PositionMismatch> },
}

impl TradingError {
    #[must_use]
    pub fn transient(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::TransientIo {
            operation,
            message: err.to_string(),
        }
    }

    /// Whether the loop can simply carry on at the next tick.
    #[must_use]
    pub const fn is_self_healing(&self) -> bool {
        !matches!(self, Self::ReconciliationMismatch { .. })
    }
}

fn format_mismatches(mismatches: &[PositionMismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
