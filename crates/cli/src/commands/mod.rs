//! CLI commands for the signal trading engine.

pub mod run;

pub use run::{list_strategies, run_trading, RunArgs};
