pub mod bot_handle;
pub mod commands;
pub mod events;
pub mod execution_loop;
pub mod market_feed;
pub mod signal_evaluator;

pub use bot_handle::BotHandle;
pub use commands::{EngineCommand, EngineState, EngineStatus, RunSummary};
pub use events::EngineEvent;
pub use execution_loop::{EngineParts, ExecutionLoop};
pub use market_feed::{MarketDataFeed, MarketSnapshot};
pub use signal_evaluator::SignalEvaluator;
