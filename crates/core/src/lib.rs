pub mod config;
pub mod config_loader;
pub mod config_watcher;
pub mod error;
pub mod events;
pub mod interval;
pub mod kill_switch;
pub mod position;
pub mod position_sizing;
pub mod traits;

pub use config::{RiskParams, TradingConfig};
pub use config_loader::{ConfigLoader, FileConfigSource, LiveConfigFile, LiveConfigUpdate};
pub use config_watcher::ConfigWatcher;
pub use error::{ConfigError, PositionMismatch, TradingError};
pub use events::{
    Bar, BrokerPosition, FillEvent, OrderDirection, OrderEvent, OrderType, Side, SignalDirection,
    SignalEvent,
};
pub use interval::Interval;
pub use kill_switch::{DrawdownTracker, KillSwitch};
pub use position::{
    AccountState, CloseReason, LedgerError, OpenRequest, Position, PositionId, PositionLedger,
    PositionStatus,
};
pub use position_sizing::{bracket_prices, calculate_position_size, round_quantity};
pub use traits::{Clock, ConfigSource, ExchangeClient, ShutdownConfirm, SignalSource, SystemClock};
