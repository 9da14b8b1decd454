pub mod bollinger;
pub mod ma_crossover;
pub mod registry;
pub mod risk_limiter;
pub mod rsi;

pub use bollinger::BollingerStrategy;
pub use ma_crossover::MaCrossoverStrategy;
pub use registry::{BarStrategy, StrategyRegistry};
pub use risk_limiter::{Decision, RejectReason, RiskLimiter};
pub use rsi::RsiStrategy;
