pub mod client;
pub mod interval;
pub mod paper;

pub use client::{BybitClient, BYBIT_API};
pub use interval::bybit_code;
pub use paper::PaperExchange;
