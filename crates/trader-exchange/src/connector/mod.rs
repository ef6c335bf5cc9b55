//! 거래소 커넥터.

pub mod binance;
pub mod hyperliquid;

pub use binance::*;
pub use hyperliquid::*;
