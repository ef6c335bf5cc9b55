//! 거래소 연결 및 주문 실행 어댑터.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - PerpExchange trait: 단일 무기한 선물 마켓 인터페이스
//! - Binance USDⓈ-M 선물 커넥터 (REST)
//! - Hyperliquid 무기한 선물 커넥터 (EIP-712 서명)
//! - 시뮬레이션 거래소 (모의투자 및 테스트용)
//! - 에러 분류와 재시도 정책

pub mod connector;
pub mod error;
pub mod retry;
pub mod simulated;
pub mod traits;

pub use connector::{BinanceFuturesClient, BinanceFuturesConfig, HyperliquidClient, HyperliquidConfig};
pub use error::*;
pub use retry::{with_retry, RetryDecision, RetryPolicy};
pub use simulated::{FaultTiming, PaperConfig, PaperExchange, PaperOperation};
pub use traits::*;
