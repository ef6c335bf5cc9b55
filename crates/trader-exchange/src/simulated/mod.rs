//! 모의투자용 시뮬레이션 거래소.
//!
//! API 자격증명이 없을 때 실제 주문 없이 봇 전체 흐름을 확인하는 데 사용합니다.
//! 메모리에 잔고, 마크 가격, 포지션을 유지하며 테스트용 장애 주입을 지원합니다.
//!
//! ```ignore
//! use trader_exchange::simulated::{PaperConfig, PaperExchange};
//!
//! let exchange = PaperExchange::new(PaperConfig::new("ETHUSDT").with_mark_price(dec!(2000)));
//! exchange.place_market_order(Side::Buy, dec!(1), "manual").await?;
//! ```

mod exchange;

pub use exchange::{FaultTiming, PaperConfig, PaperExchange, PaperOperation};
