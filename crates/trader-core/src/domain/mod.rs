//! 웹훅 트레이딩 운영을 위한 도메인 모델.

mod order;
mod plan;
mod position;
mod signal;

pub use order::*;
pub use plan::*;
pub use position::*;
pub use signal::*;
