//! # Trader Core
//!
//! 웹훅 트레이딩 봇의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 시스템 전반에서 사용되는 기본 타입을 제공합니다:
//! - 웹훅 시그널과 액션
//! - 포지션 상태 및 거래소 포지션 스냅샷
//! - 실행 계획 (청산/진입 단계)
//! - 주문 결과
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
pub use types::*;
