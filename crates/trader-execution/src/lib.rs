//! 시그널 검증 및 포지션 실행.
//!
//! 이 crate는 다음을 제공합니다:
//! - 웹훅 요청 인증 및 시그널 파싱 ([`SignalValidator`])
//! - 포지션 전이표 기반 실행 계획 ([`planner::plan`])
//! - 단일 마켓 락 아래에서 계획을 실행하는 엔진 ([`ExecutionEngine`])
//! - 마지막으로 확인된 포지션 추적 ([`PositionTracker`])
//!
//! # 예제
//!
//! ```rust,ignore
//! use trader_execution::{EngineConfig, ExecutionEngine, SignalValidator};
//!
//! let validator = SignalValidator::new("secret")?;
//! let engine = ExecutionEngine::new(exchange, EngineConfig::default());
//!
//! let signal = validator.validate(body, signature, Utc::now())?;
//! let outcome = engine.execute(&signal).await?;
//! ```

pub mod engine;
pub mod error;
pub mod planner;
pub mod position_tracker;
pub mod validator;

// 주요 타입 재내보내기
pub use engine::{
    client_order_id, compute_order_size, EngineConfig, ExecutionEngine, ExecutionOutcome,
    ExecutionStatus, StepReport,
};
pub use error::{ExecutionError, ValidationError};
pub use planner::plan;
pub use position_tracker::PositionTracker;
pub use validator::SignalValidator;
