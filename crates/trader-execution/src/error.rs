//! 시그널 검증 및 실행 에러 타입.

use thiserror::Error;
use trader_core::ExecutionStep;
use trader_exchange::{ErrorKind, ExchangeError};

/// 시그널 검증 에러.
///
/// 검증 에러는 실행 엔진에 도달하지 않습니다.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// 서명 헤더와 passphrase가 모두 없음
    #[error("인증 정보가 없습니다")]
    MissingCredentials,

    /// 서명 또는 passphrase 불일치
    #[error("인증 실패")]
    InvalidSignature,

    /// JSON 형식 오류 또는 필수 필드 누락
    #[error("잘못된 페이로드: {0}")]
    MalformedPayload(String),

    /// buy/sell/close 이외의 액션
    #[error("지원하지 않는 액션: {0}")]
    UnsupportedAction(String),

    /// 타임스탬프 파싱 실패
    #[error("잘못된 타임스탬프: {0}")]
    InvalidTimestamp(String),

    /// 허용 범위를 벗어난 오래된 시그널
    #[error("오래된 시그널: {age_secs}초 경과 (허용 {window_secs}초)")]
    StaleSignal { age_secs: i64, window_secs: i64 },

    /// 허용 오차를 넘는 미래 타임스탬프
    #[error("미래 타임스탬프: {ahead_secs}초 앞섬")]
    FutureTimestamp { ahead_secs: i64 },
}

impl ValidationError {
    /// 인증 실패(AuthError)인지 확인합니다.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ValidationError::MissingCredentials | ValidationError::InvalidSignature
        )
    }
}

/// 실행 엔진 에러.
///
/// 엔진 내부 에러는 계획 경계에서 모두 이 타입으로 변환되어 호출자에게 전달됩니다.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// 다른 계획이 실행 중이며 대기 시간을 초과함
    #[error("다른 시그널을 처리 중입니다 ({waited_ms}ms 대기 후 포기)")]
    Busy { waited_ms: u64 },

    /// 비정상 상태로 인해 새 시그널을 거부함
    #[error("비정상 상태: {reason}. 운영자 정리가 필요합니다")]
    Degraded { reason: String },

    /// 재시도를 모두 소진한 일시적 거래소 에러
    #[error("일시적 거래소 에러 ({}): {source}", step_label(.step))]
    Transient {
        step: Option<ExecutionStep>,
        #[source]
        source: ExchangeError,
    },

    /// 재시도하지 않는 거래소 에러 (인증 실패, 주문 거부, 잔고 부족 등)
    #[error("거래소 에러 ({}): {source}", step_label(.step))]
    Fatal {
        step: Option<ExecutionStep>,
        #[source]
        source: ExchangeError,
    },

    /// 계획 일부만 실행됨. 포지션이 의도와 다를 수 있어 비정상 상태로 전환됨
    #[error("부분 실행: {failed} 실패 (완료: {completed:?}): {source}")]
    PartialExecution {
        completed: Vec<ExecutionStep>,
        failed: ExecutionStep,
        outcome_unknown: bool,
        #[source]
        source: ExchangeError,
    },

    /// 실행 태스크 실패
    #[error("내부 에러: {0}")]
    Internal(String),
}

fn step_label(step: &Option<ExecutionStep>) -> &'static str {
    step.map(|s| s.as_str()).unwrap_or("position_query")
}

impl ExecutionError {
    /// 거래소 에러를 분류에 따라 변환합니다.
    pub fn from_exchange(step: Option<ExecutionStep>, source: ExchangeError) -> Self {
        if source.is_retryable() {
            ExecutionError::Transient { step, source }
        } else {
            ExecutionError::Fatal { step, source }
        }
    }

    /// 비정상 상태와 관련된 에러인지 확인합니다.
    pub fn is_degraded(&self) -> bool {
        matches!(
            self,
            ExecutionError::Degraded { .. } | ExecutionError::PartialExecution { .. }
        )
    }

    /// 원인 거래소 에러 분류.
    pub fn exchange_kind(&self) -> Option<ErrorKind> {
        match self {
            ExecutionError::Transient { source, .. }
            | ExecutionError::Fatal { source, .. }
            | ExecutionError::PartialExecution { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// 로그/메트릭용 에러 코드.
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Busy { .. } => "BUSY",
            ExecutionError::Degraded { .. } => "DEGRADED",
            ExecutionError::Transient { .. } => "EXCHANGE_UNAVAILABLE",
            ExecutionError::Fatal { .. } => "EXCHANGE_ERROR",
            ExecutionError::PartialExecution { .. } => "PARTIAL_EXECUTION",
            ExecutionError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
