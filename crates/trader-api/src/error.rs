//! 통합 API 에러 응답 타입.
//!
//! 검증 에러와 실행 에러를 HTTP 상태 코드와 일관된 JSON 형식으로 변환합니다.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use trader_execution::{ExecutionError, ValidationError};

/// 통합 API 에러 응답.
///
/// # 예시
///
/// ```json
/// {
///   "code": "DEGRADED",
///   "message": "비정상 상태: close_position 완료 후 open_short 실패. 운영자 정리가 필요합니다",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "UNAUTHORIZED", "BUSY", "DEGRADED")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 타임스탬프 (Unix timestamp, 선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보를 추가합니다.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

// ==================== 에러 변환 ====================

/// 검증 에러의 HTTP 상태 코드.
pub fn validation_status(error: &ValidationError) -> StatusCode {
    if error.is_auth() {
        StatusCode::UNAUTHORIZED
    } else {
        StatusCode::BAD_REQUEST
    }
}

/// 검증 에러 코드.
pub fn validation_code(error: &ValidationError) -> &'static str {
    match error {
        ValidationError::MissingCredentials | ValidationError::InvalidSignature => "UNAUTHORIZED",
        ValidationError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
        ValidationError::UnsupportedAction(_) => "UNSUPPORTED_ACTION",
        ValidationError::InvalidTimestamp(_)
        | ValidationError::StaleSignal { .. }
        | ValidationError::FutureTimestamp { .. } => "INVALID_TIMESTAMP",
    }
}

/// 검증 에러를 API 에러로 변환합니다.
pub fn from_validation_error(error: &ValidationError) -> (StatusCode, Json<ApiErrorResponse>) {
    (
        validation_status(error),
        Json(ApiErrorResponse::new(validation_code(error), error.to_string())),
    )
}

/// 실행 에러의 HTTP 상태 코드.
pub fn execution_status(error: &ExecutionError) -> StatusCode {
    match error {
        ExecutionError::Busy { .. }
        | ExecutionError::Degraded { .. }
        | ExecutionError::PartialExecution { .. } => StatusCode::CONFLICT,
        ExecutionError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ExecutionError::Fatal { .. } => StatusCode::BAD_GATEWAY,
        ExecutionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 실행 에러를 API 에러로 변환합니다.
///
/// 부분 실행은 완료/실패 단계를 details에 포함합니다.
pub fn from_execution_error(error: &ExecutionError) -> (StatusCode, Json<ApiErrorResponse>) {
    let mut body = ApiErrorResponse::new(error.code(), error.to_string());

    match error {
        ExecutionError::PartialExecution {
            completed,
            failed,
            outcome_unknown,
            ..
        } => {
            body = body.with_details(serde_json::json!({
                "completed_steps": completed,
                "failed_step": failed,
                "outcome_unknown": outcome_unknown,
                "requires_reconciliation": true,
            }));
        }
        ExecutionError::Transient { step, source } | ExecutionError::Fatal { step, source } => {
            body = body.with_details(serde_json::json!({
                "step": step,
                "exchange_error": source.kind().as_str(),
            }));
        }
        _ => {}
    }

    (execution_status(error), Json(body))
}
