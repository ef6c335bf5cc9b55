//! 웹훅 수신 endpoint.
//!
//! 요청 원문과 서명 헤더를 검증한 뒤 실행 엔진에 전달합니다.
//! 검증에 실패한 요청은 엔진에 도달하지 않습니다.
//!
//! # 엔드포인트
//!
//! - `POST /webhook` - 트레이딩 시그널 수신

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use trader_core::{PositionState, TradeAction};
use trader_execution::{ExecutionError, ExecutionOutcome, ExecutionStatus, StepReport};

use crate::error::{from_execution_error, from_validation_error, validation_code, ApiResult};
use crate::metrics::{record_execution_error, record_outcome, record_signal};
use crate::state::AppState;

/// 웹훅 처리 결과 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// 항상 "success"
    pub status: String,
    /// 처리 결과 유형
    pub result: ExecutionStatus,
    pub signal_id: String,
    pub action: TradeAction,
    /// 실행 계획 (예: "short -> close_position -> open_long")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// 단계별 체결 결과
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepReport>,
    /// 처리 후 포지션 상태
    pub state: PositionState,
    /// 사람이 읽을 수 있는 결과 메시지
    pub message: String,
}

impl WebhookResponse {
    fn from_outcome(action: TradeAction, outcome: ExecutionOutcome) -> Self {
        let message = match outcome.status {
            ExecutionStatus::Applied => format!(
                "{} 시그널 처리 완료: 현재 {} {}",
                action, outcome.state.side, outcome.state.size
            ),
            ExecutionStatus::Duplicate => "이미 처리된 시그널입니다".to_string(),
            ExecutionStatus::NoOp => {
                format!("이미 {} 상태입니다. 주문 없음", outcome.state.side)
            }
        };

        Self {
            status: "success".to_string(),
            result: outcome.status,
            signal_id: outcome.signal_id,
            action,
            plan: outcome.plan.map(|p| format!("{} -> {}", p.from, p)),
            steps: outcome.steps,
            state: outcome.state,
            message,
        }
    }
}

/// 트레이딩 시그널 수신.
///
/// POST /webhook
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let signature = headers
        .get(state.signature_header())
        .and_then(|v| v.to_str().ok());

    let signal = state
        .validator
        .validate(&body, signature, chrono::Utc::now())
        .map_err(|e| {
            warn!(error = %e, code = validation_code(&e), "Webhook rejected");
            record_signal("unknown", validation_code(&e));
            from_validation_error(&e)
        })?;

    info!(
        signal_id = %signal.id,
        action = %signal.action,
        auth = ?signal.auth,
        "Signal accepted"
    );

    match state.engine.execute(&signal).await {
        Ok(outcome) => {
            record_signal(signal.action.as_str(), status_label(outcome.status));
            record_outcome(&outcome);
            Ok(Json(WebhookResponse::from_outcome(signal.action, outcome)))
        }
        Err(e) => {
            log_execution_error(&signal.id, &e);
            record_signal(signal.action.as_str(), e.code());
            record_execution_error(&e);
            Err(from_execution_error(&e))
        }
    }
}

fn status_label(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Applied => "applied",
        ExecutionStatus::Duplicate => "duplicate",
        ExecutionStatus::NoOp => "noop",
    }
}

fn log_execution_error(signal_id: &str, e: &ExecutionError) {
    if e.is_degraded() {
        error!(signal_id, code = e.code(), error = %e, "Signal failed, manual reconciliation required");
    } else {
        warn!(signal_id, code = e.code(), error = %e, "Signal failed");
    }
}

pub fn webhook_router() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", post(receive_webhook))
}
