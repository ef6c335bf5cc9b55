//! 포지션 상태 endpoint.
//!
//! 마지막으로 확인된 포지션 상태를 반환합니다. 거래소를 호출하지 않으며
//! 실행 중인 계획이 있어도 대기하지 않습니다.

use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trader_core::{PositionSide, Quantity};

use crate::state::AppState;

/// 포지션 상태 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub symbol: String,
    pub mode: String,
    /// 추적 중인 포지션 방향
    pub side: PositionSide,
    /// 추적 중인 포지션 수량
    pub size: Quantity,
    /// 비정상 상태 여부
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    /// 마지막으로 적용된 시그널 ID
    pub last_signal_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// 계획 실행 중 여부
    pub busy: bool,
}

/// GET /status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let tracked = state.engine.tracker().read();

    Json(StatusResponse {
        symbol: state.engine.exchange().symbol().to_string(),
        mode: state.mode().to_string(),
        side: tracked.side,
        size: tracked.size,
        degraded: tracked.degraded,
        degraded_reason: tracked.degraded_reason,
        last_signal_id: tracked.last_applied_signal_id,
        updated_at: tracked.updated_at,
        busy: state.engine.is_busy(),
    })
}

pub fn status_router() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use crate::state::create_test_state;

    #[tokio::test]
    async fn test_status_initially_flat() {
        let app = status_router().with_state(Arc::new(create_test_state()));

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: StatusResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(status.side, PositionSide::Flat);
        assert!(!status.degraded);
        assert!(!status.busy);
        assert_eq!(status.last_signal_id, None);
    }
}
