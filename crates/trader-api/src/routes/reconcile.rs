//! 운영자 정리(reconcile) endpoint.
//!
//! 거래소 포지션을 다시 조회하여 추적 상태를 맞추고 비정상 상태를 해제합니다.
//! 웹훅과 같은 시크릿으로 인증합니다 (헤더 서명 또는 본문 passphrase).

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use trader_core::{PositionSide, PositionState};

use crate::error::{from_execution_error, from_validation_error, ApiResult};
use crate::metrics::set_position_degraded;
use crate::state::AppState;

/// 정리 결과 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub status: String,
    /// 정리 전 추적 방향
    pub previous_side: PositionSide,
    /// 정리 전 비정상 상태 여부
    pub was_degraded: bool,
    /// 정리 후 상태
    pub state: PositionState,
}

/// POST /reconcile
pub async fn reconcile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ReconcileResponse>> {
    let signature = headers
        .get(state.signature_header())
        .and_then(|v| v.to_str().ok());

    state.validator.authenticate(&body, signature).map_err(|e| {
        warn!(error = %e, "Reconcile request rejected");
        from_validation_error(&e)
    })?;

    let previous = state.engine.tracker().read();
    let reconciled = state.engine.reconcile().await.map_err(|e| {
        warn!(error = %e, "Reconciliation failed");
        from_execution_error(&e)
    })?;

    set_position_degraded(false);
    info!(
        previous_side = %previous.side,
        side = %reconciled.side,
        "Operator reconciliation completed"
    );

    Ok(Json(ReconcileResponse {
        status: "reconciled".to_string(),
        previous_side: previous.side,
        was_degraded: previous.degraded,
        state: reconciled,
    }))
}

pub fn reconcile_router() -> Router<Arc<AppState>> {
    Router::new().route("/reconcile", post(reconcile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use rust_decimal_macros::dec;
    use tower::ServiceExt;
    use trader_exchange::{PaperConfig, PaperExchange};

    use crate::state::create_test_state_with;

    #[tokio::test]
    async fn test_reconcile_adopts_exchange_position() {
        let exchange = Arc::new(PaperExchange::new(PaperConfig::new("ETHUSDT")));
        exchange.set_position(dec!(-0.5)).await;
        let state = Arc::new(create_test_state_with(exchange));
        let app = reconcile_router().with_state(state.clone());

        let body = "{}";
        let request = Request::builder()
            .method("POST")
            .uri("/reconcile")
            .header("x-signature", state.validator.sign(body.as_bytes()))
            .body(Body::from(body))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let result: ReconcileResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(result.previous_side, PositionSide::Flat);
        assert_eq!(result.state.side, PositionSide::Short);
        assert_eq!(result.state.size, dec!(0.5));
        assert_eq!(state.engine.tracker().read().side, PositionSide::Short);
    }

    #[tokio::test]
    async fn test_reconcile_requires_auth() {
        let exchange = Arc::new(PaperExchange::new(PaperConfig::new("ETHUSDT")));
        let app = reconcile_router().with_state(Arc::new(create_test_state_with(exchange)));

        let request = Request::builder()
            .method("POST")
            .uri("/reconcile")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
