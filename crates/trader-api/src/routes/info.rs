//! 봇 정보 endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 봇 정보 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct BotInfoResponse {
    pub name: String,
    pub version: String,
    /// 거래소 이름
    pub exchange: String,
    /// 거래 심볼
    pub symbol: String,
    /// 테스트넷 사용 여부
    pub testnet: bool,
    /// "live" | "paper"
    pub mode: String,
    pub timestamp: String,
}

/// GET /
pub async fn bot_info(State(state): State<Arc<AppState>>) -> Json<BotInfoResponse> {
    let exchange = state.engine.exchange();

    Json(BotInfoResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: state.version.clone(),
        exchange: exchange.name().to_string(),
        symbol: exchange.symbol().to_string(),
        testnet: state.config.exchange.testnet,
        mode: state.mode().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub fn info_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(bot_info))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use tower::ServiceExt;

    use crate::state::create_test_state;

    #[tokio::test]
    async fn test_bot_info() {
        let app = info_router().with_state(Arc::new(create_test_state()));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let info: BotInfoResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.exchange, "paper");
        assert_eq!(info.symbol, "ETHUSDT");
        assert_eq!(info.mode, "paper");
        assert!(info.testnet);
    }
}
