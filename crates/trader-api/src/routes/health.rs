//! 헬스 체크 endpoint.
//!
//! `/health`는 거래소 연결과 무관한 liveness probe이고,
//! `/health/ready`는 거래소 포지션 조회와 실행 엔진 상태를 확인합니다.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::state::AppState;

/// readiness 확인 시 거래소 조회 제한 시간.
const EXCHANGE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 헬스 체크 응답 구조체.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// 전체 서비스 상태 ("healthy" | "degraded" | "unhealthy")
    pub status: String,

    /// API 버전
    pub version: String,

    /// 서버 업타임(초)
    pub uptime_secs: i64,

    /// 현재 시간 (ISO 8601)
    pub timestamp: String,

    /// 개별 컴포넌트 상태
    pub components: ComponentHealth,
}

/// 개별 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// 거래소 연결 상태
    pub exchange: ComponentStatus,

    /// 실행 엔진 상태
    pub engine: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// 상태 ("up" | "down" | "degraded")
    pub status: String,

    /// 추가 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    /// 정보 포함 정상 상태.
    pub fn up(message: impl Into<String>) -> Self {
        Self {
            status: "up".to_string(),
            message: Some(message.into()),
        }
    }

    /// 비정상 상태.
    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }

    /// 동작하지만 운영자 조치가 필요한 상태.
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: "degraded".to_string(),
            message: Some(message.into()),
        }
    }
}

/// 간단한 헬스 체크 (liveness probe용).
///
/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// 상세 헬스 체크 (readiness probe용).
///
/// GET /health/ready
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let exchange = state.engine.exchange();

    let exchange_status =
        match tokio::time::timeout(EXCHANGE_PROBE_TIMEOUT, exchange.get_position()).await {
            Ok(Ok(position)) => ComponentStatus::up(format!(
                "{} {} {}",
                exchange.name(),
                position.symbol,
                position.side
            )),
            Ok(Err(e)) => ComponentStatus::down(e.to_string()),
            Err(_) => ComponentStatus::down("position query timed out"),
        };

    let tracked = state.engine.tracker().read();
    let engine_status = match tracked.degraded_reason {
        Some(reason) if tracked.degraded => ComponentStatus::degraded(reason),
        _ if tracked.degraded => ComponentStatus::degraded("reconciliation required"),
        _ => ComponentStatus::up(format!(
            "{} {}",
            tracked.side,
            if state.engine.is_busy() { "busy" } else { "idle" }
        )),
    };

    let (overall_status, status_code) = if exchange_status.status == "down" {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    } else if engine_status.status == "degraded" {
        ("degraded", StatusCode::OK)
    } else {
        ("healthy", StatusCode::OK)
    };

    let response = HealthResponse {
        status: overall_status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth {
            exchange: exchange_status,
            engine: engine_status,
        },
    };

    (status_code, Json(response))
}

/// 헬스 체크 라우터 생성.
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;
    use trader_exchange::{ExchangeError, FaultTiming, PaperConfig, PaperExchange, PaperOperation};

    use crate::state::{create_test_state, create_test_state_with};

    async fn ready(state: AppState) -> (StatusCode, HealthResponse) {
        let app = Router::new()
            .route("/health/ready", get(health_ready))
            .with_state(Arc::new(state));

        let response = app
            .oneshot(Request::builder().uri("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let app = Router::new().route("/health", get(health_check));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_ready_returns_json() {
        let (status, health) = ready(create_test_state()).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.components.exchange.status, "up");
        assert_eq!(health.components.engine.status, "up");
    }

    #[tokio::test]
    async fn test_health_ready_reports_exchange_down() {
        let exchange = Arc::new(PaperExchange::new(PaperConfig::new("ETHUSDT")));
        exchange
            .inject_fault(
                PaperOperation::GetPosition,
                FaultTiming::BeforeEffect,
                ExchangeError::NetworkError("unreachable".to_string()),
            )
            .await;

        let (status, health) = ready(create_test_state_with(exchange)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, "unhealthy");
        assert_eq!(health.components.exchange.status, "down");
    }
}
