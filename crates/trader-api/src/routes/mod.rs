//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/` - 봇 정보
//! - `/webhook` - 트레이딩 시그널 수신
//! - `/status` - 추적 중인 포지션 상태
//! - `/reconcile` - 운영자 정리 (비정상 상태 해제)
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)

pub mod health;
pub mod info;
pub mod reconcile;
pub mod status;
pub mod webhook;

pub use health::{health_router, ComponentHealth, ComponentStatus, HealthResponse};
pub use info::{info_router, BotInfoResponse};
pub use reconcile::{reconcile_router, ReconcileResponse};
pub use status::{status_router, StatusResponse};
pub use webhook::{webhook_router, WebhookResponse};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
///
/// 모든 서브 라우터를 조합하여 하나의 라우터로 반환합니다.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(info_router())
        .merge(webhook_router())
        .merge(status_router())
        .merge(reconcile_router())
        .nest("/health", health_router())
}
