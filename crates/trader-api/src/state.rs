//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 Arc로 래핑되어 여러 요청 간에 공유됩니다.
//! 실행 엔진은 내부에서 락과 포지션 트래커를 공유하므로 복제 비용이 낮습니다.

use std::sync::Arc;

use trader_core::{AppConfig, TraderResult};
use trader_exchange::PerpExchange;
use trader_execution::{EngineConfig, ExecutionEngine, SignalValidator};

/// 애플리케이션 공유 상태.
pub struct AppState {
    /// 로드된 설정
    pub config: Arc<AppConfig>,

    /// 시그널 실행 엔진
    pub engine: ExecutionEngine,

    /// 웹훅 인증 및 파싱
    pub validator: SignalValidator,

    /// 서버 시작 시각
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// 애플리케이션 버전
    pub version: String,
}

impl AppState {
    /// 설정과 거래소로 상태를 생성합니다.
    ///
    /// 웹훅 시크릿이 비어 있으면 에러를 반환합니다.
    pub fn new(config: AppConfig, exchange: Arc<dyn PerpExchange>) -> TraderResult<Self> {
        let validator = SignalValidator::from_config(&config.webhook)?;
        let engine = ExecutionEngine::new(exchange, EngineConfig::from_app_config(&config));

        Ok(Self {
            config: Arc::new(config),
            engine,
            validator,
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }

    /// 실행 모드 ("live" | "paper").
    pub fn mode(&self) -> &'static str {
        if self.engine.exchange().is_simulated() {
            "paper"
        } else {
            "live"
        }
    }

    /// 웹훅 서명 헤더 이름.
    pub fn signature_header(&self) -> &str {
        &self.config.webhook.signature_header
    }
}

/// 테스트용 웹훅 시크릿.
#[cfg(any(test, feature = "test-utils"))]
pub const TEST_SECRET: &str = "test-webhook-secret";

/// 테스트용 AppState 생성.
///
/// 시뮬레이션 거래소(잔고 10000, 마크 가격 2000)를 사용합니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> AppState {
    create_test_state_with(Arc::new(trader_exchange::PaperExchange::new(
        trader_exchange::PaperConfig::new("ETHUSDT"),
    )))
}

/// 주어진 거래소로 테스트용 AppState 생성.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state_with(exchange: Arc<dyn PerpExchange>) -> AppState {
    let mut config = AppConfig::default();
    config.webhook.secret = Some(TEST_SECRET.to_string());

    AppState::new(config, exchange).unwrap_or_else(|e| panic!("test state: {}", e))
}
