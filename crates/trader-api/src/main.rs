//! 웹훅 트레이딩 봇 서버.
//!
//! 설정을 로드하고 거래소 어댑터를 선택한 뒤 Axum 서버를 시작합니다.
//! 거래소 자격증명이 없으면 시뮬레이션 거래소로 동작합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use trader_api::metrics::{set_position_degraded, setup_metrics_recorder};
use trader_api::middleware::metrics_layer;
use trader_api::routes::create_api_router;
use trader_api::state::AppState;
use trader_core::logging::{init_logging, LogConfig};
use trader_core::{AppConfig, ExchangeVenue};
use trader_exchange::{
    BinanceFuturesClient, BinanceFuturesConfig, HyperliquidClient, HyperliquidConfig, PaperConfig,
    PaperExchange, PerpExchange,
};

/// 설정 파일 경로 환경 변수.
const CONFIG_PATH_ENV: &str = "TRADER_CONFIG";

/// 기본 설정 파일 경로.
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// 종료 시 실행 중인 계획을 기다리는 최대 시간.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// 설정 로드.
///
/// `TRADER_CONFIG`로 파일 경로를 바꿀 수 있습니다.
fn load_config() -> anyhow::Result<AppConfig> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    AppConfig::load(&path).with_context(|| format!("설정 로드 실패: {}", path))
}

/// 거래소 어댑터 선택.
///
/// 개인키가 있으면 Hyperliquid, API 키와 시크릿이 있으면 Binance 선물을 사용하고
/// (`exchange.venue`로 고정 가능), 둘 다 없으면 시뮬레이션 거래소를 사용합니다.
fn build_exchange(config: &AppConfig) -> anyhow::Result<Arc<dyn PerpExchange>> {
    let exchange = &config.exchange;
    match exchange.live_venue() {
        Some(ExchangeVenue::Hyperliquid) => {
            let hyperliquid = HyperliquidConfig::from_app_config(exchange)
                .context("Hyperliquid 개인키가 설정되지 않았습니다")?;
            let base_url = hyperliquid.rest_base_url().to_string();
            let client = HyperliquidClient::new(hyperliquid).context("Hyperliquid 클라이언트 생성 실패")?;
            info!(
                symbol = %exchange.symbol,
                wallet = %client.wallet_address(),
                testnet = exchange.testnet,
                base_url = %base_url,
                "Using Hyperliquid perpetual exchange"
            );
            Ok(Arc::new(client))
        }
        Some(ExchangeVenue::Binance) => {
            let binance = BinanceFuturesConfig::from_app_config(exchange)
                .context("Binance API 자격증명이 설정되지 않았습니다")?;
            let base_url = binance.rest_base_url().to_string();
            let client = BinanceFuturesClient::new(binance).context("Binance 클라이언트 생성 실패")?;
            info!(
                symbol = %exchange.symbol,
                testnet = exchange.testnet,
                base_url = %base_url,
                "Using Binance futures exchange"
            );
            Ok(Arc::new(client))
        }
        None => {
            if let Some(venue) = exchange.venue {
                warn!(venue = %venue, "Credentials for selected venue not set");
            }
            warn!(
                symbol = %exchange.symbol,
                "Exchange credentials not set, running in paper mode"
            );
            Ok(Arc::new(PaperExchange::new(PaperConfig::new(
                exchange.symbol.clone(),
            ))))
        }
    }
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
    request_timeout: Duration,
) -> Router {
    let mut router = Router::new().merge(create_api_router().with_state(state));

    // 메트릭 라우터 (별도 상태)
    if let Some(handle) = metrics_handle {
        router = router.merge(
            Router::new()
                .route("/metrics", get(metrics_handler))
                .with_state(handle),
        );
    }

    router
        // 메트릭 미들웨어 (모든 요청에 적용)
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        // 전역 타임아웃 - 408 상태 코드 반환. 실행 중인 계획은 별도 태스크에서 완료됨
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = load_config()?;

    init_logging(LogConfig::from_settings(&config.logging)).context("로깅 초기화 실패")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting webhook trading bot...");

    // Prometheus 메트릭 레코더 설정 (실패해도 서버는 동작)
    let metrics_handle = match setup_metrics_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics recorder initialized");
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Failed to install metrics recorder, /metrics disabled");
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "소켓 주소가 유효하지 않습니다: {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);

    let exchange = build_exchange(&config)?;
    let state = Arc::new(AppState::new(config, exchange).context("애플리케이션 상태 생성 실패")?);

    // 시작 시 거래소 포지션으로 추적 상태 초기화
    match state.engine.reconcile().await {
        Ok(position) => {
            set_position_degraded(false);
            info!(side = %position.side, size = %position.size, "Initial position loaded");
        }
        Err(e) => {
            warn!(error = %e, "Initial position query failed, tracked state starts flat");
        }
    }

    info!(
        mode = state.mode(),
        exchange = state.engine.exchange().name(),
        symbol = state.engine.exchange().symbol(),
        "Application state initialized"
    );

    let app = create_router(state.clone(), metrics_handle, request_timeout);

    info!(%addr, "Webhook server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("바인딩 실패: {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("서버 실행 실패")?;

    // 요청이 끊겨도 계획은 별도 태스크에서 진행되므로 끝날 때까지 대기
    info!("Server shutdown initiated, waiting for in-flight plan...");
    if !state.engine.wait_idle(SHUTDOWN_DRAIN_TIMEOUT).await {
        error!("In-flight plan did not finish before shutdown, reconcile on next start");
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 반환합니다.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
