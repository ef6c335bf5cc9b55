//! 설정 관리.
//!
//! 설정은 다음 순서로 적용되며 뒤의 값이 앞의 값을 덮어씁니다:
//! 1. 내장 기본값
//! 2. TOML 파일 (선택, 기본 `config/default.toml`)
//! 3. `TRADER__` 접두사 환경 변수 (예: `TRADER__SERVER__PORT=8080`)
//! 4. 배포 호환용 단순 환경 변수 (`WEBHOOK_SECRET`, `USE_TESTNET`, `PORT` 등)

use crate::error::{TraderError, TraderResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 거래소 설정
    pub exchange: ExchangeConfig,
    /// 웹훅 인증 설정
    pub webhook: WebhookConfig,
    /// 실행 엔진 설정
    pub execution: ExecutionConfig,
    /// 재시도 정책 설정
    pub retry: RetryConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 30,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 실거래 거래소 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeVenue {
    /// Hyperliquid 무기한 선물 (지갑 개인키 서명)
    Hyperliquid,
    /// Binance USDⓈ-M 선물 (API 키 HMAC 서명)
    Binance,
}

impl ExchangeVenue {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeVenue::Hyperliquid => "hyperliquid",
            ExchangeVenue::Binance => "binance",
        }
    }
}

impl std::fmt::Display for ExchangeVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 거래소 설정.
///
/// 자격증명이 없으면 페이퍼(시뮬레이션) 모드로 동작합니다.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// 거래소 선택. 비어 있으면 설정된 자격증명으로 결정
    pub venue: Option<ExchangeVenue>,
    /// API 키 (Binance)
    pub api_key: Option<String>,
    /// API 시크릿 (Binance)
    pub api_secret: Option<String>,
    /// 지갑 개인키 (Hyperliquid, 0x 접두사 hex)
    pub private_key: Option<String>,
    /// 시장가 주문의 허용 슬리피지 비율 (Hyperliquid IOC 지정가 계산용)
    pub slippage: Decimal,
    /// 테스트넷 사용
    pub testnet: bool,
    /// 거래 심볼
    pub symbol: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 서명 요청 유효 시간 (밀리초)
    pub recv_window: u64,
    /// REST 기본 URL 재정의
    pub base_url: Option<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            venue: None,
            api_key: None,
            api_secret: None,
            private_key: None,
            slippage: dec!(0.05),
            testnet: true,
            symbol: "ETHUSDT".to_string(),
            timeout_secs: 10,
            recv_window: 5000,
            base_url: None,
        }
    }
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("venue", &self.venue)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_secret", &self.api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("slippage", &self.slippage)
            .field("testnet", &self.testnet)
            .field("symbol", &self.symbol)
            .field("timeout_secs", &self.timeout_secs)
            .field("recv_window", &self.recv_window)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ExchangeConfig {
    /// Binance API 키와 시크릿이 모두 설정되었는지 확인합니다.
    pub fn has_api_credentials(&self) -> bool {
        is_present(&self.api_key) && is_present(&self.api_secret)
    }

    /// Hyperliquid 지갑 개인키가 설정되었는지 확인합니다.
    pub fn has_private_key(&self) -> bool {
        is_present(&self.private_key)
    }

    /// 실거래에 사용할 거래소.
    ///
    /// `venue`가 지정되면 그 거래소의 자격증명만 확인하고, 지정되지 않으면
    /// 개인키가 있으면 Hyperliquid, API 키가 있으면 Binance를 사용합니다.
    /// `None`이면 페이퍼 모드입니다.
    pub fn live_venue(&self) -> Option<ExchangeVenue> {
        match self.venue {
            Some(ExchangeVenue::Hyperliquid) => {
                self.has_private_key().then_some(ExchangeVenue::Hyperliquid)
            }
            Some(ExchangeVenue::Binance) => {
                self.has_api_credentials().then_some(ExchangeVenue::Binance)
            }
            None if self.has_private_key() => Some(ExchangeVenue::Hyperliquid),
            None if self.has_api_credentials() => Some(ExchangeVenue::Binance),
            None => None,
        }
    }
}

fn is_present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// 웹훅 인증 설정.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// 공유 시크릿
    pub secret: Option<String>,
    /// 서명 헤더 이름
    pub signature_header: String,
    /// 타임스탬프 허용 범위 (초)
    pub freshness_window_secs: u64,
    /// 미래 시각 허용 오차 (초)
    pub max_future_skew_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            signature_header: "x-signature".to_string(),
            freshness_window_secs: 300,
            max_future_skew_secs: 30,
        }
    }
}

impl std::fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("signature_header", &self.signature_header)
            .field("freshness_window_secs", &self.freshness_window_secs)
            .field("max_future_skew_secs", &self.max_future_skew_secs)
            .finish()
    }
}

/// 실행 엔진 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// 진입 시 사용할 가용 잔고 비율 (0 초과 1 이하)
    pub balance_fraction: Decimal,
    /// 레버리지 배수
    pub leverage: Decimal,
    /// 주문 수량 단위
    pub quantity_step: Decimal,
    /// 진입에 필요한 최소 가용 잔고
    pub min_balance: Decimal,
    /// 마켓 락 대기 시간 (밀리초)
    pub lock_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            balance_fraction: dec!(0.99),
            leverage: dec!(1),
            quantity_step: dec!(0.001),
            min_balance: dec!(1),
            lock_timeout_ms: 5000,
        }
    }
}

/// 재시도 정책 설정.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 단계당 최대 시도 횟수 (첫 시도 포함)
    pub max_attempts: u32,
    /// 첫 재시도 대기 시간 (밀리초)
    pub base_delay_ms: u64,
    /// 최대 대기 시간 (밀리초)
    pub max_delay_ms: u64,
    /// 지수 백오프 배수
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
            multiplier: 2.0,
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 무시합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> TraderResult<Self> {
        let builder = config::Config::builder()
            // 파일에서 로드
            .add_source(config::File::from(path.as_ref()).required(false))
            // 환경 변수로 오버라이드
            .add_source(
                config::Environment::with_prefix("TRADER")
                    .separator("__")
                    .try_parsing(true),
            );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> TraderResult<Self> {
        Self::load("config/default.toml")
    }

    /// 단순 환경 변수를 적용합니다.
    ///
    /// 조회 함수를 주입받아 테스트에서 프로세스 환경을 건드리지 않도록 합니다.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(secret) = lookup("WEBHOOK_SECRET") {
            self.webhook.secret = Some(secret);
        }
        if let Some(testnet) = lookup("USE_TESTNET") {
            self.exchange.testnet = parse_bool(&testnet);
        }
        if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse().ok()) {
            self.server.port = port;
        }
        if let Some(key) = lookup("BINANCE_API_KEY") {
            self.exchange.api_key = Some(key);
        }
        if let Some(secret) = lookup("BINANCE_API_SECRET") {
            self.exchange.api_secret = Some(secret);
        }
        if let Some(key) = lookup("HYPERLIQUID_PRIVATE_KEY") {
            self.exchange.private_key = Some(key);
        }
        if let Some(symbol) = lookup("TRADING_SYMBOL") {
            self.exchange.symbol = symbol.trim().to_uppercase();
        }
    }

    /// 설정 값의 유효성을 검사합니다.
    pub fn validate(&self) -> TraderResult<()> {
        if self.webhook.secret.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(TraderError::Config(
                "웹훅 시크릿이 설정되지 않았습니다 (WEBHOOK_SECRET)".to_string(),
            ));
        }
        if self.exchange.symbol.trim().is_empty() {
            return Err(TraderError::Config("거래 심볼이 비어 있습니다".to_string()));
        }
        if self.exchange.slippage <= Decimal::ZERO || self.exchange.slippage >= Decimal::ONE {
            return Err(TraderError::Config(format!(
                "exchange.slippage는 (0, 1) 범위여야 합니다: {}",
                self.exchange.slippage
            )));
        }

        let exec = &self.execution;
        if exec.balance_fraction <= Decimal::ZERO || exec.balance_fraction > Decimal::ONE {
            return Err(TraderError::Config(format!(
                "balance_fraction은 (0, 1] 범위여야 합니다: {}",
                exec.balance_fraction
            )));
        }
        if exec.leverage < Decimal::ONE {
            return Err(TraderError::Config(format!(
                "leverage는 1 이상이어야 합니다: {}",
                exec.leverage
            )));
        }
        if exec.quantity_step <= Decimal::ZERO {
            return Err(TraderError::Config("quantity_step은 양수여야 합니다".to_string()));
        }

        if self.retry.max_attempts == 0 {
            return Err(TraderError::Config("retry.max_attempts는 1 이상이어야 합니다".to_string()));
        }
        if self.retry.multiplier < 1.0 {
            return Err(TraderError::Config("retry.multiplier는 1.0 이상이어야 합니다".to_string()));
        }

        Ok(())
    }

    /// 실거래 모드인지 확인합니다.
    pub fn is_live(&self) -> bool {
        self.exchange.live_venue().is_some()
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
