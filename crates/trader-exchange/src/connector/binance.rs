//! Binance USDⓈ-M 선물 커넥터.
//!
//! 단일 심볼에 대한 포지션 조회, 잔고 조회, 시장가 주문만 구현합니다.
//! 메인넷과 테스트넷 모두 지원하며, 계정은 단방향(one-way) 포지션 모드를 가정합니다.

use crate::traits::{ExchangeResult, PerpExchange};
use crate::{ErrorKind, ExchangeError};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use trader_core::{ExchangeConfig, OrderResult, PositionSnapshot, Quantity, Side};

type HmacSha256 = Hmac<Sha256>;

const MAINNET_URL: &str = "https://fapi.binance.com";
const TESTNET_URL: &str = "https://testnet.binancefuture.com";

/// 증거금 자산.
const MARGIN_ASSET: &str = "USDT";

/// 조회 요청의 전송 실패 시 재시도 전 대기 시간.
const READ_RETRY_DELAY: Duration = Duration::from_millis(200);

// ============================================================================
// 설정
// ============================================================================

/// Binance 선물 클라이언트 설정.
///
/// # 보안
/// - `Debug` 구현은 민감 정보(`api_key`, `api_secret`)를 마스킹합니다.
pub struct BinanceFuturesConfig {
    /// API 키
    pub api_key: String,
    /// API 시크릿
    pub api_secret: SecretString,
    /// 테스트넷 사용
    pub testnet: bool,
    /// 거래 심볼 (예: ETHUSDT)
    pub symbol: String,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 수신 윈도우 (밀리초)
    pub recv_window: u64,
    /// REST 기본 URL 재정의
    pub base_url: Option<String>,
}

impl fmt::Debug for BinanceFuturesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceFuturesConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("api_secret", &"***REDACTED***")
            .field("testnet", &self.testnet)
            .field("symbol", &self.symbol)
            .field("timeout_secs", &self.timeout_secs)
            .field("recv_window", &self.recv_window)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// 로그용 API 키 마스킹. 앞뒤 4글자만 남깁니다.
fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "***REDACTED***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

impl BinanceFuturesConfig {
    /// 새 설정 생성.
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: SecretString::from(api_secret.into()),
            testnet: false,
            symbol: symbol.into().to_uppercase(),
            timeout_secs: 10,
            recv_window: 5000,
            base_url: None,
        }
    }

    /// 테스트넷 사용.
    pub fn with_testnet(mut self, testnet: bool) -> Self {
        self.testnet = testnet;
        self
    }

    /// REST 기본 URL 재정의.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// 애플리케이션 설정에서 생성. 자격증명이 없으면 `None`.
    pub fn from_app_config(config: &ExchangeConfig) -> Option<Self> {
        if !config.has_api_credentials() {
            return None;
        }
        let api_key = config.api_key.as_deref()?.trim();
        let api_secret = config.api_secret.as_deref()?.trim();

        Some(Self {
            api_key: api_key.to_string(),
            api_secret: SecretString::from(api_secret.to_string()),
            testnet: config.testnet,
            symbol: config.symbol.to_uppercase(),
            timeout_secs: config.timeout_secs,
            recv_window: config.recv_window,
            base_url: config.base_url.clone(),
        })
    }

    /// REST API 기본 URL 반환.
    pub fn rest_base_url(&self) -> &str {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/'),
            None if self.testnet => TESTNET_URL,
            None => MAINNET_URL,
        }
    }
}

// ============================================================================
// API 응답 타입
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesPositionRisk {
    symbol: String,
    position_amt: String,
    entry_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesBalance {
    asset: String,
    available_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    mark_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FuturesOrderResponse {
    order_id: i64,
    status: String,
    executed_qty: String,
    avg_price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BinanceError {
    code: i64,
    msg: String,
}

// ============================================================================
// Binance 선물 클라이언트
// ============================================================================

/// Binance USDⓈ-M 선물 클라이언트.
pub struct BinanceFuturesClient {
    config: BinanceFuturesConfig,
    client: Client,
}

impl BinanceFuturesClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(config: BinanceFuturesConfig) -> ExchangeResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ExchangeError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e))
            })?;

        info!(
            symbol = %config.symbol,
            testnet = config.testnet,
            base_url = config.rest_base_url(),
            "Binance futures client created"
        );

        Ok(Self { config, client })
    }

    /// 현재 타임스탬프(밀리초) 반환.
    fn timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// 쿼리 문자열에 HMAC-SHA256 서명.
    fn sign(&self, query: &str) -> ExchangeResult<String> {
        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.expose_secret().as_bytes())
            .map_err(|e| ExchangeError::Unauthorized(format!("잘못된 API 시크릿: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// 파라미터에서 쿼리 문자열 생성.
    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// 타임스탬프와 서명이 포함된 쿼리 생성.
    fn signed_query(&self, params: &[(&str, String)]) -> ExchangeResult<String> {
        let mut all_params = params.to_vec();
        all_params.push(("timestamp", Self::timestamp_ms().to_string()));
        all_params.push(("recvWindow", self.config.recv_window.to_string()));

        let query = Self::build_query(&all_params);
        let signature = self.sign(&query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    /// 조회 요청. 전송 계층 실패는 한 번 재시도합니다.
    async fn read_with_retry<T, F, Fut>(&self, endpoint: &str, request: F) -> ExchangeResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ExchangeResult<T>>,
    {
        match request().await {
            Err(e) if e.kind() == ErrorKind::Network => {
                warn!(endpoint, error = %e, "Read request failed, retrying once");
                tokio::time::sleep(READ_RETRY_DELAY).await;
                request().await
            }
            other => other,
        }
    }

    async fn public_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.rest_base_url(), endpoint);
        let query = Self::build_query(params);
        let full_url = if query.is_empty() {
            url
        } else {
            format!("{}?{}", url, query)
        };

        let full_url = &full_url;
        self.read_with_retry(endpoint, || async move {
            debug!("GET {}", endpoint);
            let response = self.client.get(full_url).send().await?;
            self.handle_response(response).await
        })
        .await
    }

    /// 서명된 GET 요청 (인증 필요).
    async fn signed_get<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.rest_base_url(), endpoint);
        let url = &url;

        self.read_with_retry(endpoint, || async move {
            // 재시도 시 타임스탬프를 새로 발급
            let full_url = format!("{}?{}", url, self.signed_query(params)?);
            debug!("GET (signed) {}", endpoint);

            let response = self
                .client
                .get(&full_url)
                .header("X-MBX-APIKEY", &self.config.api_key)
                .send()
                .await?;

            self.handle_response(response).await
        })
        .await
    }

    /// 서명된 POST 요청. 상태 변경 요청이므로 내부 재시도를 하지 않습니다.
    async fn signed_post<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<T> {
        let url = format!("{}{}", self.config.rest_base_url(), endpoint);
        let body = self.signed_query(params)?;

        debug!("POST (signed) {}", endpoint);

        let response = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.config.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> ExchangeResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                error!("Failed to parse response: {} - Body: {}", e, body);
                ExchangeError::ParseError(e.to_string())
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            return Err(ExchangeError::RateLimited(format!("HTTP {}: {}", status, body)));
        }

        // 에러 응답 파싱 시도
        match serde_json::from_str::<BinanceError>(&body) {
            Ok(err) => Err(Self::map_error_code(err.code, &err.msg)),
            Err(_) if status.is_server_error() => Err(ExchangeError::NetworkError(format!(
                "HTTP {}: {}",
                status, body
            ))),
            Err(_) => Err(ExchangeError::ApiError {
                code: i64::from(status.as_u16()),
                message: body,
            }),
        }
    }

    /// Binance 에러 코드를 ExchangeError로 매핑.
    fn map_error_code(code: i64, msg: &str) -> ExchangeError {
        let msg = msg.to_string();
        match code {
            -1001 => ExchangeError::NetworkError(msg),
            -1007 => ExchangeError::Timeout(msg),
            -1003 | -1015 => ExchangeError::RateLimited(msg),
            -1021 => ExchangeError::TimestampError(msg),
            -1002 | -1022 | -2014 | -2015 => ExchangeError::Unauthorized(msg),
            -2018 | -2019 => ExchangeError::InsufficientBalance(msg),
            -1013 | -1111 | -4003 | -4164 => ExchangeError::InvalidQuantity(msg),
            -2010 | -2021 | -2022 | -4131 => ExchangeError::OrderRejected(msg),
            -1121 => ExchangeError::SymbolNotFound(msg),
            _ => ExchangeError::ApiError { code, message: msg },
        }
    }

    fn parse_decimal(field: &str, value: &str) -> ExchangeResult<Decimal> {
        Decimal::from_str(value)
            .map_err(|e| ExchangeError::ParseError(format!("{} '{}': {}", field, value, e)))
    }

    /// 거래소 규칙에 맞는 client order id (최대 36자, 허용 문자만).
    fn sanitize_client_order_id(id: &str) -> String {
        id.chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | ':' | '/' | '_' | '-'))
            .take(36)
            .collect()
    }

    /// 주문 응답을 체결 결과로 변환.
    fn parse_order_response(resp: FuturesOrderResponse) -> ExchangeResult<OrderResult> {
        let executed = Self::parse_decimal("executedQty", &resp.executed_qty)?;
        let avg_price = resp
            .avg_price
            .as_deref()
            .map(|p| Self::parse_decimal("avgPrice", p))
            .transpose()?
            .filter(|p| !p.is_zero());

        match resp.status.as_str() {
            "FILLED" => Ok(OrderResult::filled(resp.order_id.to_string(), executed, avg_price)),
            "PARTIALLY_FILLED" if !executed.is_zero() => {
                warn!(order_id = resp.order_id, executed = %executed, "Market order partially filled");
                Ok(OrderResult::filled(resp.order_id.to_string(), executed, avg_price))
            }
            // 체결 여부를 알 수 없음: 호출자가 포지션을 재조회하여 판단
            "NEW" | "PARTIALLY_FILLED" => Err(ExchangeError::Timeout(format!(
                "주문 {} 체결 미확인 (status={})",
                resp.order_id, resp.status
            ))),
            other => Err(ExchangeError::OrderRejected(format!(
                "주문 {} 상태 {}",
                resp.order_id, other
            ))),
        }
    }

    async fn submit_market_order(
        &self,
        side: Side,
        size: Quantity,
        reduce_only: bool,
        client_order_id: &str,
    ) -> ExchangeResult<OrderResult> {
        if size <= Decimal::ZERO {
            return Err(ExchangeError::InvalidQuantity(format!("수량은 양수여야 합니다: {}", size)));
        }

        let mut params = vec![
            ("symbol", self.config.symbol.clone()),
            ("side", side.to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", size.normalize().to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        let client_order_id = Self::sanitize_client_order_id(client_order_id);
        if !client_order_id.is_empty() {
            params.push(("newClientOrderId", client_order_id));
        }

        let response: FuturesOrderResponse = self.signed_post("/fapi/v1/order", &params).await?;
        let result = Self::parse_order_response(response)?;

        info!(
            side = %side,
            size = %size,
            reduce_only,
            order_id = ?result.order_id,
            filled = %result.filled_size,
            "Market order filled"
        );
        Ok(result)
    }
}

#[async_trait]
impl PerpExchange for BinanceFuturesClient {
    fn name(&self) -> &str {
        if self.config.testnet {
            "binance-futures-testnet"
        } else {
            "binance-futures"
        }
    }

    fn symbol(&self) -> &str {
        &self.config.symbol
    }

    async fn get_position(&self) -> ExchangeResult<PositionSnapshot> {
        let risks: Vec<FuturesPositionRisk> = self
            .signed_get("/fapi/v2/positionRisk", &[("symbol", self.config.symbol.clone())])
            .await?;

        // 단방향 모드에서는 항목이 하나이며, 헤지 모드에서도 합계가 순 노출
        let mut net = Decimal::ZERO;
        let mut entry_price = None;
        for risk in risks.iter().filter(|r| r.symbol == self.config.symbol) {
            let amount = Self::parse_decimal("positionAmt", &risk.position_amt)?;
            if !amount.is_zero() {
                entry_price = Some(Self::parse_decimal("entryPrice", &risk.entry_price)?);
            }
            net += amount;
        }

        Ok(PositionSnapshot::from_signed(&self.config.symbol, net, entry_price))
    }

    async fn get_balance(&self) -> ExchangeResult<Decimal> {
        let balances: Vec<FuturesBalance> = self.signed_get("/fapi/v2/balance", &[]).await?;

        match balances.iter().find(|b| b.asset == MARGIN_ASSET) {
            Some(balance) => Self::parse_decimal("availableBalance", &balance.available_balance),
            None => {
                warn!(asset = MARGIN_ASSET, "Margin asset missing from balance response");
                Ok(Decimal::ZERO)
            }
        }
    }

    async fn get_mark_price(&self) -> ExchangeResult<Decimal> {
        let index: PremiumIndex = self
            .public_get("/fapi/v1/premiumIndex", &[("symbol", self.config.symbol.clone())])
            .await?;
        Self::parse_decimal("markPrice", &index.mark_price)
    }

    async fn place_market_order(
        &self,
        side: Side,
        size: Quantity,
        client_order_id: &str,
    ) -> ExchangeResult<OrderResult> {
        self.submit_market_order(side, size, false, client_order_id).await
    }

    async fn close_position(&self, client_order_id: &str) -> ExchangeResult<OrderResult> {
        let position = self.get_position().await?;
        let Some(exit_side) = position.side.exit_side() else {
            debug!("close_position: already flat");
            return Ok(OrderResult::nothing_to_do());
        };

        self.submit_market_order(exit_side, position.size, true, client_order_id)
            .await
    }
}
