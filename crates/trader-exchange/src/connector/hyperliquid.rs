//! Hyperliquid 무기한 선물 커넥터.
//!
//! `/info` 조회와 `/exchange` 주문만 사용합니다. 주문은 지갑 개인키로
//! EIP-712 서명하며, 시장가 주문은 슬리피지를 반영한 IOC 지정가로 전송합니다.

use crate::traits::{ExchangeResult, PerpExchange};
use crate::{ErrorKind, ExchangeError};
use alloy_primitives::{keccak256, Address, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{eip712_domain, sol, SolStruct};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::{Decimal, RoundingStrategy};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};
use trader_core::{ExchangeConfig, OrderResult, PositionSnapshot, Quantity, Side};

const MAINNET_URL: &str = "https://api.hyperliquid.xyz";
const TESTNET_URL: &str = "https://api.hyperliquid-testnet.xyz";

/// 조회 요청의 전송 실패 시 재시도 전 대기 시간.
const READ_RETRY_DELAY: Duration = Duration::from_millis(200);

/// 가격 유효 숫자 자릿수.
const PRICE_SIG_FIGS: u32 = 5;

/// 무기한 선물 가격의 최대 소수 자릿수 (szDecimals를 뺀 값이 실제 한도).
const MAX_PRICE_DECIMALS: u32 = 6;

sol! {
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

// ============================================================================
// 설정
// ============================================================================

/// Hyperliquid 클라이언트 설정.
pub struct HyperliquidConfig {
    /// 지갑 개인키
    pub private_key: SecretString,
    /// 테스트넷 사용
    pub testnet: bool,
    /// 거래 심볼 (예: ETHUSDT)
    pub symbol: String,
    /// Hyperliquid 코인 이름 (예: ETH)
    pub coin: String,
    /// 시장가 주문 허용 슬리피지 비율
    pub slippage: Decimal,
    /// 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// REST 기본 URL 재정의
    pub base_url: Option<String>,
}

impl fmt::Debug for HyperliquidConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperliquidConfig")
            .field("private_key", &"***REDACTED***")
            .field("testnet", &self.testnet)
            .field("symbol", &self.symbol)
            .field("coin", &self.coin)
            .field("slippage", &self.slippage)
            .field("timeout_secs", &self.timeout_secs)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HyperliquidConfig {
    /// 새 설정 생성.
    pub fn new(private_key: impl Into<String>, symbol: impl Into<String>) -> Self {
        let symbol = symbol.into().to_uppercase();
        Self {
            private_key: SecretString::from(private_key.into()),
            testnet: false,
            coin: coin_for_symbol(&symbol),
            symbol,
            slippage: Decimal::new(5, 2),
            timeout_secs: 10,
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

    /// 애플리케이션 설정에서 생성. 개인키가 없으면 `None`.
    pub fn from_app_config(config: &ExchangeConfig) -> Option<Self> {
        if !config.has_private_key() {
            return None;
        }
        let private_key = config.private_key.as_deref()?.trim();
        let symbol = config.symbol.to_uppercase();

        Some(Self {
            private_key: SecretString::from(private_key.to_string()),
            testnet: config.testnet,
            coin: coin_for_symbol(&symbol),
            symbol,
            slippage: config.slippage,
            timeout_secs: config.timeout_secs,
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

/// 거래 심볼에서 코인 이름 추출. `ETHUSDT`, `ETH-USDC` 모두 `ETH`.
fn coin_for_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    for suffix in ["USDT", "USDC", "USD"] {
        if let Some(base) = upper.strip_suffix(suffix) {
            let base = base.trim_end_matches(['-', '/', '_']);
            if !base.is_empty() {
                return base.to_string();
            }
        }
    }
    upper
}

// ============================================================================
// API 타입
// ============================================================================

#[derive(Debug, Deserialize)]
struct Meta {
    universe: Vec<AssetMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetMeta {
    name: String,
    sz_decimals: u32,
}

/// 코인의 자산 인덱스와 수량 소수 자릿수.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AssetInfo {
    index: u32,
    sz_decimals: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearinghouseState {
    #[serde(default)]
    asset_positions: Vec<AssetPosition>,
    withdrawable: String,
}

#[derive(Debug, Deserialize)]
struct AssetPosition {
    position: PositionData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionData {
    coin: String,
    szi: String,
    entry_px: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Action {
    Order(BulkOrder),
}

#[derive(Debug, Serialize)]
struct BulkOrder {
    orders: Vec<OrderWire>,
    grouping: String,
}

#[derive(Debug, Serialize)]
struct OrderWire {
    a: u32,
    b: bool,
    p: String,
    s: String,
    r: bool,
    t: OrderTypeWire,
    #[serde(skip_serializing_if = "Option::is_none")]
    c: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
enum OrderTypeWire {
    Limit(LimitWire),
}

#[derive(Debug, Serialize)]
struct LimitWire {
    tif: String,
}

#[derive(Debug, Serialize)]
struct SignatureWire {
    r: String,
    s: String,
    v: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeRequest<'a> {
    action: &'a Action,
    nonce: u64,
    signature: SignatureWire,
    vault_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", content = "response", rename_all = "lowercase")]
enum ExchangeResponse {
    Ok(ExchangeOk),
    Err(String),
}

#[derive(Debug, Deserialize)]
struct ExchangeOk {
    data: Option<OrderStatuses>,
}

#[derive(Debug, Deserialize)]
struct OrderStatuses {
    statuses: Vec<OrderStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum OrderStatus {
    Filled(FilledStatus),
    Resting(RestingStatus),
    Error(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilledStatus {
    total_sz: String,
    avg_px: String,
    oid: u64,
}

#[derive(Debug, Deserialize)]
struct RestingStatus {
    oid: u64,
}

// ============================================================================
// Hyperliquid 클라이언트
// ============================================================================

/// Hyperliquid 무기한 선물 클라이언트.
#[derive(Debug)]
pub struct HyperliquidClient {
    config: HyperliquidConfig,
    client: Client,
    signer: PrivateKeySigner,
    asset: OnceCell<AssetInfo>,
    last_nonce: AtomicU64,
}

impl HyperliquidClient {
    /// 새 클라이언트 생성.
    ///
    /// # Errors
    /// 개인키 형식이 잘못되면 `ExchangeError::Unauthorized`,
    /// HTTP 클라이언트 생성에 실패하면 `ExchangeError::NetworkError`를 반환합니다.
    pub fn new(config: HyperliquidConfig) -> ExchangeResult<Self> {
        let signer = PrivateKeySigner::from_str(config.private_key.expose_secret().trim())
            .map_err(|e| ExchangeError::Unauthorized(format!("잘못된 개인키: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ExchangeError::NetworkError(format!("HTTP 클라이언트 생성 실패: {}", e))
            })?;

        info!(
            coin = %config.coin,
            testnet = config.testnet,
            wallet = %signer.address(),
            base_url = config.rest_base_url(),
            "Hyperliquid client created"
        );

        Ok(Self {
            config,
            client,
            signer,
            asset: OnceCell::new(),
            last_nonce: AtomicU64::new(0),
        })
    }

    /// 서명 지갑 주소.
    pub fn wallet_address(&self) -> Address {
        self.signer.address()
    }

    /// 단조 증가하는 nonce (밀리초 타임스탬프 기반).
    fn next_nonce(&self) -> u64 {
        let now = u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0);
        let previous = self
            .last_nonce
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// 액션 해시: msgpack(action) || nonce(BE) || vault 없음(0x00).
    fn action_hash(action: &Action, nonce: u64) -> ExchangeResult<B256> {
        let mut bytes = rmp_serde::to_vec_named(action)
            .map_err(|e| ExchangeError::Unknown(format!("액션 직렬화 실패: {}", e)))?;
        bytes.extend_from_slice(&nonce.to_be_bytes());
        bytes.push(0);
        Ok(keccak256(bytes))
    }

    /// L1 액션 서명.
    fn sign_action(&self, action: &Action, nonce: u64) -> ExchangeResult<SignatureWire> {
        let agent = Agent {
            source: if self.config.testnet { "b" } else { "a" }.to_string(),
            connectionId: Self::action_hash(action, nonce)?,
        };
        let domain = eip712_domain! {
            name: "Exchange",
            version: "1",
            chain_id: 1337,
            verifying_contract: Address::ZERO,
        };
        let hash = agent.eip712_signing_hash(&domain);

        let signature = self
            .signer
            .sign_hash_sync(&hash)
            .map_err(|e| ExchangeError::Unauthorized(format!("주문 서명 실패: {}", e)))?;

        Ok(SignatureWire {
            r: format!("0x{}", hex::encode(signature.r().to_be_bytes::<32>())),
            s: format!("0x{}", hex::encode(signature.s().to_be_bytes::<32>())),
            v: 27 + u64::from(signature.v()),
        })
    }

    /// 조회 요청. 전송 계층 실패는 한 번 재시도합니다.
    async fn info<T: for<'de> Deserialize<'de>>(
        &self,
        request: &serde_json::Value,
    ) -> ExchangeResult<T> {
        let url = format!("{}/info", self.config.rest_base_url());
        let url = &url;

        let attempt = || async move {
            debug!(request = %request, "POST /info");
            let response = self.client.post(url).json(request).send().await?;
            self.handle_response(response).await
        };

        match attempt().await {
            Err(e) if e.kind() == ErrorKind::Network => {
                warn!(error = %e, "Info request failed, retrying once");
                tokio::time::sleep(READ_RETRY_DELAY).await;
                attempt().await
            }
            other => other,
        }
    }

    /// 서명된 액션 전송. 상태 변경 요청이므로 재시도하지 않습니다.
    async fn exchange(&self, action: &Action) -> ExchangeResult<ExchangeResponse> {
        let nonce = self.next_nonce();
        let body = ExchangeRequest {
            action,
            nonce,
            signature: self.sign_action(action, nonce)?,
            vault_address: None,
        };

        debug!(nonce, "POST /exchange");
        let response = self
            .client
            .post(format!("{}/exchange", self.config.rest_base_url()))
            .json(&body)
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

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                Err(ExchangeError::RateLimited(format!("HTTP {}: {}", status, body)))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ExchangeError::Unauthorized(format!("HTTP {}: {}", status, body)))
            }
            s if s.is_server_error() => {
                Err(ExchangeError::NetworkError(format!("HTTP {}: {}", status, body)))
            }
            _ => Err(ExchangeError::ApiError {
                code: i64::from(status.as_u16()),
                message: body,
            }),
        }
    }

    /// 거래소 에러 메시지 분류.
    fn map_error_message(msg: &str) -> ExchangeError {
        let lower = msg.to_lowercase();
        let msg = msg.to_string();
        if lower.contains("margin") || lower.contains("insufficient") {
            ExchangeError::InsufficientBalance(msg)
        } else if lower.contains("does not exist") {
            ExchangeError::Unauthorized(msg)
        } else if lower.contains("rate limit") || lower.contains("too many") {
            ExchangeError::RateLimited(msg)
        } else if lower.contains("minimum value") {
            ExchangeError::InvalidQuantity(msg)
        } else {
            ExchangeError::OrderRejected(msg)
        }
    }

    fn parse_decimal(field: &str, value: &str) -> ExchangeResult<Decimal> {
        Decimal::from_str(value)
            .map_err(|e| ExchangeError::ParseError(format!("{} '{}': {}", field, value, e)))
    }

    /// 주문 cloid: client order id의 SHA-256 앞 16바이트.
    fn cloid(client_order_id: &str) -> Option<String> {
        if client_order_id.is_empty() {
            return None;
        }
        let digest = Sha256::digest(client_order_id.as_bytes());
        Some(format!("0x{}", hex::encode(&digest[..16])))
    }

    /// 슬리피지를 반영한 IOC 지정가. 유효 숫자 5자리, 소수 `6 - szDecimals`자리.
    fn slippage_price(mid: Decimal, side: Side, slippage: Decimal, sz_decimals: u32) -> Decimal {
        let raw = match side {
            Side::Buy => mid * (Decimal::ONE + slippage),
            Side::Sell => mid * (Decimal::ONE - slippage),
        };
        // 정수 가격은 유효 숫자 제한을 받지 않음
        let significant = if raw.trunc().abs() >= Decimal::from(10u32.pow(PRICE_SIG_FIGS)) {
            raw.round()
        } else {
            raw.round_sf(PRICE_SIG_FIGS).unwrap_or(raw)
        };
        significant
            .round_dp(MAX_PRICE_DECIMALS.saturating_sub(sz_decimals))
            .normalize()
    }

    /// 코인의 자산 정보. 최초 한 번만 조회합니다.
    async fn asset(&self) -> ExchangeResult<AssetInfo> {
        self.asset
            .get_or_try_init(|| async move {
                let meta: Meta = self.info(&json!({ "type": "meta" })).await?;
                let (index, asset) = meta
                    .universe
                    .iter()
                    .enumerate()
                    .find(|(_, a)| a.name.eq_ignore_ascii_case(&self.config.coin))
                    .ok_or_else(|| ExchangeError::SymbolNotFound(self.config.coin.clone()))?;
                let index = u32::try_from(index)
                    .map_err(|e| ExchangeError::ParseError(format!("asset index: {}", e)))?;
                debug!(coin = %asset.name, index, sz_decimals = asset.sz_decimals, "Asset metadata loaded");
                Ok(AssetInfo {
                    index,
                    sz_decimals: asset.sz_decimals,
                })
            })
            .await
            .copied()
    }

    async fn clearinghouse_state(&self) -> ExchangeResult<ClearinghouseState> {
        self.info(&json!({
            "type": "clearinghouseState",
            "user": self.signer.address().to_string(),
        }))
        .await
    }

    fn parse_order_response(response: ExchangeResponse) -> ExchangeResult<OrderResult> {
        let data = match response {
            ExchangeResponse::Err(msg) => return Err(Self::map_error_message(&msg)),
            ExchangeResponse::Ok(ok) => ok.data,
        };
        let status = data
            .and_then(|d| d.statuses.into_iter().next())
            .ok_or_else(|| ExchangeError::ParseError("주문 상태가 없습니다".to_string()))?;

        match status {
            OrderStatus::Filled(filled) => {
                let size = Self::parse_decimal("totalSz", &filled.total_sz)?;
                let avg_price = Self::parse_decimal("avgPx", &filled.avg_px)?;
                Ok(OrderResult::filled(
                    filled.oid.to_string(),
                    size,
                    Some(avg_price).filter(|p| !p.is_zero()),
                ))
            }
            // IOC가 대기 상태로 남으면 체결 여부를 알 수 없음: 호출자가 재조회
            OrderStatus::Resting(resting) => Err(ExchangeError::Timeout(format!(
                "주문 {} 체결 미확인 (resting)",
                resting.oid
            ))),
            OrderStatus::Error(msg) => Err(Self::map_error_message(&msg)),
        }
    }

    async fn submit_market_order(
        &self,
        side: Side,
        size: Quantity,
        reduce_only: bool,
        client_order_id: &str,
    ) -> ExchangeResult<OrderResult> {
        let asset = self.asset().await?;
        let size = size.round_dp_with_strategy(asset.sz_decimals, RoundingStrategy::ToZero);
        if size <= Decimal::ZERO {
            return Err(ExchangeError::InvalidQuantity(format!(
                "수량은 양수여야 합니다 (소수 {}자리): {}",
                asset.sz_decimals, size
            )));
        }

        let mid = self.get_mark_price().await?;
        let price = Self::slippage_price(mid, side, self.config.slippage, asset.sz_decimals);

        let action = Action::Order(BulkOrder {
            orders: vec![OrderWire {
                a: asset.index,
                b: side == Side::Buy,
                p: price.to_string(),
                s: size.normalize().to_string(),
                r: reduce_only,
                t: OrderTypeWire::Limit(LimitWire {
                    tif: "Ioc".to_string(),
                }),
                c: Self::cloid(client_order_id),
            }],
            grouping: "na".to_string(),
        });

        let response = self.exchange(&action).await?;
        let result = Self::parse_order_response(response)?;

        info!(
            side = %side,
            size = %size,
            limit_price = %price,
            reduce_only,
            order_id = ?result.order_id,
            filled = %result.filled_size,
            "Market order filled"
        );
        Ok(result)
    }
}

#[async_trait]
impl PerpExchange for HyperliquidClient {
    fn name(&self) -> &str {
        if self.config.testnet {
            "hyperliquid-testnet"
        } else {
            "hyperliquid"
        }
    }

    fn symbol(&self) -> &str {
        &self.config.symbol
    }

    async fn get_position(&self) -> ExchangeResult<PositionSnapshot> {
        let state = self.clearinghouse_state().await?;

        let position = state
            .asset_positions
            .iter()
            .map(|p| &p.position)
            .find(|p| p.coin.eq_ignore_ascii_case(&self.config.coin));

        let Some(position) = position else {
            return Ok(PositionSnapshot::from_signed(&self.config.symbol, Decimal::ZERO, None));
        };

        let amount = Self::parse_decimal("szi", &position.szi)?;
        let entry_price = match position.entry_px.as_deref() {
            Some(px) if !amount.is_zero() => Some(Self::parse_decimal("entryPx", px)?),
            _ => None,
        };
        Ok(PositionSnapshot::from_signed(&self.config.symbol, amount, entry_price))
    }

    async fn get_balance(&self) -> ExchangeResult<Decimal> {
        let state = self.clearinghouse_state().await?;
        Self::parse_decimal("withdrawable", &state.withdrawable)
    }

    async fn get_mark_price(&self) -> ExchangeResult<Decimal> {
        let mids: HashMap<String, String> = self.info(&json!({ "type": "allMids" })).await?;
        let mid = mids
            .get(&self.config.coin)
            .ok_or_else(|| ExchangeError::SymbolNotFound(self.config.coin.clone()))?;
        Self::parse_decimal("mid", mid)
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

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use rust_decimal_macros::dec;
    use trader_core::PositionSide;

    // 테스트 전용 키 (Hardhat 기본 계정 #0)
    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_WALLET: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    const META_BODY: &str =
        r#"{"universe":[{"name":"BTC","szDecimals":5,"maxLeverage":50},{"name":"ETH","szDecimals":4,"maxLeverage":50}]}"#;

    fn client_for(server: &mockito::ServerGuard) -> HyperliquidClient {
        let config = HyperliquidConfig::new(TEST_KEY, "ethusdt").with_base_url(server.url());
        HyperliquidClient::new(config).expect("테스트용 클라이언트 생성 실패")
    }

    async fn mock_info(
        server: &mut mockito::ServerGuard,
        request_type: &str,
        body: &str,
    ) -> mockito::Mock {
        server
            .mock("POST", "/info")
            .match_body(Matcher::PartialJson(json!({ "type": request_type })))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await
    }

    fn test_action() -> Action {
        Action::Order(BulkOrder {
            orders: vec![OrderWire {
                a: 1,
                b: true,
                p: "2100".to_string(),
                s: "0.5".to_string(),
                r: false,
                t: OrderTypeWire::Limit(LimitWire {
                    tif: "Ioc".to_string(),
                }),
                c: None,
            }],
            grouping: "na".to_string(),
        })
    }

    #[test]
    fn test_coin_for_symbol() {
        assert_eq!(coin_for_symbol("ETHUSDT"), "ETH");
        assert_eq!(coin_for_symbol("btc-usdc"), "BTC");
        assert_eq!(coin_for_symbol("ETH"), "ETH");
        assert_eq!(coin_for_symbol("USDT"), "USDT");
    }

    #[test]
    fn test_base_url_selection() {
        let mainnet = HyperliquidConfig::new(TEST_KEY, "ETHUSDT");
        assert_eq!(mainnet.rest_base_url(), MAINNET_URL);
        let testnet = HyperliquidConfig::new(TEST_KEY, "ETHUSDT").with_testnet(true);
        assert_eq!(testnet.rest_base_url(), TESTNET_URL);
    }

    #[test]
    fn test_from_app_config_requires_private_key() {
        let mut config = ExchangeConfig::default();
        assert!(HyperliquidConfig::from_app_config(&config).is_none());

        config.private_key = Some(format!(" {} ", TEST_KEY));
        config.slippage = dec!(0.01);
        let hl = HyperliquidConfig::from_app_config(&config).unwrap();
        assert!(hl.testnet);
        assert_eq!(hl.coin, "ETH");
        assert_eq!(hl.slippage, dec!(0.01));
        assert!(HyperliquidClient::new(hl).is_ok());
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let config = HyperliquidConfig::new(TEST_KEY, "ETHUSDT");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("ac0974bec39a17e3"));
    }

    #[test]
    fn test_invalid_private_key_is_auth_error() {
        let err = HyperliquidClient::new(HyperliquidConfig::new("not-a-key", "ETHUSDT")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[test]
    fn test_wallet_address_from_key() {
        let client = HyperliquidClient::new(HyperliquidConfig::new(TEST_KEY, "ETHUSDT")).unwrap();
        assert_eq!(client.wallet_address(), Address::from_str(TEST_WALLET).unwrap());
    }

    #[test]
    fn test_nonce_is_monotonic() {
        let client = HyperliquidClient::new(HyperliquidConfig::new(TEST_KEY, "ETHUSDT")).unwrap();
        let first = client.next_nonce();
        let second = client.next_nonce();
        let third = client.next_nonce();
        assert!(second > first);
        assert!(third > second);
    }

    #[test]
    fn test_action_hash_depends_on_nonce() {
        let action = test_action();
        let a = HyperliquidClient::action_hash(&action, 1).unwrap();
        let b = HyperliquidClient::action_hash(&action, 1).unwrap();
        let c = HyperliquidClient::action_hash(&action, 2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_action_wire_format() {
        let value = serde_json::to_value(test_action()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "order",
                "orders": [{"a": 1, "b": true, "p": "2100", "s": "0.5", "r": false, "t": {"limit": {"tif": "Ioc"}}}],
                "grouping": "na"
            })
        );
    }

    #[test]
    fn test_signature_shape_and_network_source() {
        let mainnet = HyperliquidClient::new(HyperliquidConfig::new(TEST_KEY, "ETHUSDT")).unwrap();
        let testnet =
            HyperliquidClient::new(HyperliquidConfig::new(TEST_KEY, "ETHUSDT").with_testnet(true)).unwrap();
        let action = test_action();

        let sig = mainnet.sign_action(&action, 1_700_000_000_000).unwrap();
        assert!(sig.r.starts_with("0x") && sig.r.len() == 66);
        assert!(sig.s.starts_with("0x") && sig.s.len() == 66);
        assert!(sig.v == 27 || sig.v == 28);

        // 결정적 서명 (RFC 6979)
        let again = mainnet.sign_action(&action, 1_700_000_000_000).unwrap();
        assert_eq!(sig.r, again.r);

        // 메인넷과 테스트넷은 source가 달라 서명이 다름
        let other = testnet.sign_action(&action, 1_700_000_000_000).unwrap();
        assert_ne!(sig.r, other.r);
    }

    #[test]
    fn test_slippage_price_rounding() {
        // 2000 * 1.05 = 2100
        assert_eq!(
            HyperliquidClient::slippage_price(dec!(2000), Side::Buy, dec!(0.05), 4),
            dec!(2100)
        );
        // 유효 숫자 5자리: 2123.456 * 0.95 = 2017.2832 -> 2017.3
        assert_eq!(
            HyperliquidClient::slippage_price(dec!(2123.456), Side::Sell, dec!(0.05), 4),
            dec!(2017.3)
        );
        // 소수 자릿수 한도: 6 - 5 = 1
        assert_eq!(
            HyperliquidClient::slippage_price(dec!(0.123456), Side::Buy, dec!(0), 5),
            dec!(0.1)
        );
        // 큰 정수 가격은 정수로만 반올림
        assert_eq!(
            HyperliquidClient::slippage_price(dec!(123456.7), Side::Buy, dec!(0), 5),
            dec!(123457)
        );
    }

    #[test]
    fn test_map_error_message() {
        let kind = |msg| HyperliquidClient::map_error_message(msg).kind();
        assert_eq!(
            kind("Insufficient margin to place order. asset=1"),
            ErrorKind::InsufficientBalance
        );
        assert_eq!(kind("User or API Wallet 0xabc does not exist."), ErrorKind::Auth);
        assert_eq!(kind("Too many cumulative requests sent"), ErrorKind::RateLimited);
        assert_eq!(kind("Order must have minimum value of $10."), ErrorKind::Rejected);
        assert_eq!(
            kind("Order could not immediately match against any resting orders."),
            ErrorKind::Rejected
        );
    }

    #[test]
    fn test_cloid_format() {
        let cloid = HyperliquidClient::cloid("wh-0123456789abcdef-0").unwrap();
        assert_eq!(cloid.len(), 34);
        assert!(cloid.starts_with("0x"));
        assert_ne!(cloid, HyperliquidClient::cloid("wh-0123456789abcdef-1").unwrap());
        assert!(HyperliquidClient::cloid("").is_none());
    }

    #[tokio::test]
    async fn test_get_position_short() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/info")
            .match_body(Matcher::PartialJson(json!({
                "type": "clearinghouseState",
                "user": TEST_WALLET,
            })))
            .with_status(200)
            .with_body(r#"{"assetPositions":[{"type":"oneWay","position":{"coin":"BTC","szi":"0.1","entryPx":"60000.0"}},{"type":"oneWay","position":{"coin":"ETH","szi":"-1.5","entryPx":"2100.5","leverage":{"type":"cross","value":1}}}],"withdrawable":"1000.25","marginSummary":{"accountValue":"1200.0"}}"#)
            .create_async()
            .await;

        let position = client_for(&server).get_position().await.unwrap();
        mock.assert_async().await;
        assert_eq!(position.side, PositionSide::Short);
        assert_eq!(position.size, dec!(1.5));
        assert_eq!(position.entry_price, Some(dec!(2100.5)));
    }

    #[tokio::test]
    async fn test_get_position_missing_coin_is_flat() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "clearinghouseState", r#"{"assetPositions":[],"withdrawable":"10"}"#).await;

        let position = client_for(&server).get_position().await.unwrap();
        assert!(position.side.is_flat());
    }

    #[tokio::test]
    async fn test_get_balance_reads_withdrawable() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "clearinghouseState", r#"{"assetPositions":[],"withdrawable":"1000.25"}"#).await;

        let balance = client_for(&server).get_balance().await.unwrap();
        assert_eq!(balance, dec!(1000.25));
    }

    #[tokio::test]
    async fn test_get_mark_price_from_mids() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "allMids", r#"{"BTC":"60000.5","ETH":"2000.12"}"#).await;

        let price = client_for(&server).get_mark_price().await.unwrap();
        assert_eq!(price, dec!(2000.12));
    }

    #[tokio::test]
    async fn test_read_retries_once_on_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/info")
            .with_status(502)
            .with_body("Bad Gateway")
            .expect(2)
            .create_async()
            .await;

        let err = client_for(&server).get_balance().await.unwrap_err();
        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_place_market_order_filled() {
        let mut server = mockito::Server::new_async().await;
        let meta = server
            .mock("POST", "/info")
            .match_body(Matcher::PartialJson(json!({ "type": "meta" })))
            .with_status(200)
            .with_body(META_BODY)
            .expect(1)
            .create_async()
            .await;
        mock_info(&mut server, "allMids", r#"{"ETH":"2000"}"#).await;
        let order = server
            .mock("POST", "/exchange")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""type":"order""#.to_string()),
                Matcher::Regex(r#""a":1,"b":true,"p":"2100","s":"0.5","r":false"#.to_string()),
                Matcher::Regex(r#""tif":"Ioc""#.to_string()),
                Matcher::Regex(r#""c":"0x[0-9a-f]{32}""#.to_string()),
                Matcher::Regex(r#""v":2[78]"#.to_string()),
                Matcher::Regex(r#""vaultAddress":null"#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"filled":{"totalSz":"0.5","avgPx":"2001.0","oid":77}}]}}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let result = client
            .place_market_order(Side::Buy, dec!(0.50009), "wh-1-0")
            .await
            .unwrap();

        order.assert_async().await;
        assert!(result.success);
        assert_eq!(result.order_id.as_deref(), Some("77"));
        assert_eq!(result.filled_size, dec!(0.5));
        assert_eq!(result.avg_price, Some(dec!(2001)));

        // 자산 정보는 캐시됨
        client.asset().await.unwrap();
        meta.assert_async().await;
    }

    #[tokio::test]
    async fn test_order_error_status_maps_to_insufficient_balance() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "meta", META_BODY).await;
        mock_info(&mut server, "allMids", r#"{"ETH":"2000"}"#).await;
        server
            .mock("POST", "/exchange")
            .with_status(200)
            .with_body(r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"error":"Insufficient margin to place order. asset=1"}]}}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .place_market_order(Side::Sell, dec!(1), "wh-1-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientBalance);
    }

    #[tokio::test]
    async fn test_err_status_unknown_wallet() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "meta", META_BODY).await;
        mock_info(&mut server, "allMids", r#"{"ETH":"2000"}"#).await;
        server
            .mock("POST", "/exchange")
            .with_status(200)
            .with_body(r#"{"status":"err","response":"User or API Wallet 0xabc does not exist."}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .place_market_order(Side::Buy, dec!(1), "id")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_resting_order_is_unconfirmed() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "meta", META_BODY).await;
        mock_info(&mut server, "allMids", r#"{"ETH":"2000"}"#).await;
        server
            .mock("POST", "/exchange")
            .with_status(200)
            .with_body(r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"resting":{"oid":5}}]}}}"#)
            .create_async()
            .await;

        let err = client_for(&server)
            .place_market_order(Side::Buy, dec!(1), "id")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_rate_limit_status() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "meta", META_BODY).await;
        mock_info(&mut server, "allMids", r#"{"ETH":"2000"}"#).await;
        server
            .mock("POST", "/exchange")
            .with_status(429)
            .with_body("Too many requests")
            .create_async()
            .await;

        let err = client_for(&server)
            .place_market_order(Side::Buy, dec!(1), "id")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[tokio::test]
    async fn test_order_post_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "meta", META_BODY).await;
        mock_info(&mut server, "allMids", r#"{"ETH":"2000"}"#).await;
        let mock = server
            .mock("POST", "/exchange")
            .with_status(503)
            .with_body("Service Unavailable")
            .expect(1)
            .create_async()
            .await;

        let err = client_for(&server)
            .place_market_order(Side::Buy, dec!(1), "id")
            .await
            .unwrap_err();
        mock.assert_async().await;
        assert_eq!(err.kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_size_below_lot_is_rejected_before_sending() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "meta", META_BODY).await;
        let order = server.mock("POST", "/exchange").expect(0).create_async().await;

        let err = client_for(&server)
            .place_market_order(Side::Buy, dec!(0.00001), "id")
            .await
            .unwrap_err();
        order.assert_async().await;
        assert!(matches!(err, ExchangeError::InvalidQuantity(_)));
    }

    #[tokio::test]
    async fn test_unknown_coin_is_symbol_not_found() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "meta", r#"{"universe":[{"name":"BTC","szDecimals":5}]}"#).await;

        let err = client_for(&server)
            .place_market_order(Side::Buy, dec!(1), "id")
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::SymbolNotFound(_)));
    }

    #[tokio::test]
    async fn test_close_position_when_flat_skips_order() {
        let mut server = mockito::Server::new_async().await;
        mock_info(&mut server, "clearinghouseState", r#"{"assetPositions":[],"withdrawable":"10"}"#).await;
        let order = server.mock("POST", "/exchange").expect(0).create_async().await;

        let result = client_for(&server).close_position("id").await.unwrap();
        order.assert_async().await;
        assert!(result.success);
        assert_eq!(result.filled_size, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_close_long_is_reduce_only_sell() {
        let mut server = mockito::Server::new_async().await;
        mock_info(
            &mut server,
            "clearinghouseState",
            r#"{"assetPositions":[{"position":{"coin":"ETH","szi":"2.0","entryPx":"1990.0"}}],"withdrawable":"10"}"#,
        )
        .await;
        mock_info(&mut server, "meta", META_BODY).await;
        mock_info(&mut server, "allMids", r#"{"ETH":"2000"}"#).await;
        let order = server
            .mock("POST", "/exchange")
            .match_body(Matcher::Regex(r#""b":false,"p":"1900","s":"2","r":true"#.to_string()))
            .with_status(200)
            .with_body(r#"{"status":"ok","response":{"type":"order","data":{"statuses":[{"filled":{"totalSz":"2.0","avgPx":"2000.0","oid":9}}]}}}"#)
            .create_async()
            .await;

        let result = client_for(&server).close_position("wh-x-0").await.unwrap();
        order.assert_async().await;
        assert_eq!(result.filled_size, dec!(2));
    }
}
