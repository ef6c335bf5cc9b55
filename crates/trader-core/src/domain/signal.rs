//! 웹훅으로 수신한 트레이딩 시그널.
//!
//! - `TradeAction` - 요청된 액션 (buy/sell/close)
//! - `AuthMethod` - 시그널 인증 방식
//! - `Signal` - 검증을 통과한 불변 시그널

use crate::error::TraderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 시그널이 요청하는 액션.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    /// 롱 포지션 목표
    Buy,
    /// 숏 포지션 목표
    Sell,
    /// 플랫 목표
    Close,
}

impl TradeAction {
    /// 모든 액션.
    pub const ALL: [TradeAction; 3] = [TradeAction::Buy, TradeAction::Sell, TradeAction::Close];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Close => "close",
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TradeAction {
    type Err = TraderError;

    /// 대소문자와 앞뒤 공백을 무시합니다.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(TradeAction::Buy),
            "sell" => Ok(TradeAction::Sell),
            "close" => Ok(TradeAction::Close),
            other => Err(TraderError::InvalidInput(format!(
                "지원하지 않는 액션: '{}' (buy, sell, close 중 하나)",
                other
            ))),
        }
    }
}

/// 시그널 인증 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// 원문 바이트에 대한 HMAC-SHA256 헤더 서명
    HeaderSignature,
    /// 본문의 passphrase 필드
    Passphrase,
}

/// 인증과 형식 검증을 통과한 시그널.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// 멱등성 판단에 사용하는 시그널 식별자
    pub id: String,
    /// 요청된 액션
    pub action: TradeAction,
    /// 페이로드에 포함된 발행 시각
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// 인증 방식
    pub auth: AuthMethod,
    /// 수신 시각
    pub received_at: DateTime<Utc>,
}
