//! 주문 방향과 주문 결과.
//!
//! - `Side` - 주문 방향 (매수/매도)
//! - `OrderResult` - 단일 거래소 주문의 체결 결과

use crate::types::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 주문 방향 (매수 또는 매도).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// 거래소 주문 한 건의 결과.
///
/// 거래소가 체결을 확인한 경우에만 `success`가 true입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    /// 체결 확인 여부
    pub success: bool,
    /// 거래소 주문 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// 체결 수량
    pub filled_size: Quantity,
    /// 평균 체결 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_price: Option<Price>,
    /// 실패 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrderResult {
    /// 체결된 주문 결과를 생성합니다.
    pub fn filled(order_id: impl Into<String>, filled_size: Quantity, avg_price: Option<Price>) -> Self {
        Self {
            success: true,
            order_id: Some(order_id.into()),
            filled_size,
            avg_price,
            error: None,
        }
    }

    /// 주문 없이 성공한 결과 (이미 플랫인 상태에서의 청산 등).
    pub fn nothing_to_do() -> Self {
        Self {
            success: true,
            order_id: None,
            filled_size: Decimal::ZERO,
            avg_price: None,
            error: None,
        }
    }

    /// 실패한 주문 결과를 생성합니다.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            filled_size: Decimal::ZERO,
            avg_price: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
        assert_eq!(Side::Buy.to_string(), "BUY");
    }

    #[test]
    fn test_order_result_builders() {
        let filled = OrderResult::filled("123", dec!(0.5), Some(dec!(2000)));
        assert!(filled.success);
        assert_eq!(filled.filled_size, dec!(0.5));

        let noop = OrderResult::nothing_to_do();
        assert!(noop.success);
        assert!(noop.order_id.is_none());
        assert_eq!(noop.filled_size, Decimal::ZERO);

        let failed = OrderResult::failed("rejected");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("rejected"));
    }
}
