//! 포지션 방향, 거래소 포지션 스냅샷, 봇이 추적하는 포지션 상태.

use crate::domain::Side;
use crate::types::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 단일 마켓에 대한 노출 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    /// 포지션 없음
    #[default]
    Flat,
    /// 롱
    Long,
    /// 숏
    Short,
}

impl PositionSide {
    /// 거래소가 보고한 부호 있는 수량으로부터 방향을 결정합니다.
    pub fn from_signed_amount(amount: Decimal) -> Self {
        if amount > Decimal::ZERO {
            PositionSide::Long
        } else if amount < Decimal::ZERO {
            PositionSide::Short
        } else {
            PositionSide::Flat
        }
    }

    /// 이 방향의 포지션을 여는 주문 방향.
    pub fn entry_side(&self) -> Option<Side> {
        match self {
            PositionSide::Flat => None,
            PositionSide::Long => Some(Side::Buy),
            PositionSide::Short => Some(Side::Sell),
        }
    }

    /// 이 방향의 포지션을 닫는 주문 방향.
    pub fn exit_side(&self) -> Option<Side> {
        self.entry_side().map(|side| side.opposite())
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, PositionSide::Flat)
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Flat => write!(f, "flat"),
            PositionSide::Long => write!(f, "long"),
            PositionSide::Short => write!(f, "short"),
        }
    }
}

/// 거래소에서 조회한 권위 있는(authoritative) 포지션.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// 거래 심볼
    pub symbol: String,
    /// 포지션 방향
    pub side: PositionSide,
    /// 포지션 수량 (항상 절대값)
    pub size: Quantity,
    /// 평균 진입 가격
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<Price>,
}

impl PositionSnapshot {
    /// 플랫 스냅샷을 생성합니다.
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            side: PositionSide::Flat,
            size: Decimal::ZERO,
            entry_price: None,
        }
    }

    /// 부호 있는 수량(롱 양수, 숏 음수)으로부터 스냅샷을 생성합니다.
    pub fn from_signed(symbol: impl Into<String>, amount: Decimal, entry_price: Option<Price>) -> Self {
        let side = PositionSide::from_signed_amount(amount);
        Self {
            symbol: symbol.into(),
            side,
            size: amount.abs(),
            entry_price: if side.is_flat() { None } else { entry_price },
        }
    }
}

/// 봇이 믿고 있는 현재 포지션 상태.
///
/// 거래소 체결이 확인된 뒤에만 실행 엔진이 갱신합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    /// 마지막으로 확인된 방향
    pub side: PositionSide,
    /// 거래소가 보고한 수량
    pub size: Quantity,
    /// 마지막으로 적용된 시그널 ID
    pub last_applied_signal_id: Option<String>,
    /// 부분 실행으로 인한 비정상 상태 여부 (운영자 정리 전까지 유지)
    pub degraded: bool,
    /// 비정상 상태 사유
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    /// 마지막 갱신 시각
    pub updated_at: DateTime<Utc>,
}

impl Default for PositionState {
    fn default() -> Self {
        Self {
            side: PositionSide::Flat,
            size: Decimal::ZERO,
            last_applied_signal_id: None,
            degraded: false,
            degraded_reason: None,
            updated_at: Utc::now(),
        }
    }
}

impl PositionState {
    /// 확인된 스냅샷으로부터 상태를 생성합니다.
    pub fn confirmed(snapshot: &PositionSnapshot, signal_id: Option<String>) -> Self {
        Self {
            side: snapshot.side,
            size: snapshot.size,
            last_applied_signal_id: signal_id,
            degraded: false,
            degraded_reason: None,
            updated_at: Utc::now(),
        }
    }

    /// 주어진 시그널이 이미 적용되었는지 확인합니다.
    pub fn has_applied(&self, signal_id: &str) -> bool {
        self.last_applied_signal_id.as_deref() == Some(signal_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_from_signed_amount() {
        assert_eq!(PositionSide::from_signed_amount(dec!(0.5)), PositionSide::Long);
        assert_eq!(PositionSide::from_signed_amount(dec!(-0.5)), PositionSide::Short);
        assert_eq!(PositionSide::from_signed_amount(dec!(0)), PositionSide::Flat);
    }

    #[test]
    fn test_entry_and_exit_sides() {
        assert_eq!(PositionSide::Long.entry_side(), Some(Side::Buy));
        assert_eq!(PositionSide::Long.exit_side(), Some(Side::Sell));
        assert_eq!(PositionSide::Short.exit_side(), Some(Side::Buy));
        assert_eq!(PositionSide::Flat.exit_side(), None);
    }

    #[test]
    fn test_snapshot_from_signed() {
        let short = PositionSnapshot::from_signed("ETHUSDT", dec!(-1.25), Some(dec!(2000)));
        assert_eq!(short.side, PositionSide::Short);
        assert_eq!(short.size, dec!(1.25));

        let flat = PositionSnapshot::from_signed("ETHUSDT", dec!(0), Some(dec!(2000)));
        assert!(flat.side.is_flat());
        assert!(flat.entry_price.is_none());
    }

    #[test]
    fn test_state_has_applied() {
        let snapshot = PositionSnapshot::from_signed("ETHUSDT", dec!(1), None);
        let state = PositionState::confirmed(&snapshot, Some("sig-1".to_string()));
        assert!(state.has_applied("sig-1"));
        assert!(!state.has_applied("sig-2"));
        assert!(!PositionState::default().has_applied("sig-1"));
    }

    #[test]
    fn test_side_serde() {
        let json = serde_json::to_string(&PositionSide::Short).unwrap();
        assert_eq!(json, "\"short\"");
    }
}
