//! 실행 계획.
//!
//! 현재 포지션과 요청 액션으로부터 도출된, 순서가 있는 거래소 작업 목록입니다.
//! 시그널마다 새로 만들어지고 실행이 끝나면 버려집니다.

use crate::domain::{PositionSide, Side, TradeAction};
use serde::{Deserialize, Serialize};

/// 계획의 단일 단계. 모든 단계는 거래소 상태를 변경합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStep {
    /// 현재 포지션 전량 청산 (reduce-only)
    ClosePosition,
    /// 롱 진입
    OpenLong,
    /// 숏 진입
    OpenShort,
}

impl ExecutionStep {
    /// 단계가 성공적으로 확인된 후의 포지션 방향.
    pub fn resulting_side(&self) -> PositionSide {
        match self {
            ExecutionStep::ClosePosition => PositionSide::Flat,
            ExecutionStep::OpenLong => PositionSide::Long,
            ExecutionStep::OpenShort => PositionSide::Short,
        }
    }

    /// 진입 단계의 주문 방향. 청산 단계는 None.
    pub fn open_side(&self) -> Option<Side> {
        match self {
            ExecutionStep::ClosePosition => None,
            ExecutionStep::OpenLong => Some(Side::Buy),
            ExecutionStep::OpenShort => Some(Side::Sell),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStep::ClosePosition => "close_position",
            ExecutionStep::OpenLong => "open_long",
            ExecutionStep::OpenShort => "open_short",
        }
    }
}

impl std::fmt::Display for ExecutionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 하나의 시그널을 처리하기 위한 실행 계획.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// 계획 수립 시점의 권위 있는 포지션 방향
    pub from: PositionSide,
    /// 요청 액션
    pub action: TradeAction,
    /// 순서대로 실행할 단계
    pub steps: Vec<ExecutionStep>,
}

impl ExecutionPlan {
    pub fn new(from: PositionSide, action: TradeAction, steps: Vec<ExecutionStep>) -> Self {
        Self { from, action, steps }
    }

    /// 실행할 단계가 없는지 확인합니다.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    /// 모든 단계가 확인된 뒤의 포지션 방향.
    pub fn target_side(&self) -> PositionSide {
        self.steps
            .last()
            .map(ExecutionStep::resulting_side)
            .unwrap_or(self.from)
    }
}

impl std::fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.steps.is_empty() {
            return f.write_str("no-op");
        }
        let steps: Vec<&str> = self.steps.iter().map(ExecutionStep::as_str).collect();
        f.write_str(&steps.join(" -> "))
    }
}
