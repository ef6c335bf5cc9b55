//! 시그널-포지션 전이표.
//!
//! | 현재 \ 액션 | buy | sell | close |
//! |---|---|---|---|
//! | flat | open_long | open_short | - |
//! | long | - | close_position → open_short | close_position |
//! | short | close_position → open_long | - | close_position |

use trader_core::{ExecutionPlan, ExecutionStep, PositionSide, TradeAction};

/// 권위 있는 현재 포지션과 요청 액션으로 실행 계획을 계산합니다.
pub fn plan(current: PositionSide, action: TradeAction) -> ExecutionPlan {
    use ExecutionStep::*;

    let steps = match (current, action) {
        (PositionSide::Flat, TradeAction::Buy) => vec![OpenLong],
        (PositionSide::Flat, TradeAction::Sell) => vec![OpenShort],
        (PositionSide::Flat, TradeAction::Close) => vec![],

        (PositionSide::Long, TradeAction::Buy) => vec![],
        (PositionSide::Long, TradeAction::Sell) => vec![ClosePosition, OpenShort],
        (PositionSide::Long, TradeAction::Close) => vec![ClosePosition],

        (PositionSide::Short, TradeAction::Buy) => vec![ClosePosition, OpenLong],
        (PositionSide::Short, TradeAction::Sell) => vec![],
        (PositionSide::Short, TradeAction::Close) => vec![ClosePosition],
    };

    ExecutionPlan::new(current, action, steps)
}
