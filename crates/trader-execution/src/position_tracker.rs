//! 포지션 추적.
//!
//! 봇이 믿고 있는 현재 노출 상태를 보관하는 단일 소유 엔티티입니다.
//! 쓰기는 실행 엔진만 (엔진의 마켓 락을 잡은 상태에서) 수행하고,
//! 읽기는 헬스 체크 등 어디서든 블로킹 없이 수행합니다.

use chrono::Utc;
use std::sync::{PoisonError, RwLock};
use tracing::{error, info};
use trader_core::PositionState;

/// 포지션 트래커.
#[derive(Debug, Default)]
pub struct PositionTracker {
    state: RwLock<PositionState>,
}

impl PositionTracker {
    /// 플랫 상태로 시작하는 트래커를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 주어진 상태로 시작하는 트래커를 생성합니다.
    pub fn with_state(state: PositionState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// 현재 상태의 복사본을 반환합니다.
    pub fn read(&self) -> PositionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 확인된 실행 결과를 반영하고 이전 상태를 반환합니다.
    pub(crate) fn commit(&self, mut new_state: PositionState) -> PositionState {
        new_state.updated_at = Utc::now();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        info!(
            side = %new_state.side,
            size = %new_state.size,
            signal_id = ?new_state.last_applied_signal_id,
            degraded = new_state.degraded,
            "Position state committed"
        );
        std::mem::replace(&mut *state, new_state)
    }

    /// 현재 믿음은 유지한 채 비정상 상태로 표시합니다.
    ///
    /// 운영자가 정리(reconcile)하기 전까지 유지됩니다.
    pub(crate) fn mark_degraded(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        error!(side = %state.side, reason = %reason, "Position marked degraded");
        state.degraded = true;
        state.degraded_reason = Some(reason);
        state.updated_at = Utc::now();
    }
}
