//! 실행 엔진.
//!
//! 검증된 시그널 하나를 처리하는 순서:
//! 1. 마켓 락 획득 (대기 시간 초과 시 Busy)
//! 2. 이미 적용된 시그널이면 거래소 호출 없이 성공 반환
//! 3. 비정상(degraded) 상태면 거부
//! 4. 거래소에서 권위 있는 포지션 조회 (여기까지는 취소 가능)
//! 5. 전이표로 계획 수립
//! 6. 단계별 실행 및 확인 후 상태 커밋
//!
//! 6단계는 락 가드를 소유한 별도 태스크에서 실행되므로, 요청이 중간에
//! 취소(드롭)되어도 첫 주문이 나간 계획은 끝까지 진행됩니다.

use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn, Instrument};
use trader_core::{
    signal_span, AppConfig, DecimalExt, ExecutionPlan, ExecutionStep, OrderResult, PositionSide,
    PositionSnapshot, PositionState, Quantity, Signal,
};
use trader_exchange::{with_retry, ExchangeError, PerpExchange, RetryDecision, RetryPolicy};

use crate::error::ExecutionError;
use crate::planner;
use crate::position_tracker::PositionTracker;

/// 실행 엔진 설정.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 진입 시 사용할 가용 잔고 비율
    pub balance_fraction: Decimal,
    /// 레버리지 배수
    pub leverage: Decimal,
    /// 주문 수량 단위
    pub quantity_step: Decimal,
    /// 진입에 필요한 최소 가용 잔고
    pub min_balance: Decimal,
    /// 마켓 락 대기 시간
    pub lock_timeout: Duration,
    /// 단계별 재시도 정책
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl EngineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let exec = &config.execution;
        Self {
            balance_fraction: exec.balance_fraction,
            leverage: exec.leverage,
            quantity_step: exec.quantity_step,
            min_balance: exec.min_balance,
            lock_timeout: Duration::from_millis(exec.lock_timeout_ms),
            retry: RetryPolicy::from_config(&config.retry),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// 시그널 처리 결과 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// 계획을 실행하여 목표 상태에 도달함
    Applied,
    /// 이미 적용된 시그널 (거래소 호출 없음)
    Duplicate,
    /// 이미 목표 상태여서 주문이 필요 없음
    NoOp,
}

/// 단계별 실행 보고.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub step: ExecutionStep,
    pub result: OrderResult,
    /// 주문 제출 횟수
    pub attempts: u32,
    /// 응답 대신 포지션 재조회로 체결을 확인했는지 여부
    pub verified_by_position: bool,
}

/// 시그널 처리 결과.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    pub signal_id: String,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    pub steps: Vec<StepReport>,
    /// 추적 상태와 거래소 포지션이 달랐던 경우 추적 중이던 방향
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drift_from: Option<PositionSide>,
    pub state: PositionState,
}

/// 실패한 단계.
#[derive(Debug)]
struct StepFailure {
    error: ExchangeError,
    /// 거래소 반영 여부를 확인하지 못함
    outcome_unknown: bool,
    /// 일부만 반영된 경우 실패 직후 조회한 거래소 포지션
    observed: Option<PositionSnapshot>,
}

impl StepFailure {
    fn no_effect(error: ExchangeError) -> Self {
        Self {
            error,
            outcome_unknown: false,
            observed: None,
        }
    }

    fn unknown(error: ExchangeError) -> Self {
        Self {
            error,
            outcome_unknown: true,
            observed: None,
        }
    }
}

/// 실행 엔진.
///
/// 복제해도 같은 락과 트래커를 공유합니다.
#[derive(Clone)]
pub struct ExecutionEngine {
    exchange: Arc<dyn PerpExchange>,
    tracker: Arc<PositionTracker>,
    market_lock: Arc<Mutex<()>>,
    config: Arc<EngineConfig>,
}

impl ExecutionEngine {
    /// 새 엔진을 생성합니다.
    pub fn new(exchange: Arc<dyn PerpExchange>, config: EngineConfig) -> Self {
        Self::with_tracker(exchange, Arc::new(PositionTracker::new()), config)
    }

    /// 기존 트래커를 사용하는 엔진을 생성합니다.
    pub fn with_tracker(
        exchange: Arc<dyn PerpExchange>,
        tracker: Arc<PositionTracker>,
        config: EngineConfig,
    ) -> Self {
        Self {
            exchange,
            tracker,
            market_lock: Arc::new(Mutex::new(())),
            config: Arc::new(config),
        }
    }

    /// 읽기 전용 포지션 트래커.
    pub fn tracker(&self) -> &Arc<PositionTracker> {
        &self.tracker
    }

    pub fn exchange(&self) -> &Arc<dyn PerpExchange> {
        &self.exchange
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 다른 계획이 실행 중인지 확인합니다.
    pub fn is_busy(&self) -> bool {
        self.market_lock.try_lock().is_err()
    }

    /// 실행 중인 계획이 끝날 때까지 대기합니다. 제한 시간 안에 끝나면 true.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.market_lock.lock())
            .await
            .is_ok()
    }

    async fn acquire(&self) -> Result<OwnedMutexGuard<()>, ExecutionError> {
        let timeout = self.config.lock_timeout;
        tokio::time::timeout(timeout, self.market_lock.clone().lock_owned())
            .await
            .map_err(|_| {
                warn!(waited_ms = timeout.as_millis() as u64, "Market lock busy");
                ExecutionError::Busy {
                    waited_ms: timeout.as_millis() as u64,
                }
            })
    }

    /// 검증된 시그널을 처리합니다.
    pub async fn execute(&self, signal: &Signal) -> Result<ExecutionOutcome, ExecutionError> {
        let span = signal_span!("execute", signal.id, signal.action);
        self.execute_inner(signal).instrument(span).await
    }

    async fn execute_inner(&self, signal: &Signal) -> Result<ExecutionOutcome, ExecutionError> {
        let guard = self.acquire().await?;
        let tracked = self.tracker.read();

        if tracked.has_applied(&signal.id) {
            info!("Duplicate signal, already applied");
            return Ok(ExecutionOutcome {
                signal_id: signal.id.clone(),
                status: ExecutionStatus::Duplicate,
                plan: None,
                steps: Vec::new(),
                drift_from: None,
                state: tracked,
            });
        }

        if tracked.degraded {
            let reason = tracked
                .degraded_reason
                .unwrap_or_else(|| "unknown".to_string());
            warn!(reason = %reason, "Signal refused while degraded");
            return Err(ExecutionError::Degraded { reason });
        }

        let snapshot = self.query_position().await?;
        let drift_from = (snapshot.side != tracked.side).then_some(tracked.side);
        if let Some(tracked_side) = drift_from {
            counter!("position_drift_total").increment(1);
            warn!(
                tracked = %tracked_side,
                authoritative = %snapshot.side,
                "Tracked position differs from exchange, planning from exchange state"
            );
        }

        let plan = planner::plan(snapshot.side, signal.action);
        info!(from = %plan.from, plan = %plan, "Execution plan computed");

        if plan.is_noop() {
            let state = PositionState::confirmed(&snapshot, Some(signal.id.clone()));
            self.tracker.commit(state.clone());
            return Ok(ExecutionOutcome {
                signal_id: signal.id.clone(),
                status: ExecutionStatus::NoOp,
                plan: Some(plan),
                steps: Vec::new(),
                drift_from,
                state,
            });
        }

        // 여기서부터는 취소 불가: 락 가드와 함께 별도 태스크로 이동
        let engine = self.clone();
        let signal_id = signal.id.clone();
        let previous_signal = tracked.last_applied_signal_id;
        let task = tokio::spawn(
            async move {
                let _guard = guard;
                engine.run_plan(signal_id, plan, previous_signal, drift_from).await
            }
            .in_current_span(),
        );

        task.await
            .map_err(|e| ExecutionError::Internal(format!("실행 태스크 실패: {}", e)))?
    }

    /// 권위 있는 포지션을 조회합니다 (조회 전용 재시도).
    async fn query_position(&self) -> Result<PositionSnapshot, ExecutionError> {
        let exchange = &self.exchange;
        with_retry(&self.config.retry, "get_position", move || exchange.get_position())
            .await
            .map_err(|e| ExecutionError::from_exchange(None, e))
    }

    async fn run_plan(
        &self,
        signal_id: String,
        plan: ExecutionPlan,
        previous_signal: Option<String>,
        drift_from: Option<PositionSide>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let mut reports: Vec<StepReport> = Vec::with_capacity(plan.steps.len());

        for (index, step) in plan.steps.iter().copied().enumerate() {
            let client_order_id = client_order_id(&signal_id, index);
            debug!(step = %step, client_order_id = %client_order_id, "Executing step");

            match self.run_step(step, &client_order_id).await {
                Ok(report) => {
                    info!(
                        step = %step,
                        filled = %report.result.filled_size,
                        attempts = report.attempts,
                        "Step confirmed"
                    );
                    reports.push(report);
                }
                Err(failure) => {
                    return Err(self.handle_step_failure(step, failure, &reports, previous_signal));
                }
            }
        }

        let target = plan.target_side();
        let size = match target {
            PositionSide::Flat => Decimal::ZERO,
            _ => reports
                .last()
                .map(|r| r.result.filled_size)
                .unwrap_or(Decimal::ZERO),
        };

        let state = PositionState {
            side: target,
            size,
            last_applied_signal_id: Some(signal_id.clone()),
            degraded: false,
            degraded_reason: None,
            updated_at: chrono::Utc::now(),
        };
        self.tracker.commit(state.clone());

        Ok(ExecutionOutcome {
            signal_id,
            status: ExecutionStatus::Applied,
            plan: Some(plan),
            steps: reports,
            drift_from,
            state,
        })
    }

    /// 단계 실패를 계획 경계의 에러로 변환하고, 필요하면 비정상 상태로 전환합니다.
    fn handle_step_failure(
        &self,
        step: ExecutionStep,
        failure: StepFailure,
        completed: &[StepReport],
        previous_signal: Option<String>,
    ) -> ExecutionError {
        let completed_steps: Vec<ExecutionStep> = completed.iter().map(|r| r.step).collect();

        if completed.is_empty() && !failure.outcome_unknown && failure.observed.is_none() {
            // 거래소 상태 변화 없음: 추적 상태 그대로 유지
            warn!(step = %step, error = %failure.error, "Plan aborted before any exchange effect");
            return ExecutionError::from_exchange(Some(step), failure.error);
        }

        let reason = if failure.outcome_unknown {
            format!("{} 결과 확인 불가: {}", step, failure.error)
        } else if completed.is_empty() {
            format!("{} 일부만 반영: {}", step, failure.error)
        } else {
            format!(
                "{} 완료 후 {} 실패: {}",
                completed_steps
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                step,
                failure.error
            )
        };

        if let Some(snapshot) = &failure.observed {
            error!(
                side = %snapshot.side,
                remaining = %snapshot.size,
                failed_step = %step,
                "Step only partially applied, entering degraded state"
            );
            self.tracker.commit(PositionState {
                side: snapshot.side,
                size: snapshot.size,
                last_applied_signal_id: previous_signal,
                degraded: true,
                degraded_reason: Some(reason),
                updated_at: chrono::Utc::now(),
            });
            return ExecutionError::PartialExecution {
                completed: completed_steps,
                failed: step,
                outcome_unknown: false,
                source: failure.error,
            };
        }

        match completed.last() {
            Some(last) => {
                let side = last.step.resulting_side();
                let size = if side.is_flat() {
                    Decimal::ZERO
                } else {
                    last.result.filled_size
                };
                error!(
                    confirmed_side = %side,
                    failed_step = %step,
                    error = %failure.error,
                    "Partial plan execution, entering degraded state"
                );
                self.tracker.commit(PositionState {
                    side,
                    size,
                    last_applied_signal_id: previous_signal,
                    degraded: true,
                    degraded_reason: Some(reason),
                    updated_at: chrono::Utc::now(),
                });
            }
            None => self.tracker.mark_degraded(reason),
        }

        ExecutionError::PartialExecution {
            completed: completed_steps,
            failed: step,
            outcome_unknown: failure.outcome_unknown,
            source: failure.error,
        }
    }

    /// 단일 단계를 재시도 정책에 따라 실행합니다.
    ///
    /// 일시적 에러 후에는 재제출 전에 포지션을 재조회하여, 이미 반영된 주문을
    /// 다시 내지 않도록 합니다.
    async fn run_step(
        &self,
        step: ExecutionStep,
        client_order_id: &str,
    ) -> Result<StepReport, StepFailure> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            let error = match self.issue(step, client_order_id).await {
                Ok(result) if result.success => {
                    let report = StepReport {
                        step,
                        result,
                        attempts: attempt,
                        verified_by_position: false,
                    };
                    if step == ExecutionStep::ClosePosition {
                        return self.confirm_flat(report).await;
                    }
                    return Ok(report);
                }
                Ok(result) => ExchangeError::OrderRejected(
                    result.error.unwrap_or_else(|| "체결되지 않음".to_string()),
                ),
                Err(e) => e,
            };

            if !error.is_retryable() {
                return Err(StepFailure::no_effect(error));
            }

            let decision = self.config.retry.decide(attempt, error.kind());
            warn!(
                step = %step,
                attempt,
                error = %error,
                retry = matches!(decision, RetryDecision::Retry(_)),
                "Transient error on mutating step"
            );
            if let RetryDecision::Retry(delay) = decision {
                tokio::time::sleep(delay).await;
            }

            // 주문이 거래소에 도달했을 수 있으므로 재제출 전에 확인
            match self.verify(step).await {
                Ok(Some(snapshot)) => {
                    info!(step = %step, "Step already took effect on exchange");
                    let filled = if step == ExecutionStep::ClosePosition {
                        Decimal::ZERO
                    } else {
                        snapshot.size
                    };
                    return Ok(StepReport {
                        step,
                        result: OrderResult {
                            success: true,
                            order_id: None,
                            filled_size: filled,
                            avg_price: snapshot.entry_price,
                            error: None,
                        },
                        attempts: attempt,
                        verified_by_position: true,
                    });
                }
                Ok(None) if decision == RetryDecision::Abort => {
                    return Err(StepFailure::no_effect(error));
                }
                Ok(None) => continue,
                Err(verify_error) => {
                    error!(step = %step, error = %verify_error, "Cannot verify step outcome");
                    return Err(StepFailure::unknown(error));
                }
            }
        }
    }

    /// 단계가 이미 반영되었으면 그 포지션을 반환합니다.
    async fn verify(&self, step: ExecutionStep) -> Result<Option<PositionSnapshot>, ExchangeError> {
        let snapshot = self.verify_position().await?;
        let done = snapshot.side == step.resulting_side();
        Ok(done.then_some(snapshot))
    }

    async fn verify_position(&self) -> Result<PositionSnapshot, ExchangeError> {
        let exchange = &self.exchange;
        with_retry(&self.config.retry, "verify_position", move || exchange.get_position()).await
    }

    /// 청산 응답을 받은 뒤 포지션이 실제로 플랫인지 확인합니다.
    ///
    /// 부분 체결로 포지션이 남아 있으면 다음 진입 주문과 상계되므로
    /// 계획을 중단합니다.
    async fn confirm_flat(&self, report: StepReport) -> Result<StepReport, StepFailure> {
        let snapshot = match self.verify_position().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Cannot confirm position is flat after close");
                return Err(StepFailure::unknown(e));
            }
        };

        if snapshot.side.is_flat() {
            return Ok(report);
        }

        warn!(
            side = %snapshot.side,
            remaining = %snapshot.size,
            filled = %report.result.filled_size,
            "Close reported success but position remains"
        );
        Err(StepFailure {
            error: ExchangeError::PartialFill(format!(
                "청산 후 {} {} 잔존 (체결 {})",
                snapshot.side, snapshot.size, report.result.filled_size
            )),
            outcome_unknown: false,
            observed: Some(snapshot),
        })
    }

    async fn issue(
        &self,
        step: ExecutionStep,
        client_order_id: &str,
    ) -> Result<OrderResult, ExchangeError> {
        match step.open_side() {
            None => self.exchange.close_position(client_order_id).await,
            Some(side) => {
                let size = self.order_size().await?;
                info!(side = %side, size = %size, "Placing market order");
                self.exchange.place_market_order(side, size, client_order_id).await
            }
        }
    }

    /// 주문 직전에 조회한 가용 잔고 전체로 진입 수량을 계산합니다.
    async fn order_size(&self) -> Result<Quantity, ExchangeError> {
        let exchange = &self.exchange;
        let policy = &self.config.retry;
        let balance = with_retry(policy, "get_balance", move || exchange.get_balance()).await?;
        let price = with_retry(policy, "get_mark_price", move || exchange.get_mark_price()).await?;

        let size = compute_order_size(balance, price, &self.config)?;
        debug!(balance = %balance, mark_price = %price, size = %size, "Order size computed");
        Ok(size)
    }

    /// 거래소 포지션으로 추적 상태를 맞추고 비정상 상태를 해제합니다.
    pub async fn reconcile(&self) -> Result<PositionState, ExecutionError> {
        let _guard = self.acquire().await?;
        let previous = self.tracker.read();
        let snapshot = self.query_position().await?;

        let state = PositionState::confirmed(&snapshot, previous.last_applied_signal_id.clone());
        self.tracker.commit(state.clone());

        info!(
            previous_side = %previous.side,
            side = %state.side,
            was_degraded = previous.degraded,
            "Position reconciled with exchange"
        );
        Ok(state)
    }
}

/// 잔고와 가격으로 주문 수량을 계산합니다.
pub fn compute_order_size(
    balance: Decimal,
    mark_price: Decimal,
    config: &EngineConfig,
) -> Result<Quantity, ExchangeError> {
    if balance < config.min_balance || balance <= Decimal::ZERO {
        return Err(ExchangeError::InsufficientBalance(format!(
            "가용 잔고 {} < 최소 {}",
            balance, config.min_balance
        )));
    }
    if mark_price <= Decimal::ZERO {
        return Err(ExchangeError::ParseError(format!("잘못된 마크 가격: {}", mark_price)));
    }

    let notional = balance * config.balance_fraction * config.leverage;
    let size = (notional / mark_price).floor_to_step(config.quantity_step);
    if !size.is_positive_value() {
        return Err(ExchangeError::InsufficientBalance(format!(
            "잔고 {}로 최소 수량 {} 미만",
            balance, config.quantity_step
        )));
    }
    Ok(size)
}

/// 시그널과 단계 순번으로 결정적인 client order id를 만듭니다.
pub fn client_order_id(signal_id: &str, step_index: usize) -> String {
    let digest = hex::encode(Sha256::digest(signal_id.as_bytes()));
    format!("wh-{}-{}", &digest[..16], step_index)
}
