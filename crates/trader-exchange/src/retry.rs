//! 거래소 호출 재시도 정책.
//!
//! 재시도 여부는 `(시도 횟수, 에러 분류)`만으로 결정되는 순수 함수
//! [`RetryPolicy::decide`]로 표현됩니다. 지터가 없으므로 같은 입력에 대해
//! 항상 같은 결정을 내립니다.
//!
//! ```rust,ignore
//! use trader_exchange::retry::{with_retry, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let position = with_retry(&policy, "get_position", || exchange.get_position()).await?;
//! ```

use std::{future::Future, time::Duration};

use tracing::{debug, warn};

use crate::{ErrorKind, ExchangeError};

/// 재시도 결정.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// 주어진 시간만큼 대기한 뒤 다시 시도
    Retry(Duration),
    /// 즉시 중단하고 에러 반환
    Abort,
}

/// 유한 지수 백오프 재시도 정책.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 최대 시도 횟수 (첫 시도 포함).
    pub max_attempts: u32,
    /// 첫 재시도 전 대기 시간.
    pub base_delay: Duration,
    /// 최대 대기 시간.
    pub max_delay: Duration,
    /// 백오프 배수.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 애플리케이션 설정에서 정책을 생성합니다.
    pub fn from_config(config: &trader_core::RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier.max(1.0),
        }
    }

    /// 재시도 없음 (단일 시도).
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// 재시도 여부를 결정합니다.
    ///
    /// `attempt`는 지금까지 수행한 시도 횟수(1부터)입니다. 일시적이지 않은
    /// 에러는 즉시 중단하고, 일시적 에러는 `max_attempts`에 도달할 때까지
    /// `min(base * multiplier^(attempt-1), max)`만큼 대기 후 재시도합니다.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if !kind.is_transient() || attempt >= self.max_attempts {
            return RetryDecision::Abort;
        }

        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let millis = (self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent)).round();
        let delay = if millis.is_finite() && millis < self.max_delay.as_millis() as f64 {
            Duration::from_millis(millis as u64)
        } else {
            self.max_delay
        };

        RetryDecision::Retry(delay)
    }
}

/// 정책에 따라 재시도하며 비동기 작업을 실행합니다.
///
/// 상태를 변경하지 않는 조회 작업에만 사용해야 합니다. 주문처럼 상태를
/// 변경하는 작업은 재시도 전에 실제 반영 여부를 확인해야 하므로
/// 호출자가 [`RetryPolicy::decide`]로 직접 루프를 구성합니다.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T, ExchangeError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempts = attempt, "Succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => match policy.decide(attempt, e.kind()) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        operation = operation_name,
                        error = %e,
                        attempt,
                        max_attempts = policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Transient exchange error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Abort => {
                    if e.is_retryable() {
                        warn!(operation = operation_name, error = %e, attempts = attempt, "Retries exhausted");
                    }
                    return Err(e);
                }
            },
        }
    }
}
