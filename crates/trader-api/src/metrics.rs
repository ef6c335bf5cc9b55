//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청 메트릭과 시그널/주문 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use trader_execution::{ExecutionError, ExecutionOutcome};

/// Prometheus 메트릭 레코더를 설정하고 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        // HTTP 요청 지속 시간 히스토그램 버킷 설정
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        )?
        .install_recorder()
}

// ============================================================================
// HTTP 메트릭 헬퍼 함수
// ============================================================================

/// HTTP 요청 카운터 증가.
pub fn record_http_request(method: &str, path: &str, status: u16) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// HTTP 요청 지속 시간 기록.
pub fn record_http_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 시그널 메트릭 헬퍼 함수
// ============================================================================

/// 웹훅 시그널 카운터 증가.
///
/// `outcome`은 "applied", "duplicate", "noop" 또는 에러 코드입니다.
pub fn record_signal(action: &str, outcome: &str) {
    counter!(
        "webhook_signals_total",
        "action" => action.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 거래소 주문 카운터 증가.
pub fn record_exchange_order(step: &str, outcome: &str) {
    counter!(
        "exchange_orders_total",
        "step" => step.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// 비정상 상태 게이지 설정.
pub fn set_position_degraded(degraded: bool) {
    gauge!("position_degraded").set(if degraded { 1.0 } else { 0.0 });
}

/// 실행 결과를 메트릭으로 기록합니다.
pub fn record_outcome(outcome: &ExecutionOutcome) {
    for report in &outcome.steps {
        let result = if report.verified_by_position {
            "verified"
        } else {
            "filled"
        };
        record_exchange_order(report.step.as_str(), result);
    }
    set_position_degraded(outcome.state.degraded);
}

/// 실행 실패를 메트릭으로 기록합니다.
pub fn record_execution_error(error: &ExecutionError) {
    match error {
        ExecutionError::PartialExecution {
            completed, failed, ..
        } => {
            for step in completed {
                record_exchange_order(step.as_str(), "filled");
            }
            record_exchange_order(failed.as_str(), "failed");
            set_position_degraded(true);
        }
        ExecutionError::Transient {
            step: Some(step), ..
        }
        | ExecutionError::Fatal {
            step: Some(step), ..
        } => record_exchange_order(step.as_str(), "failed"),
        _ => {}
    }
}
