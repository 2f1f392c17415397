//! Metrics recording through the `metrics` facade
//!
//! Counters and histograms are recorded unconditionally; they are exported
//! only when a recorder is installed (the Prometheus exporter behind the
//! `metrics` feature).

use std::time::Duration;
use tracing::info;

use crate::core::error::ErrorSeverity;
use crate::core::result::AppResult;

pub const HTTP_REQUESTS_TOTAL: &str = "dashboard_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "dashboard_http_request_duration_seconds";
pub const ERRORS_TOTAL: &str = "dashboard_errors_total";
pub const HELIUS_KEY_ROTATIONS_TOTAL: &str = "dashboard_helius_key_rotations_total";
pub const HELIUS_KEYS_LOADED: &str = "dashboard_helius_keys_loaded";
pub const SPEND_CHECKS_TOTAL: &str = "dashboard_spend_checks_total";
pub const SPEND_LIMIT_REJECTIONS_TOTAL: &str = "dashboard_spend_limit_rejections_total";
pub const TRANSACTIONS_MERGED_TOTAL: &str = "dashboard_transactions_merged_total";

/// Register metric descriptions with the installed recorder
pub fn describe() {
    metrics::describe_counter!(HTTP_REQUESTS_TOTAL, "Outbound API requests by service and outcome");
    metrics::describe_histogram!(HTTP_REQUEST_DURATION, "Outbound API request latency in seconds");
    metrics::describe_counter!(ERRORS_TOTAL, "Errors reported to the error collector");
    metrics::describe_counter!(HELIUS_KEY_ROTATIONS_TOTAL, "Helius API keys handed out");
    metrics::describe_gauge!(HELIUS_KEYS_LOADED, "Active Helius keys in the rotation");
    metrics::describe_counter!(SPEND_CHECKS_TOTAL, "Spend limit checks by outcome");
    metrics::describe_counter!(SPEND_LIMIT_REJECTIONS_TOTAL, "Transfers refused by a spend check");
    metrics::describe_counter!(TRANSACTIONS_MERGED_TOTAL, "Transactions produced by cache/RPC merges");
}

/// Record an outbound API call
pub fn record_request(service: &'static str, success: bool, elapsed: Duration) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(HTTP_REQUESTS_TOTAL, "service" => service, "outcome" => outcome).increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION, "service" => service).record(elapsed.as_secs_f64());
}

/// Record an error report
pub fn record_error(component: &str, kind: &'static str, severity: ErrorSeverity) {
    metrics::counter!(
        ERRORS_TOTAL,
        "component" => component.to_string(),
        "kind" => kind,
        "severity" => severity.as_str()
    )
    .increment(1);
}

/// Record a spend limit decision
pub fn record_spend_check(accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    metrics::counter!(SPEND_CHECKS_TOTAL, "outcome" => outcome).increment(1);
    if !accepted {
        metrics::counter!(SPEND_LIMIT_REJECTIONS_TOTAL).increment(1);
    }
}

/// Record a Helius key handed out by the rotation
pub fn record_key_rotation() {
    metrics::counter!(HELIUS_KEY_ROTATIONS_TOTAL).increment(1);
}

/// Set the number of keys currently in the rotation
pub fn set_keys_loaded(count: usize) {
    metrics::gauge!(HELIUS_KEYS_LOADED).set(count as f64);
}

/// Record the size of a merged transaction list
pub fn record_merge(count: usize) {
    metrics::counter!(TRANSACTIONS_MERGED_TOTAL).increment(count as u64);
}

/// Install the Prometheus exporter on `0.0.0.0:<port>`
#[cfg(feature = "metrics")]
pub fn install_prometheus(port: u16) -> AppResult<()> {
    use crate::core::error::AppError;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| AppError::internal(format!("Failed to install Prometheus exporter: {}", e)))?;

    describe();
    info!("📊 Prometheus metrics exposed on port {}", port);
    Ok(())
}

/// Without the `metrics` feature there is no exporter to install
#[cfg(not(feature = "metrics"))]
pub fn install_prometheus(port: u16) -> AppResult<()> {
    info!("📊 Metrics exporter not compiled in; ignoring port {}", port);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe();
        record_request("helius", true, Duration::from_millis(12));
        record_error("wallet", "network", ErrorSeverity::Medium);
        record_spend_check(false);
    }
}
