//! Operation metrics
//!
//! Emitted through the `metrics` facade; the embedding application decides
//! which recorder (if any) to install.
//!
//! - `data_service_operations_total` (counter): labels `method`, `outcome`
//! - `data_service_operation_duration_seconds` (histogram): label `outcome`
//! - `data_service_in_flight` (gauge): tracked operations in a pool

/// Record a settled operation with its method, outcome label and duration.
pub fn record_settlement(method: &str, outcome: &str, duration_secs: f64) {
    let outcome = outcome.to_string();
    metrics::counter!("data_service_operations_total", "method" => method.to_string(), "outcome" => outcome.clone())
        .increment(1);
    metrics::histogram!("data_service_operation_duration_seconds", "outcome" => outcome)
        .record(duration_secs);
}

/// Publish the current number of tracked operations.
pub fn record_in_flight(count: usize) {
    metrics::gauge!("data_service_in_flight").set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_settlement("GET", "succeeded", 0.01);
        record_in_flight(3);
    }

    fn isolated_recorder() -> PrometheusRecorder {
        PrometheusBuilder::new().build_recorder()
    }

    #[test]
    fn settlement_counter_carries_method_and_outcome() {
        let recorder = isolated_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_settlement("GET", "succeeded", 0.042);
        record_settlement("POST", "cancelled", 1.5);

        let output = handle.render();
        assert!(output.contains("data_service_operations_total"));
        assert!(output.contains("method=\"GET\""));
        assert!(output.contains("outcome=\"succeeded\""));
        assert!(output.contains("outcome=\"cancelled\""));
        assert!(output.contains("data_service_operation_duration_seconds"));
    }

    #[test]
    fn in_flight_gauge_reports_latest_value() {
        let recorder = isolated_recorder();
        let handle = recorder.handle();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_in_flight(4);
        record_in_flight(1);

        let output = handle.render();
        let value: f64 = output
            .lines()
            .find_map(|line| line.strip_prefix("data_service_in_flight "))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_else(|| panic!("gauge line missing, got: {output}"));
        assert_eq!(value, 1.0);
    }
}
