//! Metrics instrumentation
//!
//! Thin wrappers over the `metrics` facade so call sites stay one-liners.
//! Nothing is recorded unless the application installs a recorder.

/// Metric label values
pub mod labels {
    /// `run` operation
    pub const OPERATION_RUN: &str = "run";
    /// `execute` operation
    pub const OPERATION_EXECUTE: &str = "execute";
    /// `copy_from` / `copy_expert`
    pub const OPERATION_COPY: &str = "copy";
    /// explicit `commit`
    pub const OPERATION_COMMIT: &str = "commit";
    /// explicit `rollback`
    pub const OPERATION_ROLLBACK: &str = "rollback";
    /// Placeholder when a failure carries no vendor code
    pub const CODE_NONE: &str = "none";
}

/// Counter helpers
pub mod counters {
    use metrics::counter;

    /// A connect attempt started
    pub fn connect_attempted(host: &str) {
        counter!("resilient_pg_connect_attempts_total", "host" => host.to_string()).increment(1);
    }

    /// A connect attempt failed
    pub fn connect_failed(host: &str) {
        counter!("resilient_pg_connect_failures_total", "host" => host.to_string()).increment(1);
    }

    /// The live connection was judged dead during an operation
    pub fn connection_lost(operation: &'static str) {
        counter!("resilient_pg_connections_lost_total", "operation" => operation).increment(1);
    }

    /// A statement-level failure was classified
    pub fn statement_failed(operation: &'static str, code: Option<&str>) {
        let code = code.unwrap_or(super::labels::CODE_NONE).to_string();
        counter!(
            "resilient_pg_statement_failures_total",
            "operation" => operation,
            "code" => code
        )
        .increment(1);
    }

    /// A recovery rollback was issued
    pub fn rollback_issued() {
        counter!("resilient_pg_rollbacks_total").increment(1);
    }

    /// Rows committed by a bulk copy
    pub fn copy_rows(rows: u64) {
        counter!("resilient_pg_copy_rows_total").increment(rows);
    }
}

/// Histogram helpers
pub mod histograms {
    use metrics::histogram;

    /// Time spent blocked in the reconnect loop
    pub fn reconnect_wait(duration_ms: u64) {
        histogram!("resilient_pg_reconnect_wait_ms").record(duration_ms as f64);
    }

    /// Statement round-trip time
    pub fn statement_duration(operation: &'static str, duration_ms: u64) {
        histogram!("resilient_pg_statement_duration_ms", "operation" => operation)
            .record(duration_ms as f64);
    }
}
