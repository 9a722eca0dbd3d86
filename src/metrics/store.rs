use crate::metrics::{phase_metric, PhaseMetrics};

/// Metrics for the upsert writer
pub struct StoreMetrics;

impl PhaseMetrics for StoreMetrics {
    fn register_metrics() {
        use metrics::describe_counter;

        describe_counter!(
            phase_metric!(counter, "store", "records_upserted"),
            "Records written to the destination store"
        );
        describe_counter!(
            phase_metric!(counter, "store", "write_errors"),
            "Failed store reads or writes, by backend and status"
        );
    }

    fn phase_name() -> &'static str {
        "store"
    }
}

pub fn record_upserted(backend: &'static str) {
    ::metrics::counter!(phase_metric!(counter, "store", "records_upserted"), "backend" => backend).increment(1);
}

pub fn write_error(backend: &'static str, status: Option<u16>) {
    let status = status.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string());
    ::metrics::counter!(
        phase_metric!(counter, "store", "write_errors"),
        "backend" => backend,
        "status" => status
    )
    .increment(1);
}
