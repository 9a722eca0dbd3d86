//! Ingest phase metrics: notifications received and rejected.

use crate::metrics::{phase_metric, PhaseMetrics};

pub struct IngestMetrics;

impl PhaseMetrics for IngestMetrics {
    fn register_metrics() {
        use metrics::describe_counter;

        describe_counter!(
            phase_metric!(counter, "ingest", "notifications"),
            "Notifications received, by shape"
        );
        describe_counter!(
            phase_metric!(counter, "ingest", "malformed"),
            "Notifications rejected because no blob identity could be derived"
        );
        describe_counter!(
            phase_metric!(counter, "ingest", "invocations_failed"),
            "Invocations that ended in a fatal error"
        );
    }

    fn phase_name() -> &'static str {
        "ingest"
    }
}

pub fn notification_received(shape: &'static str) {
    ::metrics::counter!(phase_metric!(counter, "ingest", "notifications"), "shape" => shape).increment(1);
}

pub fn notification_malformed() {
    ::metrics::counter!(phase_metric!(counter, "ingest", "malformed")).increment(1);
}

pub fn invocation_failed() {
    ::metrics::counter!(phase_metric!(counter, "ingest", "invocations_failed")).increment(1);
}
