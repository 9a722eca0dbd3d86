//! Analysis phase metrics
//!
//! Outcomes are labelled with [`ExtractionOutcome::label`] so "skipped because
//! unconfigured" and "attempted and failed" stay distinguishable even though
//! both store the same record.
//!
//! [`ExtractionOutcome::label`]: crate::pipeline::processing::ExtractionOutcome::label

use crate::metrics::{phase_metric, PhaseMetrics};

pub struct AnalysisMetrics;

impl PhaseMetrics for AnalysisMetrics {
    fn register_metrics() {
        use metrics::{describe_counter, describe_histogram};

        describe_counter!(
            phase_metric!(counter, "analysis", "outcomes"),
            "Receipt analysis outcomes (extracted, skipped_*, failed)"
        );
        describe_histogram!(
            phase_metric!(histogram, "analysis", "duration_seconds"),
            "Wall time spent in receipt analysis, including downloads and polling"
        );
    }

    fn phase_name() -> &'static str {
        "analysis"
    }
}

pub fn outcome(label: &'static str) {
    ::metrics::counter!(phase_metric!(counter, "analysis", "outcomes"), "outcome" => label).increment(1);
}

pub fn duration(seconds: f64) {
    ::metrics::histogram!(phase_metric!(histogram, "analysis", "duration_seconds")).record(seconds);
}
