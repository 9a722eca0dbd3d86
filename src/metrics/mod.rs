//! Pipeline metrics
//!
//! Each phase defines its metrics in a dedicated submodule. Recording goes
//! through the `metrics` facade, so it is a no-op until a recorder is
//! installed by [`init_metrics`].

pub mod analysis;
pub mod ingest;
pub mod store;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Once, OnceLock};
use tracing::{info, warn};

static INIT: Once = Once::new();
static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Implemented by every phase module so its metrics can be described once at
/// start-up.
pub trait PhaseMetrics {
    fn register_metrics();

    fn phase_name() -> &'static str;
}

/// Metric names follow `blob_indexer_{phase}_{name}[_total]`.
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("blob_indexer_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("blob_indexer_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

/// Install the Prometheus recorder. Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Prometheus handle was already set");
            }
            register_all_metrics();
            info!("Prometheus recorder installed");
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
        }
    });
}

/// Prometheus text exposition, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

fn register_all_metrics() {
    register_phase::<ingest::IngestMetrics>();
    register_phase::<analysis::AnalysisMetrics>();
    register_phase::<store::StoreMetrics>();
}

fn register_phase<T: PhaseMetrics>() {
    T::register_metrics();
    tracing::debug!("Registered metrics for phase {}", T::phase_name());
}
