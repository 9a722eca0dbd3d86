use std::sync::Arc;
use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::app::ports::ClockPort;
use crate::domain::{MetadataRecord, Notification};
use crate::error::{PipelineError, Result};
use crate::metrics;
use crate::pipeline::ingestion::resolve_identity;
use crate::pipeline::processing::{analysis_target, merge_record, ExtractionOutcome, FieldExtractor, SkipReason};
use crate::pipeline::storage::UpsertWriter;

/// What one invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// The record as written, after any carried-forward enrichment
    pub record: MetadataRecord,
    pub enrichment: ExtractionOutcome,
}

/// Turns one blob notification into one stored metadata record:
/// identity, optional receipt analysis, merge, idempotent upsert.
pub struct ReconcileUseCase {
    extractor: Option<FieldExtractor>,
    writer: UpsertWriter,
    clock: Arc<dyn ClockPort>,
}

impl ReconcileUseCase {
    pub fn new(extractor: Option<FieldExtractor>, writer: UpsertWriter, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            extractor,
            writer,
            clock,
        }
    }

    pub fn analysis_enabled(&self) -> bool {
        self.extractor.is_some()
    }

    pub fn writer(&self) -> &UpsertWriter {
        &self.writer
    }

    /// Process a single notification. Only a malformed notification or a
    /// store failure is an error; analysis problems degrade to a record
    /// without enrichment.
    pub async fn reconcile(&self, notification: &Notification) -> Result<ReconcileOutcome> {
        let span = info_span!("reconcile", invocation_id = %Uuid::new_v4(), shape = notification.shape());
        self.run(notification).instrument(span).await
    }

    /// Process notifications one after another, stopping at the first error.
    pub async fn reconcile_all(&self, notifications: &[Notification]) -> Result<Vec<ReconcileOutcome>> {
        let mut outcomes = Vec::with_capacity(notifications.len());
        for notification in notifications {
            outcomes.push(self.reconcile(notification).await?);
        }
        Ok(outcomes)
    }

    async fn run(&self, notification: &Notification) -> Result<ReconcileOutcome> {
        metrics::ingest::notification_received(notification.shape());

        let identity = match resolve_identity(notification) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Rejecting notification");
                metrics::ingest::notification_malformed();
                return Err(e);
            }
        };
        info!(
            name = %identity.name,
            path = %identity.path,
            size = identity.size,
            "Processing blob"
        );

        let enrichment = self.enrich(notification).await;
        metrics::analysis::outcome(enrichment.label());

        let capture = notification.capture(self.clock.now());
        let record = merge_record(&identity, &capture, &enrichment.fields());

        match self.writer.write(record).await {
            Ok(record) => Ok(ReconcileOutcome { record, enrichment }),
            Err(e) => {
                metrics::ingest::invocation_failed();
                Err(PipelineError::Store(e))
            }
        }
    }

    async fn enrich(&self, notification: &Notification) -> ExtractionOutcome {
        let Some(extractor) = &self.extractor else {
            info!("DocumentIntelligenceEndpoint not configured, skipping receipt analysis");
            return ExtractionOutcome::Skipped(SkipReason::NotConfigured);
        };
        let Some(target) = analysis_target(notification) else {
            info!("Notification carries no content reference, skipping receipt analysis");
            return ExtractionOutcome::Skipped(SkipReason::NoContentReference);
        };

        info!(target = %target.describe(), strategy = extractor.strategy_name(), "Analyzing receipt");
        let started = Instant::now();
        let outcome = extractor.extract_best_effort(&target).await;
        metrics::analysis::duration(started.elapsed().as_secs_f64());
        outcome
    }
}
