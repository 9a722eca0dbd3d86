use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::{CollectionRef, RecordStore};
use crate::domain::MetadataRecord;
use crate::error::StoreError;

/// How a new record meets the one already stored at its key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Enrichment fields missing from the new record are carried over from
    /// the stored item, so a run without analysis keeps earlier results.
    #[default]
    #[serde(alias = "preserve")]
    PreserveEnrichment,
    /// Write the new record as-is; the store replaces the whole item.
    Replace,
}

impl std::str::FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preserve" | "preserve_enrichment" | "merge" => Ok(WritePolicy::PreserveEnrichment),
            "replace" => Ok(WritePolicy::Replace),
            other => Err(format!("unknown write policy '{}'", other)),
        }
    }
}

/// Owns the write boundary: every store failure is logged here and handed
/// back to the caller.
pub struct UpsertWriter {
    store: Arc<dyn RecordStore>,
    target: CollectionRef,
    policy: WritePolicy,
}

impl UpsertWriter {
    pub fn new(store: Arc<dyn RecordStore>, target: CollectionRef, policy: WritePolicy) -> Self {
        Self { store, target, policy }
    }

    pub fn target(&self) -> &CollectionRef {
        &self.target
    }

    pub fn policy(&self) -> WritePolicy {
        self.policy
    }

    /// Write `record` as the current value for its id and return what was
    /// actually stored.
    pub async fn write(&self, mut record: MetadataRecord) -> Result<MetadataRecord, StoreError> {
        if self.policy == WritePolicy::PreserveEnrichment && !is_fully_enriched(&record) {
            let previous = self
                .store
                .get(&self.target, &record.id)
                .await
                .map_err(|e| self.report(&record.id, e))?;
            if let Some(previous) = previous {
                if previous.has_enrichment() {
                    debug!(id = %record.id, "Carrying forward stored enrichment fields");
                    record.carry_forward_enrichment(&previous);
                }
            }
        }

        self.store
            .upsert(&self.target, &record)
            .await
            .map_err(|e| self.report(&record.id, e))?;

        crate::metrics::store::record_upserted(self.store.backend_name());
        info!(
            "Successfully wrote file '{}' to {} collection '{}'",
            record.id,
            self.store.backend_name(),
            self.target
        );
        Ok(record)
    }

    fn report(&self, id: &str, err: StoreError) -> StoreError {
        match &err {
            StoreError::Response { status, message } => {
                error!(id = %id, status = *status, message = %message, "Store error");
            }
            other => {
                error!(id = %id, error = %other, "Unexpected error writing record");
            }
        }
        crate::metrics::store::write_error(self.store.backend_name(), err.status());
        err
    }
}

fn is_fully_enriched(record: &MetadataRecord) -> bool {
    record.purchase_date.is_some() && record.merchant_name.is_some() && record.total_amount.is_some()
}
