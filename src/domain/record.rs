use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical identity derived from either notification shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobIdentity {
    /// Path inside the container, e.g. `receipts/r1.jpg`
    pub path: String,
    /// Final path segment, used as the record key
    pub name: String,
    pub size: u64,
}

/// Receipt fields pulled out by document analysis. All `None` when analysis
/// was skipped or failed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFields {
    pub purchase_date: Option<String>,
    pub merchant_name: Option<String>,
    pub total_amount: Option<f64>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.purchase_date.is_none() && self.merchant_name.is_none() && self.total_amount.is_none()
    }

    /// Overlay `other` on top of `self`; fields present in `other` win.
    pub fn overlay(&mut self, other: ExtractedFields) {
        if other.purchase_date.is_some() {
            self.purchase_date = other.purchase_date;
        }
        if other.merchant_name.is_some() {
            self.merchant_name = other.merchant_name;
        }
        if other.total_amount.is_some() {
            self.total_amount = other.total_amount;
        }
    }
}

/// The persisted unit, keyed by `id` (the blob's file name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub id: String,
    pub file_name: String,
    pub blob_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
    pub blob_size: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purchase_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
}

impl MetadataRecord {
    pub fn enrichment(&self) -> ExtractedFields {
        ExtractedFields {
            purchase_date: self.purchase_date.clone(),
            merchant_name: self.merchant_name.clone(),
            total_amount: self.total_amount,
        }
    }

    pub fn has_enrichment(&self) -> bool {
        !self.enrichment().is_empty()
    }

    /// Fill enrichment fields this record lacks from a previously stored one.
    /// Base fields are never touched.
    pub fn carry_forward_enrichment(&mut self, previous: &MetadataRecord) {
        if self.purchase_date.is_none() {
            self.purchase_date = previous.purchase_date.clone();
        }
        if self.merchant_name.is_none() {
            self.merchant_name = previous.merchant_name.clone();
        }
        if self.total_amount.is_none() {
            self.total_amount = previous.total_amount;
        }
    }
}
