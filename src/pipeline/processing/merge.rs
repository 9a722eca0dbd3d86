use crate::domain::{BlobIdentity, CaptureMetadata, ExtractedFields, MetadataRecord};

/// Combine identity, capture metadata and extraction output into the record
/// that gets stored. Null extraction fields are left out of the record.
pub fn merge_record(identity: &BlobIdentity, capture: &CaptureMetadata, fields: &ExtractedFields) -> MetadataRecord {
    MetadataRecord {
        id: identity.name.clone(),
        file_name: identity.name.clone(),
        blob_path: identity.path.clone(),
        blob_url: capture.blob_url.clone(),
        blob_size: identity.size,
        timestamp: capture.captured_at,
        event_type: capture.event_type.clone(),
        purchase_date: fields.purchase_date.clone(),
        merchant_name: fields.merchant_name.clone(),
        total_amount: fields.total_amount,
    }
}
