// Domain data shapes shared across layers

pub mod analysis;
pub mod notification;
pub mod record;

pub use analysis::{AnalysisTarget, AnalyzeRequest, AnalyzedDocument, FieldValue};
pub use notification::{BlobEvent, BlobEventData, CaptureMetadata, DirectNotification, Notification};
pub use record::{BlobIdentity, ExtractedFields, MetadataRecord};
