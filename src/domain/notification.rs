use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Inbound trigger payload. Resolved once at ingress into a
/// [`BlobIdentity`](crate::domain::BlobIdentity); nothing downstream of the
/// identity resolver looks at the raw variant again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Notification {
    /// Event Grid style envelope (`eventType`, `subject`, `data`)
    Enveloped(BlobEvent),
    /// Blob trigger binding carrying the object handle directly
    Direct(DirectNotification),
}

impl Notification {
    pub fn shape(&self) -> &'static str {
        match self {
            Notification::Enveloped(_) => "enveloped",
            Notification::Direct(_) => "direct",
        }
    }

    /// Capture-time metadata that flows into the stored record.
    pub fn capture(&self, captured_at: DateTime<Utc>) -> CaptureMetadata {
        match self {
            Notification::Enveloped(event) => CaptureMetadata {
                event_type: Some(event.event_type.clone()),
                blob_url: event.data.url.clone(),
                captured_at,
            },
            Notification::Direct(_) => CaptureMetadata {
                event_type: None,
                blob_url: None,
                captured_at,
            },
        }
    }
}

/// Storage event delivered through Event Grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub event_type: String,
    /// e.g. `/blobServices/default/containers/{container}/blobs/{path}`
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_version: Option<String>,
    pub data: BlobEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobEventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub content_length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
}

/// Blob trigger payload: `name` is the handle's full path, including the
/// container (`files/receipts/r1.jpg`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectNotification {
    pub name: String,
    pub length: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Object bytes when the trigger already read them. Never part of the
    /// JSON form: only library callers that hold the bytes can set it, and
    /// analysis then submits them instead of `uri`.
    #[serde(skip)]
    pub content: Option<Vec<u8>>,
}

/// Metadata taken from the notification at capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureMetadata {
    pub event_type: Option<String>,
    pub blob_url: Option<String>,
    pub captured_at: DateTime<Utc>,
}
