// Pipeline ingestion: notification decoding and identity resolution

pub mod identity;

pub use identity::resolve_identity;

use crate::domain::Notification;

/// Decode a request body holding either a single notification or an array of
/// them (Event Grid delivers arrays).
pub fn parse_notifications(body: &[u8]) -> serde_json::Result<Vec<Notification>> {
    notifications_from_value(serde_json::from_slice(body)?)
}

/// Same as [`parse_notifications`] for an already decoded body.
pub fn notifications_from_value(value: serde_json::Value) -> serde_json::Result<Vec<Notification>> {
    match value {
        serde_json::Value::Array(items) => items.into_iter().map(serde_json::from_value).collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}
