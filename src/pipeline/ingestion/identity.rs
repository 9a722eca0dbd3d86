use crate::constants::BLOBS_MARKER;
use crate::domain::{BlobEvent, BlobIdentity, DirectNotification, Notification};
use crate::error::{PipelineError, Result};

/// Derive the canonical `(path, name, size)` triple from either notification
/// shape.
pub fn resolve_identity(notification: &Notification) -> Result<BlobIdentity> {
    match notification {
        Notification::Enveloped(event) => resolve_enveloped(event),
        Notification::Direct(direct) => resolve_direct(direct),
    }
}

fn resolve_enveloped(event: &BlobEvent) -> Result<BlobIdentity> {
    // Subject format: /blobServices/default/containers/{container}/blobs/{path}
    let (_, path) = event.subject.split_once(BLOBS_MARKER).ok_or_else(|| {
        PipelineError::MalformedNotification(format!("Invalid subject format: {}", event.subject))
    })?;
    build_identity(path, event.data.content_length, &event.subject)
}

fn resolve_direct(direct: &DirectNotification) -> Result<BlobIdentity> {
    build_identity(&direct.name, direct.length, &direct.name)
}

fn build_identity(path: &str, size: u64, source: &str) -> Result<BlobIdentity> {
    let name = last_segment(path);
    if path.is_empty() || name.is_empty() {
        return Err(PipelineError::MalformedNotification(format!(
            "No blob name in: {}",
            source
        )));
    }
    Ok(BlobIdentity {
        path: path.to_string(),
        name: name.to_string(),
        size,
    })
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
