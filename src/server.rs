use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::app::ReconcileUseCase;
use crate::constants::SUBSCRIPTION_VALIDATION_EVENT;
use crate::domain::{DirectNotification, MetadataRecord, Notification};
use crate::error::PipelineError;
use crate::pipeline::ingestion::notifications_from_value;

type SharedUseCase = Arc<ReconcileUseCase>;

/// Health check endpoint
async fn health(Extension(use_case): Extension<SharedUseCase>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "blob_indexer",
        "version": env!("CARGO_PKG_VERSION"),
        "analysis": use_case.analysis_enabled(),
        "target": use_case.writer().target().to_string(),
    }))
}

async fn metrics_handler() -> Response {
    match crate::metrics::render() {
        Some(body) => (StatusCode::OK, body).into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

/// Event Grid webhook: subscription handshake, or a batch of storage events
async fn events(Extension(use_case): Extension<SharedUseCase>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return bad_request(e),
    };

    let events = match value {
        Value::Array(items) => items,
        single => vec![single],
    };
    let (handshakes, deliveries): (Vec<Value>, Vec<Value>) = events.into_iter().partition(is_validation);

    if deliveries.is_empty() {
        if let Some(code) = handshakes.iter().find_map(validation_code) {
            info!("Answering Event Grid subscription validation");
            return Json(serde_json::json!({ "validationResponse": code })).into_response();
        }
    } else if !handshakes.is_empty() {
        warn!(skipped = handshakes.len(), "Ignoring validation events inside a storage batch");
    }

    let notifications = match notifications_from_value(Value::Array(deliveries)) {
        Ok(n) => n,
        Err(e) => return bad_request(e),
    };
    reconcile(&use_case, &notifications).await
}

/// Blob trigger style delivery of a single object handle
async fn blobs(Extension(use_case): Extension<SharedUseCase>, Json(direct): Json<DirectNotification>) -> Response {
    reconcile(&use_case, &[Notification::Direct(direct)]).await
}

async fn reconcile(use_case: &ReconcileUseCase, notifications: &[Notification]) -> Response {
    match use_case.reconcile_all(notifications).await {
        Ok(outcomes) => {
            let records: Vec<MetadataRecord> = outcomes.into_iter().map(|o| o.record).collect();
            Json(records).into_response()
        }
        Err(e) => pipeline_error(e),
    }
}

fn is_validation(event: &Value) -> bool {
    event.get("eventType").and_then(Value::as_str) == Some(SUBSCRIPTION_VALIDATION_EVENT)
}

fn validation_code(event: &Value) -> Option<String> {
    event
        .pointer("/data/validationCode")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn bad_request(err: serde_json::Error) -> Response {
    warn!(error = %err, "Undecodable notification body");
    (StatusCode::BAD_REQUEST, format!("invalid notification: {}", err)).into_response()
}

fn pipeline_error(err: PipelineError) -> Response {
    error!(error = %err, "Invocation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

/// Create the webhook router
pub fn create_server(use_case: SharedUseCase) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/api/events", post(events))
        .route("/api/blobs", post(blobs))
        .layer(Extension(use_case))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Install the metrics recorder and serve the webhook on `addr`
pub async fn start_server(use_case: SharedUseCase, addr: SocketAddr) -> anyhow::Result<()> {
    crate::metrics::init_metrics();
    let app = create_server(use_case);
    info!("Webhook listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);
    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
