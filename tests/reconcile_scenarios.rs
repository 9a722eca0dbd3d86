use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use blob_indexer::app::ports::{ClockPort, DocumentAnalyzerPort};
use blob_indexer::app::ReconcileUseCase;
use blob_indexer::domain::{AnalyzeRequest, AnalyzedDocument, FieldValue, MetadataRecord, Notification};
use blob_indexer::error::{AnalysisError, PipelineError, StoreError};
use blob_indexer::infra::{AnalyzerAuth, DocumentIntelligenceClient};
use blob_indexer::pipeline::ingestion::parse_notifications;
use blob_indexer::pipeline::processing::{AnalysisStrategy, FieldExtractor};
use blob_indexer::pipeline::storage::{
    CollectionRef, InMemoryRecordStore, RecordStore, SqliteRecordStore, UpsertWriter, WritePolicy,
};

const BLOB_URL: &str = "https://acct.blob.core.windows.net/files/receipts/r1.jpg";

struct FixedClock(DateTime<Utc>);

impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn target() -> CollectionRef {
    CollectionRef::new("serverless-demo", "files")
}

fn blob_created(url: Option<&str>) -> Notification {
    let mut data = json!({ "contentLength": 2048, "contentType": "image/jpeg", "api": "PutBlob" });
    if let Some(url) = url {
        data["url"] = json!(url);
    }
    let body = json!({
        "id": "evt-1",
        "eventType": "Microsoft.Storage.BlobCreated",
        "subject": "/blobServices/default/containers/files/blobs/receipts/r1.jpg",
        "eventTime": "2024-03-01T11:59:58Z",
        "data": data
    });
    parse_notifications(body.to_string().as_bytes()).unwrap().remove(0)
}

fn use_case(store: Arc<dyn RecordStore>, extractor: Option<FieldExtractor>, policy: WritePolicy) -> ReconcileUseCase {
    let writer = UpsertWriter::new(store, target(), policy);
    ReconcileUseCase::new(extractor, writer, Arc::new(FixedClock(noon())))
}

fn di_extractor(endpoint: &str) -> FieldExtractor {
    let client = DocumentIntelligenceClient::new(endpoint, AnalyzerAuth::ApiKey("key".into()))
        .with_polling(Duration::from_millis(5), 5);
    FieldExtractor::new(Arc::new(client), AnalysisStrategy::ByUrl)
}

async fn mount_receipt(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/formrecognizer/documentModels/prebuilt-receipt:analyze"))
        .respond_with(
            ResponseTemplate::new(202)
                .insert_header("Operation-Location", format!("{}/operations/r1", server.uri()).as_str()),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/operations/r1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "succeeded",
            "analyzeResult": {
                "documents": [{
                    "docType": "receipt.retailMeal",
                    "fields": {
                        "MerchantName": { "type": "string", "valueString": "Acme Mart" },
                        "TransactionDate": { "type": "date", "valueDate": "2024-03-01" },
                        "Total": { "type": "number", "valueNumber": 19.99 }
                    }
                }]
            }
        })))
        .mount(server)
        .await;
}

fn unenriched_record() -> serde_json::Value {
    json!({
        "id": "r1.jpg",
        "fileName": "r1.jpg",
        "blobPath": "receipts/r1.jpg",
        "blobUrl": BLOB_URL,
        "blobSize": 2048,
        "timestamp": "2024-03-01T12:00:00Z",
        "eventType": "Microsoft.Storage.BlobCreated"
    })
}

async fn stored(store: &dyn RecordStore) -> serde_json::Value {
    let record = store.get(&target(), "r1.jpg").await.unwrap().unwrap();
    serde_json::to_value(record).unwrap()
}

#[tokio::test]
async fn unconfigured_analysis_stores_base_record() {
    let store = InMemoryRecordStore::new();
    let outcome = use_case(Arc::new(store.clone()), None, WritePolicy::PreserveEnrichment)
        .reconcile(&blob_created(Some(BLOB_URL)))
        .await
        .unwrap();

    assert_eq!(outcome.enrichment.label(), "skipped_unconfigured");
    assert_eq!(stored(&store).await, unenriched_record());
}

#[tokio::test]
async fn receipt_fields_are_merged_into_record() {
    let server = MockServer::start().await;
    mount_receipt(&server).await;

    let store = InMemoryRecordStore::new();
    use_case(
        Arc::new(store.clone()),
        Some(di_extractor(&server.uri())),
        WritePolicy::PreserveEnrichment,
    )
    .reconcile(&blob_created(Some(BLOB_URL)))
    .await
    .unwrap();

    let mut expected = unenriched_record();
    expected["merchantName"] = json!("Acme Mart");
    expected["purchaseDate"] = json!("2024-03-01");
    expected["totalAmount"] = json!(19.99);
    assert_eq!(stored(&store).await, expected);
}

#[tokio::test]
async fn network_failure_during_analysis_still_succeeds() {
    let store = InMemoryRecordStore::new();
    // Nothing listens on port 1.
    let outcome = use_case(
        Arc::new(store.clone()),
        Some(di_extractor("http://127.0.0.1:1")),
        WritePolicy::PreserveEnrichment,
    )
    .reconcile(&blob_created(Some(BLOB_URL)))
    .await
    .unwrap();

    assert_eq!(outcome.enrichment.label(), "failed");
    assert_eq!(stored(&store).await, unenriched_record());
}

struct DenyingStore;

#[async_trait]
impl RecordStore for DenyingStore {
    async fn get(&self, _target: &CollectionRef, _id: &str) -> Result<Option<MetadataRecord>, StoreError> {
        Ok(None)
    }

    async fn upsert(&self, _target: &CollectionRef, _record: &MetadataRecord) -> Result<(), StoreError> {
        Err(StoreError::Response {
            status: 403,
            message: "principal lacks write access".into(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "denying"
    }
}

#[tokio::test]
async fn store_access_error_fails_invocation() {
    let err = use_case(Arc::new(DenyingStore), None, WritePolicy::PreserveEnrichment)
        .reconcile(&blob_created(Some(BLOB_URL)))
        .await
        .unwrap_err();

    match err {
        PipelineError::Store(store_err) => assert_eq!(store_err.status(), Some(403)),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn redelivery_converges_to_same_state() {
    let store = InMemoryRecordStore::new();
    let use_case = use_case(Arc::new(store.clone()), None, WritePolicy::PreserveEnrichment);
    let notification = blob_created(Some(BLOB_URL));

    use_case.reconcile(&notification).await.unwrap();
    let first = stored(&store).await;
    use_case.reconcile(&notification).await.unwrap();

    assert_eq!(store.len(), 1);
    assert_eq!(stored(&store).await, first);
}

struct CountingAnalyzer(AtomicUsize);

#[async_trait]
impl DocumentAnalyzerPort for CountingAnalyzer {
    async fn analyze(&self, _request: AnalyzeRequest<'_>) -> Result<Vec<AnalyzedDocument>, AnalysisError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn notification_without_url_never_reaches_analyzer() {
    let analyzer = Arc::new(CountingAnalyzer(AtomicUsize::new(0)));
    let extractor = FieldExtractor::new(analyzer.clone(), AnalysisStrategy::ByUrl);
    let store = InMemoryRecordStore::new();

    let outcome = use_case(Arc::new(store.clone()), Some(extractor), WritePolicy::PreserveEnrichment)
        .reconcile(&blob_created(None))
        .await
        .unwrap();

    assert_eq!(outcome.enrichment.label(), "skipped_no_content");
    assert_eq!(analyzer.0.load(Ordering::SeqCst), 0);
    assert!(stored(&store).await.get("blobUrl").is_none());
}

#[tokio::test]
async fn rerun_without_analysis_keeps_enrichment_unless_replacing() {
    let server = MockServer::start().await;
    mount_receipt(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("records.db");

    let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::open(&db_path).unwrap());
    use_case(store.clone(), Some(di_extractor(&server.uri())), WritePolicy::PreserveEnrichment)
        .reconcile(&blob_created(Some(BLOB_URL)))
        .await
        .unwrap();

    use_case(store.clone(), None, WritePolicy::PreserveEnrichment)
        .reconcile(&blob_created(Some(BLOB_URL)))
        .await
        .unwrap();
    assert_eq!(stored(store.as_ref()).await["merchantName"], "Acme Mart");

    use_case(store.clone(), None, WritePolicy::Replace)
        .reconcile(&blob_created(Some(BLOB_URL)))
        .await
        .unwrap();
    drop(store);

    let reopened = SqliteRecordStore::open(&db_path).unwrap();
    assert_eq!(stored(&reopened).await, unenriched_record());
}

#[derive(Default)]
struct RecordingAnalyzer(Mutex<Vec<String>>);

#[async_trait]
impl DocumentAnalyzerPort for RecordingAnalyzer {
    async fn analyze(&self, request: AnalyzeRequest<'_>) -> Result<Vec<AnalyzedDocument>, AnalysisError> {
        let seen = match request {
            AnalyzeRequest::Url(url) => format!("url:{}", url),
            AnalyzeRequest::Bytes { content_type, .. } => format!("bytes:{}", content_type),
        };
        self.0.lock().unwrap().push(seen);
        Ok(vec![AnalyzedDocument::default()
            .with_field("MerchantName", FieldValue::String("Acme Mart".into()))
            .with_field("Total", FieldValue::Number(5.25))])
    }
}

#[tokio::test]
async fn direct_handle_is_analyzed_by_uri_and_stored_without_event_fields() {
    let uri = "https://acct.blob.core.windows.net/files/x/y/z.png";
    let body = json!({ "name": "files/x/y/z.png", "length": 4096, "uri": uri });
    let notification = parse_notifications(body.to_string().as_bytes()).unwrap().remove(0);
    assert_eq!(notification.shape(), "direct");

    let analyzer = Arc::new(RecordingAnalyzer::default());
    let extractor = FieldExtractor::new(analyzer.clone(), AnalysisStrategy::ByUrl);
    let store = InMemoryRecordStore::new();

    let outcome = use_case(Arc::new(store.clone()), Some(extractor), WritePolicy::PreserveEnrichment)
        .reconcile(&notification)
        .await
        .unwrap();

    assert_eq!(outcome.enrichment.label(), "extracted");
    assert_eq!(*analyzer.0.lock().unwrap(), vec![format!("url:{}", uri)]);

    let record = store.get(&target(), "z.png").await.unwrap().unwrap();
    assert_eq!(
        serde_json::to_value(record).unwrap(),
        json!({
            "id": "z.png",
            "fileName": "z.png",
            "blobPath": "files/x/y/z.png",
            "blobSize": 4096,
            "timestamp": "2024-03-01T12:00:00Z",
            "merchantName": "Acme Mart",
            "totalAmount": 5.25
        })
    );
}
