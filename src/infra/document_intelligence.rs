//! Document Intelligence REST client for the prebuilt receipt model.
//!
//! Analysis is a long-running operation: the submit call answers `202` with an
//! `Operation-Location` header, which is polled until the operation reaches a
//! terminal state or the poll budget runs out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use tracing::debug;

use crate::app::ports::{CredentialPort, DocumentAnalyzerPort};
use crate::config::AnalysisConfig;
use crate::constants::{ANALYZE_API_VERSION, COGNITIVE_SERVICES_SCOPE, RECEIPT_MODEL_ID};
use crate::domain::{AnalyzeRequest, AnalyzedDocument, FieldValue};
use crate::error::AnalysisError;

const OPERATION_LOCATION: &str = "operation-location";
const SUBSCRIPTION_KEY: &str = "Ocp-Apim-Subscription-Key";

/// How requests to the analysis service authenticate.
#[derive(Clone)]
pub enum AnalyzerAuth {
    ApiKey(String),
    Token(Arc<dyn CredentialPort>),
}

pub struct DocumentIntelligenceClient {
    client: reqwest::Client,
    endpoint: String,
    auth: AnalyzerAuth,
    poll_interval: Duration,
    max_polls: u32,
}

impl DocumentIntelligenceClient {
    pub fn new(endpoint: impl Into<String>, auth: AnalyzerAuth) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        Self {
            client: reqwest::Client::new(),
            endpoint,
            auth,
            poll_interval: Duration::from_millis(crate::constants::DEFAULT_POLL_INTERVAL_MS),
            max_polls: crate::constants::DEFAULT_MAX_POLLS,
        }
    }

    /// `None` when no analysis endpoint is configured.
    pub fn from_config(config: &AnalysisConfig, credential: Arc<dyn CredentialPort>) -> Option<Self> {
        let endpoint = config.endpoint.as_ref()?;
        let auth = match &config.api_key {
            Some(key) => AnalyzerAuth::ApiKey(key.clone()),
            None => AnalyzerAuth::Token(credential),
        };
        Some(
            Self::new(endpoint.clone(), auth)
                .with_polling(Duration::from_millis(config.poll_interval_ms), config.max_polls),
        )
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn analyze_url(&self) -> String {
        format!(
            "{}/formrecognizer/documentModels/{}:analyze?api-version={}",
            self.endpoint, RECEIPT_MODEL_ID, ANALYZE_API_VERSION
        )
    }

    async fn authorize(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, AnalysisError> {
        Ok(match &self.auth {
            AnalyzerAuth::ApiKey(key) => builder.header(SUBSCRIPTION_KEY, key),
            AnalyzerAuth::Token(credential) => {
                let token = credential.token(COGNITIVE_SERVICES_SCOPE).await?;
                builder.header(AUTHORIZATION, format!("Bearer {}", token.token))
            }
        })
    }

    async fn submit(&self, request: AnalyzeRequest<'_>) -> Result<String, AnalysisError> {
        let builder = self.client.post(self.analyze_url());
        let builder = match request {
            AnalyzeRequest::Url(url) => builder.json(&serde_json::json!({ "urlSource": url })),
            AnalyzeRequest::Bytes { bytes, content_type } => builder
                .header(CONTENT_TYPE, content_type)
                .body(bytes.to_vec()),
        };
        let resp = self.authorize(builder).await?.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(service_error(status.as_u16(), &body));
        }
        resp.headers()
            .get(OPERATION_LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or(AnalysisError::MissingOperationLocation)
    }

    async fn poll(&self, operation: &str) -> Result<Vec<AnalyzedDocument>, AnalysisError> {
        for attempt in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let resp = self.authorize(self.client.get(operation)).await?.send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            if !status.is_success() {
                return Err(service_error(status.as_u16(), &body));
            }

            let op: OperationStatus = serde_json::from_str(&body)?;
            debug!(attempt, status = %op.status, "Polled analysis operation");
            match op.status.as_str() {
                "succeeded" => {
                    let documents = op.analyze_result.map(|r| r.documents).unwrap_or_default();
                    return Ok(documents.into_iter().map(WireDocument::into_domain).collect());
                }
                "failed" | "canceled" => {
                    let err = op.error.unwrap_or_default();
                    return Err(AnalysisError::OperationFailed {
                        code: err.code,
                        message: err.message,
                    });
                }
                _ => {}
            }
        }
        Err(AnalysisError::Timeout { polls: self.max_polls })
    }
}

#[async_trait]
impl DocumentAnalyzerPort for DocumentIntelligenceClient {
    async fn analyze(&self, request: AnalyzeRequest<'_>) -> Result<Vec<AnalyzedDocument>, AnalysisError> {
        let operation = self.submit(request).await?;
        debug!(%operation, "Submitted receipt analysis");
        self.poll(&operation).await
    }
}

fn service_error(status: u16, body: &str) -> AnalysisError {
    #[derive(Deserialize)]
    struct Envelope {
        error: ServiceError,
    }

    let message = serde_json::from_str::<Envelope>(body)
        .map(|e| format!("{}: {}", e.error.code, e.error.message))
        .unwrap_or_else(|_| body.to_string());
    AnalysisError::Service { status, message }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationStatus {
    status: String,
    #[serde(default)]
    error: Option<ServiceError>,
    #[serde(default)]
    analyze_result: Option<AnalyzeResult>,
}

#[derive(Deserialize, Default)]
struct ServiceError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct AnalyzeResult {
    #[serde(default)]
    documents: Vec<WireDocument>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDocument {
    #[serde(default)]
    doc_type: Option<String>,
    #[serde(default)]
    fields: HashMap<String, WireField>,
}

impl WireDocument {
    fn into_domain(self) -> AnalyzedDocument {
        AnalyzedDocument {
            doc_type: self.doc_type,
            fields: self
                .fields
                .into_iter()
                .filter_map(|(name, field)| field.into_value().map(|v| (name, v)))
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireField {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    value_string: Option<String>,
    value_date: Option<String>,
    value_time: Option<String>,
    value_number: Option<f64>,
    value_integer: Option<i64>,
    value_currency: Option<WireCurrency>,
    content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireCurrency {
    amount: f64,
    currency_code: Option<String>,
}

impl WireField {
    /// A typed field without its typed value is absent. Only field types
    /// with no typed representation fall back to their text content.
    fn into_value(self) -> Option<FieldValue> {
        match self.kind.as_deref() {
            Some("string") => self.value_string.map(FieldValue::String),
            Some("date") => self.value_date.map(|raw| match NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
                Ok(date) => FieldValue::Date(date),
                Err(_) => FieldValue::String(raw),
            }),
            Some("time") => self.value_time.map(FieldValue::Time),
            Some("number") => self.value_number.map(FieldValue::Number),
            Some("integer") => self.value_integer.map(FieldValue::Integer),
            Some("currency") => self.value_currency.map(|c| FieldValue::Currency {
                amount: c.amount,
                code: c.currency_code,
            }),
            _ => self.content.map(FieldValue::Other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::credential::StaticTokenCredential;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ANALYZE_PATH: &str = "/formrecognizer/documentModels/prebuilt-receipt:analyze";

    fn client(server: &MockServer) -> DocumentIntelligenceClient {
        DocumentIntelligenceClient::new(format!("{}/", server.uri()), AnalyzerAuth::ApiKey("k".into()))
            .with_polling(Duration::from_millis(5), 3)
    }

    async fn mount_submit(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path(ANALYZE_PATH))
            .and(query_param("api-version", ANALYZE_API_VERSION))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Operation-Location", format!("{}/operations/op-1", server.uri()).as_str()),
            )
            .mount(server)
            .await;
    }

    fn receipt_result() -> serde_json::Value {
        serde_json::json!({
            "status": "succeeded",
            "analyzeResult": {
                "documents": [{
                    "docType": "receipt.retailMeal",
                    "fields": {
                        "MerchantName": { "type": "string", "valueString": "Contoso", "content": "CONTOSO" },
                        "TransactionDate": { "type": "date", "valueDate": "2024-03-01", "content": "3/1/24" },
                        "Total": {
                            "type": "currency",
                            "valueCurrency": { "amount": 12.5, "currencyCode": "USD" },
                            "content": "$12.50"
                        },
                        "Tip": { "type": "currency", "content": "2.00" }
                    }
                }]
            }
        })
    }

    #[tokio::test]
    async fn url_analysis_polls_until_succeeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ANALYZE_PATH))
            .and(header(SUBSCRIPTION_KEY, "k"))
            .and(body_json(serde_json::json!({ "urlSource": "https://acct/receipts/r1.jpg" })))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Operation-Location", format!("{}/operations/op-1", server.uri()).as_str()),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "running" })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(receipt_result()))
            .mount(&server)
            .await;

        let documents = client(&server)
            .analyze(AnalyzeRequest::Url("https://acct/receipts/r1.jpg"))
            .await
            .unwrap();

        assert_eq!(documents.len(), 1);
        let doc = &documents[0];
        assert_eq!(doc.doc_type.as_deref(), Some("receipt.retailMeal"));
        assert_eq!(doc.field("MerchantName"), Some(&FieldValue::String("Contoso".into())));
        assert_eq!(
            doc.field("TransactionDate"),
            Some(&FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
        );
        assert_eq!(
            doc.field("Total"),
            Some(&FieldValue::Currency { amount: 12.5, code: Some("USD".into()) })
        );
        assert_eq!(doc.field("Tip"), None);
    }

    #[tokio::test]
    async fn bytes_are_posted_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(ANALYZE_PATH))
            .and(header("authorization", "Bearer cog-token"))
            .and(header("content-type", "application/pdf"))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("Operation-Location", format!("{}/operations/op-2", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/operations/op-2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "status": "succeeded",
                    "analyzeResult": { "documents": [] }
                })),
            )
            .mount(&server)
            .await;

        let credential = Arc::new(StaticTokenCredential::new("cog-token"));
        let client = DocumentIntelligenceClient::new(server.uri(), AnalyzerAuth::Token(credential))
            .with_polling(Duration::from_millis(5), 3);
        let documents = client
            .analyze(AnalyzeRequest::Bytes {
                bytes: b"%PDF-1.7",
                content_type: "application/pdf",
            })
            .await
            .unwrap();
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn failed_operation_is_reported() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "failed",
                "error": { "code": "InvalidContent", "message": "The file is corrupted." }
            })))
            .mount(&server)
            .await;

        let err = client(&server).analyze(AnalyzeRequest::Url("https://x")).await.unwrap_err();
        match err {
            AnalysisError::OperationFailed { code, .. } => assert_eq!(code, "InvalidContent"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn gives_up_after_max_polls() {
        let server = MockServer::start().await;
        mount_submit(&server).await;
        Mock::given(method("GET"))
            .and(path("/operations/op-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "status": "running" })))
            .expect(3)
            .mount(&server)
            .await;

        let err = client(&server).analyze(AnalyzeRequest::Url("https://x")).await.unwrap_err();
        assert!(matches!(err, AnalysisError::Timeout { polls: 3 }));
    }

    #[tokio::test]
    async fn rejected_submission_carries_service_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "code": "401", "message": "Access denied due to invalid subscription key." }
            })))
            .mount(&server)
            .await;

        let err = client(&server).analyze(AnalyzeRequest::Url("https://x")).await.unwrap_err();
        match err {
            AnalysisError::Service { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("invalid subscription key"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_operation_location_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202))
            .mount(&server)
            .await;

        let err = client(&server).analyze(AnalyzeRequest::Url("https://x")).await.unwrap_err();
        assert!(matches!(err, AnalysisError::MissingOperationLocation));
    }

    #[test]
    fn unparseable_date_is_kept_as_text() {
        let field: WireField = serde_json::from_value(serde_json::json!({
            "type": "date",
            "valueDate": "sometime in March"
        }))
        .unwrap();
        assert_eq!(field.into_value(), Some(FieldValue::String("sometime in March".into())));
    }

    #[test]
    fn content_only_total_leaves_other_fields_intact() {
        let doc: WireDocument = serde_json::from_value(serde_json::json!({
            "docType": "receipt.retailMeal",
            "fields": {
                "MerchantName": { "type": "string", "valueString": "Acme Mart" },
                "TransactionDate": { "type": "date", "valueDate": "2024-03-01" },
                "Total": { "type": "currency", "content": "$19.99" },
                "Items": { "type": "array", "content": "2x Coffee" }
            }
        }))
        .unwrap();
        let doc = doc.into_domain();
        assert_eq!(doc.field("Total"), None);
        assert_eq!(doc.field("Items"), Some(&FieldValue::Other("2x Coffee".into())));

        let fields = crate::pipeline::processing::extract::map_documents(&[doc]).unwrap();
        assert_eq!(fields.merchant_name.as_deref(), Some("Acme Mart"));
        assert_eq!(fields.purchase_date.as_deref(), Some("2024-03-01"));
        assert_eq!(fields.total_amount, None);
    }

    #[test]
    fn disabled_without_endpoint() {
        let config = AnalysisConfig::default();
        let credential = Arc::new(StaticTokenCredential::new("t"));
        assert!(DocumentIntelligenceClient::from_config(&config, credential).is_none());
    }
}
