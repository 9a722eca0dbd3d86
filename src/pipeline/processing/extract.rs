//! Receipt field extraction.
//!
//! [`FieldExtractor::try_extract`] reports every failure as an
//! [`AnalysisError`]; [`FieldExtractor::extract_best_effort`] is the one place
//! those errors are absorbed. Callers that must not fail on analysis go
//! through the latter.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app::ports::{BlobFetcherPort, DocumentAnalyzerPort};
use crate::constants::{FIELD_MERCHANT_NAME, FIELD_TOTAL, FIELD_TRANSACTION_DATE};
use crate::domain::{AnalysisTarget, AnalyzeRequest, AnalyzedDocument, ExtractedFields, FieldValue, Notification};
use crate::error::AnalysisError;

/// How URL targets reach the analyzer. Chosen once at start-up.
#[derive(Clone)]
pub enum AnalysisStrategy {
    /// Hand the URL to the service and let it read the blob
    ByUrl,
    /// Download the blob first and submit the bytes
    FetchBytes(Arc<dyn BlobFetcherPort>),
}

/// Why analysis did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConfigured,
    NoContentReference,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Extracted(ExtractedFields),
    Skipped(SkipReason),
    Failed(String),
}

impl ExtractionOutcome {
    /// Skipped and failed outcomes both yield all-null fields.
    pub fn fields(&self) -> ExtractedFields {
        match self {
            ExtractionOutcome::Extracted(fields) => fields.clone(),
            ExtractionOutcome::Skipped(_) | ExtractionOutcome::Failed(_) => ExtractedFields::default(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExtractionOutcome::Extracted(_) => "extracted",
            ExtractionOutcome::Skipped(SkipReason::NotConfigured) => "skipped_unconfigured",
            ExtractionOutcome::Skipped(SkipReason::NoContentReference) => "skipped_no_content",
            ExtractionOutcome::Failed(_) => "failed",
        }
    }
}

pub struct FieldExtractor {
    analyzer: Arc<dyn DocumentAnalyzerPort>,
    strategy: AnalysisStrategy,
}

impl FieldExtractor {
    pub fn new(analyzer: Arc<dyn DocumentAnalyzerPort>, strategy: AnalysisStrategy) -> Self {
        Self { analyzer, strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        match self.strategy {
            AnalysisStrategy::ByUrl => "url",
            AnalysisStrategy::FetchBytes(_) => "bytes",
        }
    }

    /// Run the analysis and map its result documents. Every failure is
    /// returned to the caller.
    pub async fn try_extract(&self, target: &AnalysisTarget) -> Result<ExtractedFields, AnalysisError> {
        let documents = match target {
            AnalysisTarget::Bytes { bytes, content_type } => {
                self.analyzer
                    .analyze(AnalyzeRequest::Bytes { bytes, content_type })
                    .await?
            }
            AnalysisTarget::Url(url) => match &self.strategy {
                AnalysisStrategy::ByUrl => self.analyzer.analyze(AnalyzeRequest::Url(url)).await?,
                AnalysisStrategy::FetchBytes(fetcher) => {
                    let blob = fetcher.fetch(url).await?;
                    self.analyzer
                        .analyze(AnalyzeRequest::Bytes {
                            bytes: &blob.bytes,
                            content_type: &blob.content_type,
                        })
                        .await?
                }
            },
        };
        map_documents(&documents)
    }

    /// Analysis never fails the write: errors collapse to all-null fields here.
    pub async fn extract_best_effort(&self, target: &AnalysisTarget) -> ExtractionOutcome {
        match self.try_extract(target).await {
            Ok(fields) => {
                info!(
                    merchant_name = ?fields.merchant_name,
                    purchase_date = ?fields.purchase_date,
                    total_amount = ?fields.total_amount,
                    "Extracted receipt data"
                );
                ExtractionOutcome::Extracted(fields)
            }
            Err(e) => {
                error!(
                    target = %target.describe(),
                    error = %e,
                    "Error analyzing receipt, continuing without enrichment"
                );
                ExtractionOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Pick what to analyze for a notification, if anything.
pub fn analysis_target(notification: &Notification) -> Option<AnalysisTarget> {
    match notification {
        Notification::Enveloped(event) => event
            .data
            .url
            .as_ref()
            .filter(|url| !url.is_empty())
            .map(|url| AnalysisTarget::Url(url.clone())),
        Notification::Direct(direct) => match &direct.content {
            Some(bytes) => Some(AnalysisTarget::Bytes {
                bytes: bytes.clone(),
                content_type: content_type_for(&direct.name).to_string(),
            }),
            None => direct.uri.clone().map(AnalysisTarget::Url),
        },
    }
}

pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "pdf" => "application/pdf",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "heic" | "heif" => "image/heif",
        _ => "application/octet-stream",
    }
}

/// Map result documents onto [`ExtractedFields`]. Every document is visited in
/// order; for each field the last document carrying it wins.
pub fn map_documents(documents: &[AnalyzedDocument]) -> Result<ExtractedFields, AnalysisError> {
    let mut fields = ExtractedFields::default();
    if documents.is_empty() {
        warn!("No receipt documents found in the analysis result");
        return Ok(fields);
    }
    for document in documents {
        fields.overlay(map_document(document)?);
    }
    Ok(fields)
}

fn map_document(document: &AnalyzedDocument) -> Result<ExtractedFields, AnalysisError> {
    Ok(ExtractedFields {
        merchant_name: document.field(FIELD_MERCHANT_NAME).map(|v| v.to_string()),
        purchase_date: document.field(FIELD_TRANSACTION_DATE).map(purchase_date),
        total_amount: document.field(FIELD_TOTAL).map(coerce_total).transpose()?,
    })
}

fn purchase_date(value: &FieldValue) -> String {
    match value {
        FieldValue::Date(date) => date.format("%Y-%m-%d").to_string(),
        other => other.to_string(),
    }
}

fn coerce_total(value: &FieldValue) -> Result<f64, AnalysisError> {
    let amount = match value {
        FieldValue::Number(n) => *n,
        FieldValue::Integer(i) => *i as f64,
        FieldValue::Currency { amount, .. } => *amount,
        FieldValue::String(s) | FieldValue::Other(s) => s.trim().parse::<f64>().map_err(|_| coercion(value))?,
        FieldValue::Date(_) | FieldValue::Time(_) => return Err(coercion(value)),
    };
    if !amount.is_finite() {
        return Err(coercion(value));
    }
    Ok(amount)
}

fn coercion(value: &FieldValue) -> AnalysisError {
    AnalysisError::Coercion {
        field: FIELD_TOTAL,
        value: value.to_string(),
    }
}
