use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AnalyzeRequest, AnalyzedDocument};
use crate::error::{AnalysisError, CredentialError, FetchError};

/// Bearer token for one audience.
#[derive(Clone, Debug)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait CredentialPort: Send + Sync {
    /// `scope` is an audience such as `https://storage.azure.com/.default`.
    async fn token(&self, scope: &str) -> Result<AccessToken, CredentialError>;
}

#[derive(Clone, Debug)]
pub struct FetchedBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait BlobFetcherPort: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedBlob, FetchError>;
}

/// Prebuilt receipt analysis: submit, poll to a terminal state, return the
/// result documents (possibly none).
#[async_trait]
pub trait DocumentAnalyzerPort: Send + Sync {
    async fn analyze(&self, request: AnalyzeRequest<'_>) -> Result<Vec<AnalyzedDocument>, AnalysisError>;
}

pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl ClockPort for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
