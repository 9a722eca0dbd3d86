use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::app::ports::{BlobFetcherPort, CredentialPort, FetchedBlob};
use crate::constants::{STORAGE_API_VERSION, STORAGE_SCOPE};
use crate::error::FetchError;

/// Downloads blob content with a storage-scoped bearer token.
pub struct ReqwestBlobFetcher {
    client: reqwest::Client,
    credential: Arc<dyn CredentialPort>,
}

impl ReqwestBlobFetcher {
    pub fn new(credential: Arc<dyn CredentialPort>) -> Self {
        Self {
            client: reqwest::Client::new(),
            credential,
        }
    }
}

#[async_trait]
impl BlobFetcherPort for ReqwestBlobFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBlob, FetchError> {
        let token = self.credential.token(STORAGE_SCOPE).await?;
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", token.token))
            .header("x-ms-version", STORAGE_API_VERSION)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = resp.bytes().await?.to_vec();
        Ok(FetchedBlob { bytes, content_type })
    }
}
