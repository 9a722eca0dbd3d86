//! Cosmos DB SQL API over REST, authenticated with Entra ID tokens.
//!
//! Items are partitioned by `/id`, so every request carries the record id as
//! its partition key.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::app::ports::CredentialPort;
use crate::constants::COSMOS_API_VERSION;
use crate::domain::MetadataRecord;
use crate::error::StoreError;
use crate::pipeline::storage::{CollectionRef, RecordStore};

pub struct CosmosRecordStore {
    client: reqwest::Client,
    endpoint: String,
    scope: String,
    credential: Arc<dyn CredentialPort>,
}

impl CosmosRecordStore {
    pub fn new(endpoint: impl Into<String>, credential: Arc<dyn CredentialPort>) -> Self {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        let scope = token_scope(&endpoint);
        Self {
            client: reqwest::Client::new(),
            endpoint,
            scope,
            credential,
        }
    }

    fn docs_url(&self, target: &CollectionRef) -> String {
        format!(
            "{}/dbs/{}/colls/{}/docs",
            self.endpoint,
            urlencoding::encode(&target.database),
            urlencoding::encode(&target.collection)
        )
    }

    async fn request(
        &self,
        builder: reqwest::RequestBuilder,
        id: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let token = self.credential.token(&self.scope).await?;
        let auth = format!("type=aad&ver=1.0&sig={}", token.token);
        let partition_key = serde_json::to_string(&[id])?;
        Ok(builder
            .header("authorization", urlencoding::encode(&auth).into_owned())
            .header("x-ms-date", Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string())
            .header("x-ms-version", COSMOS_API_VERSION)
            .header("x-ms-documentdb-partitionkey", partition_key)
            .send()
            .await?)
    }
}

#[async_trait]
impl RecordStore for CosmosRecordStore {
    async fn get(&self, target: &CollectionRef, id: &str) -> Result<Option<MetadataRecord>, StoreError> {
        let url = format!("{}/{}", self.docs_url(target), urlencoding::encode(id));
        let resp = self.request(self.client.get(url), id).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp).await?;
        Ok(Some(resp.json().await?))
    }

    async fn upsert(&self, target: &CollectionRef, record: &MetadataRecord) -> Result<(), StoreError> {
        let builder = self
            .client
            .post(self.docs_url(target))
            .header("x-ms-documentdb-is-upsert", "True")
            .json(record);
        let resp = self.request(builder, &record.id).await?;
        ensure_success(resp).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "cosmos"
    }
}

/// Entra ID scope for an account endpoint: scheme and host only, since the
/// token audience never carries a port or path.
fn token_scope(endpoint: &str) -> String {
    match reqwest::Url::parse(endpoint) {
        Ok(url) => match url.host_str() {
            Some(host) => format!("{}://{}/.default", url.scheme(), host),
            None => format!("{}/.default", endpoint),
        },
        Err(_) => format!("{}/.default", endpoint),
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    Err(StoreError::Response {
        status: status.as_u16(),
        message,
    })
}
