//! Token credentials.
//!
//! [`ManagedIdentityCredential`] talks to the App Service identity endpoint when
//! `IDENTITY_ENDPOINT`/`IDENTITY_HEADER` are configured and to the instance
//! metadata service otherwise. Tokens are cached per audience until shortly
//! before they expire.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::app::ports::{AccessToken, CredentialPort};
use crate::config::CredentialConfig;
use crate::constants::IMDS_TOKEN_ENDPOINT;
use crate::error::CredentialError;

const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const IMDS_API_VERSION: &str = "2018-02-01";
const REFRESH_MARGIN_SECS: i64 = 300;

/// Pick the credential for this process: a configured static token wins,
/// otherwise managed identity.
pub fn build_credential(config: &CredentialConfig) -> Arc<dyn CredentialPort> {
    match &config.access_token {
        Some(token) => Arc::new(StaticTokenCredential::new(token.clone())),
        None => Arc::new(ManagedIdentityCredential::from_config(config)),
    }
}

/// Hands out the same token for every audience. Development only.
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl CredentialPort for StaticTokenCredential {
    async fn token(&self, _scope: &str) -> Result<AccessToken, CredentialError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

#[derive(Debug, Clone)]
enum IdentitySource {
    AppService { endpoint: String, header: String },
    Imds { endpoint: String },
}

pub struct ManagedIdentityCredential {
    client: reqwest::Client,
    source: IdentitySource,
    cache: Mutex<HashMap<String, AccessToken>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

impl ManagedIdentityCredential {
    pub fn from_config(config: &CredentialConfig) -> Self {
        match (&config.identity_endpoint, &config.identity_header) {
            (Some(endpoint), Some(header)) => Self::app_service(endpoint.clone(), header.clone()),
            _ => Self::imds(IMDS_TOKEN_ENDPOINT),
        }
    }

    pub fn app_service(endpoint: impl Into<String>, header: impl Into<String>) -> Self {
        Self::with_source(IdentitySource::AppService {
            endpoint: endpoint.into(),
            header: header.into(),
        })
    }

    pub fn imds(endpoint: impl Into<String>) -> Self {
        Self::with_source(IdentitySource::Imds {
            endpoint: endpoint.into(),
        })
    }

    fn with_source(source: IdentitySource) -> Self {
        Self {
            client: reqwest::Client::new(),
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn request_token(&self, resource: &str) -> Result<AccessToken, CredentialError> {
        let request = match &self.source {
            IdentitySource::AppService { endpoint, header } => self
                .client
                .get(endpoint)
                .query(&[("resource", resource), ("api-version", APP_SERVICE_API_VERSION)])
                .header("X-IDENTITY-HEADER", header),
            IdentitySource::Imds { endpoint } => self
                .client
                .get(endpoint)
                .query(&[("api-version", IMDS_API_VERSION), ("resource", resource)])
                .header("Metadata", "true"),
        };

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(CredentialError::Endpoint {
                status: status.as_u16(),
                message,
            });
        }
        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        let expires_at = expiry(&body)?;
        debug!(resource, %expires_at, "Acquired managed identity token");
        Ok(AccessToken {
            token: body.access_token,
            expires_at,
        })
    }
}

#[async_trait]
impl CredentialPort for ManagedIdentityCredential {
    async fn token(&self, scope: &str) -> Result<AccessToken, CredentialError> {
        let resource = scope_to_resource(scope);
        let mut cache = self.cache.lock().await;
        if let Some(token) = cache.get(resource) {
            if token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(token.clone());
            }
        }
        let token = self.request_token(resource).await?;
        cache.insert(resource.to_string(), token.clone());
        Ok(token)
    }
}

/// `https://storage.azure.com/.default` -> `https://storage.azure.com`
fn scope_to_resource(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

fn expiry(body: &TokenResponse) -> Result<chrono::DateTime<Utc>, CredentialError> {
    fn as_secs(value: &serde_json::Value) -> Option<i64> {
        match value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    if let Some(on) = body.expires_on.as_ref().and_then(as_secs) {
        return chrono::DateTime::from_timestamp(on, 0)
            .ok_or_else(|| CredentialError::Malformed(format!("expires_on out of range: {}", on)));
    }
    if let Some(secs) = body.expires_in.as_ref().and_then(as_secs) {
        return Ok(Utc::now() + Duration::seconds(secs));
    }
    Err(CredentialError::Malformed("token response has no expiry".to_string()))
}
