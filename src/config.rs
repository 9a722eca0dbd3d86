use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::*;
use crate::error::ConfigError;
use crate::pipeline::storage::{CollectionRef, WritePolicy};

/// Process-wide configuration. Built once at start-up and passed by reference;
/// nothing below `main` reads the environment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub analysis: AnalysisConfig,
    pub credential: CredentialConfig,
    pub write_policy: WritePolicy,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Cosmos,
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosmos" | "cosmosdb" => Ok(StoreBackend::Cosmos),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" | "in_memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Cosmos account endpoint, e.g. `https://acct.documents.azure.com:443/`
    pub endpoint: Option<String>,
    pub database: String,
    pub sqlite_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            endpoint: None,
            database: DEFAULT_DATABASE.to_string(),
            sqlite_path: PathBuf::from(DEFAULT_SQLITE_PATH),
        }
    }
}

impl StoreConfig {
    pub fn collection(&self) -> CollectionRef {
        CollectionRef::new(self.database.clone(), COLLECTION_NAME)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// The service reads the blob from its URL
    #[default]
    #[serde(alias = "url")]
    ByUrl,
    /// Download the blob and submit its bytes
    #[serde(alias = "bytes")]
    FetchBytes,
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" | "by_url" => Ok(AnalysisMode::ByUrl),
            "bytes" | "fetch_bytes" => Ok(AnalysisMode::FetchBytes),
            other => Err(format!("unknown analysis mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Presence of the endpoint is what enables analysis at all.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub mode: AnalysisMode,
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            mode: AnalysisMode::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

impl AnalysisConfig {
    pub fn enabled(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Fixed bearer token; takes precedence over managed identity.
    pub access_token: Option<String>,
    pub identity_endpoint: Option<String>,
    pub identity_header: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        if let Some(backend) = get(ENV_STORE_BACKEND) {
            config.store.backend = parse_value(ENV_STORE_BACKEND, &backend)?;
        }
        config.store.endpoint = get(ENV_COSMOS_ENDPOINT);
        if let Some(database) = get(ENV_COSMOS_DATABASE) {
            config.store.database = database;
        }
        if let Some(path) = get(ENV_SQLITE_PATH) {
            config.store.sqlite_path = PathBuf::from(path);
        }

        config.analysis.endpoint = get(ENV_ANALYSIS_ENDPOINT);
        config.analysis.api_key = get(ENV_ANALYSIS_KEY);
        if let Some(mode) = get(ENV_ANALYSIS_MODE) {
            config.analysis.mode = parse_value(ENV_ANALYSIS_MODE, &mode)?;
        }
        if let Some(interval) = get(ENV_POLL_INTERVAL_MS) {
            config.analysis.poll_interval_ms = parse_value(ENV_POLL_INTERVAL_MS, &interval)?;
        }
        if let Some(max_polls) = get(ENV_MAX_POLLS) {
            config.analysis.max_polls = parse_value(ENV_MAX_POLLS, &max_polls)?;
        }

        config.credential.access_token = get(ENV_ACCESS_TOKEN);
        config.credential.identity_endpoint = get(ENV_IDENTITY_ENDPOINT);
        config.credential.identity_header = get(ENV_IDENTITY_HEADER);

        if let Some(policy) = get(ENV_WRITE_POLICY) {
            config.write_policy = parse_value(ENV_WRITE_POLICY, &policy)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail fast on anything a run cannot do without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Cosmos
            && self.store.endpoint.as_deref().map_or(true, |e| e.trim().is_empty())
        {
            return Err(ConfigError::Missing(ENV_COSMOS_ENDPOINT));
        }
        if self.store.database.trim().is_empty() {
            return Err(ConfigError::Missing(ENV_COSMOS_DATABASE));
        }
        if self.analysis.max_polls == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_MAX_POLLS,
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_value<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    value.parse::<T>().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

/// Human-readable summary with secrets redacted.
impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }
        writeln!(f, "store.backend        = {:?}", self.store.backend)?;
        writeln!(f, "store.endpoint       = {}", self.store.endpoint.as_deref().unwrap_or("<unset>"))?;
        writeln!(f, "store.collection     = {}", self.store.collection())?;
        if self.store.backend == StoreBackend::Sqlite {
            writeln!(f, "store.sqlite_path    = {}", self.store.sqlite_path.display())?;
        }
        writeln!(f, "write_policy         = {:?}", self.write_policy)?;
        writeln!(f, "analysis.endpoint    = {}", self.analysis.endpoint.as_deref().unwrap_or("<unset>"))?;
        writeln!(f, "analysis.api_key     = {}", redact(&self.analysis.api_key))?;
        writeln!(f, "analysis.mode        = {:?}", self.analysis.mode)?;
        writeln!(f, "analysis.poll        = {}ms x {}", self.analysis.poll_interval_ms, self.analysis.max_polls)?;
        writeln!(f, "credential.token     = {}", redact(&self.credential.access_token))?;
        write!(
            f,
            "credential.identity  = {}",
            self.credential.identity_endpoint.as_deref().unwrap_or("<imds>")
        )
    }
}
