use thiserror::Error;

/// Token acquisition failures.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {message}")]
    Endpoint { status: u16, message: String },

    #[error("Malformed token response: {0}")]
    Malformed(String),
}

/// Content download failures. Only ever observed inside the analysis path.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Blob download returned {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),
}

/// Anything that goes wrong while analyzing a document. Always absorbed by the
/// field extractor boundary.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Content fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Analysis service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("Analysis operation failed: {code}: {message}")]
    OperationFailed { code: String, message: String },

    #[error("Analysis operation still running after {polls} polls")]
    Timeout { polls: u32 },

    #[error("Missing Operation-Location header in analysis response")]
    MissingOperationLocation,

    #[error("Cannot coerce field {field} from {value}")]
    Coercion { field: &'static str, value: String },

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination store failures. Always fatal for the invocation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store answered, but refused the request (access or response error).
    #[error("Store returned {status}: {message}")]
    Response { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store task failed: {0}")]
    Task(String),
}

impl StoreError {
    /// HTTP-like status for logging, when the failure carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            StoreError::Response { status, .. } => Some(*status),
            StoreError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Required configuration is missing: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors that fail a reconciliation invocation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Malformed notification: {0}")]
    MalformedNotification(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::ConfigurationMissing(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
