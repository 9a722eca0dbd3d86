//! Constants shared across the pipeline, adapters and configuration.

// Notification parsing
pub const BLOBS_MARKER: &str = "/blobs/";

// Event Grid event types
pub const SUBSCRIPTION_VALIDATION_EVENT: &str = "Microsoft.EventGrid.SubscriptionValidationEvent";
pub const BLOB_CREATED_EVENT: &str = "Microsoft.Storage.BlobCreated";

// Destination store
pub const DEFAULT_DATABASE: &str = "serverless-demo";
pub const COLLECTION_NAME: &str = "files";
pub const DEFAULT_SQLITE_PATH: &str = "data/records.db";
pub const COSMOS_API_VERSION: &str = "2018-12-31";

// Document analysis
pub const RECEIPT_MODEL_ID: &str = "prebuilt-receipt";
pub const ANALYZE_API_VERSION: &str = "2023-07-31";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_MAX_POLLS: u32 = 60;

// Receipt field names as returned by the prebuilt model
pub const FIELD_MERCHANT_NAME: &str = "MerchantName";
pub const FIELD_TRANSACTION_DATE: &str = "TransactionDate";
pub const FIELD_TOTAL: &str = "Total";

// Token audiences
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";
pub const STORAGE_API_VERSION: &str = "2020-04-08";

// Environment variable names
pub const ENV_COSMOS_ENDPOINT: &str = "CosmosDBEndpoint";
pub const ENV_COSMOS_DATABASE: &str = "CosmosDBDatabase";
pub const ENV_ANALYSIS_ENDPOINT: &str = "DocumentIntelligenceEndpoint";
pub const ENV_ANALYSIS_KEY: &str = "DocumentIntelligenceKey";
pub const ENV_STORE_BACKEND: &str = "BLOB_INDEXER_STORE";
pub const ENV_SQLITE_PATH: &str = "BLOB_INDEXER_SQLITE_PATH";
pub const ENV_ANALYSIS_MODE: &str = "BLOB_INDEXER_ANALYSIS_MODE";
pub const ENV_POLL_INTERVAL_MS: &str = "BLOB_INDEXER_POLL_INTERVAL_MS";
pub const ENV_MAX_POLLS: &str = "BLOB_INDEXER_MAX_POLLS";
pub const ENV_WRITE_POLICY: &str = "BLOB_INDEXER_WRITE_POLICY";
pub const ENV_ACCESS_TOKEN: &str = "BLOB_INDEXER_ACCESS_TOKEN";
pub const ENV_IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub const ENV_IDENTITY_HEADER: &str = "IDENTITY_HEADER";

// Managed identity
pub const IMDS_TOKEN_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
