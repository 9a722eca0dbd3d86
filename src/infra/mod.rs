// Adapters behind the app ports, plus start-up wiring

pub mod blob_fetcher;
pub mod cosmos_store;
pub mod credential;
pub mod document_intelligence;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::app::ports::{CredentialPort, SystemClock};
use crate::app::reconcile_use_case::ReconcileUseCase;
use crate::config::{AnalysisMode, Config, StoreBackend};
use crate::constants::ENV_COSMOS_ENDPOINT;
use crate::pipeline::processing::{AnalysisStrategy, FieldExtractor};
use crate::pipeline::storage::{InMemoryRecordStore, RecordStore, SqliteRecordStore, UpsertWriter};

pub use blob_fetcher::ReqwestBlobFetcher;
pub use cosmos_store::CosmosRecordStore;
pub use credential::{build_credential, ManagedIdentityCredential, StaticTokenCredential};
pub use document_intelligence::{AnalyzerAuth, DocumentIntelligenceClient};

/// Build the store selected by `config`.
pub fn build_store(config: &Config, credential: &Arc<dyn CredentialPort>) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Cosmos => {
            let endpoint = config
                .store
                .endpoint
                .as_ref()
                .with_context(|| format!("{} is required for the cosmos backend", ENV_COSMOS_ENDPOINT))?;
            Arc::new(CosmosRecordStore::new(endpoint.clone(), credential.clone()))
        }
        StoreBackend::Sqlite => Arc::new(
            SqliteRecordStore::open(&config.store.sqlite_path)
                .with_context(|| format!("opening {}", config.store.sqlite_path.display()))?,
        ),
        StoreBackend::Memory => Arc::new(InMemoryRecordStore::new()),
    };
    Ok(store)
}

/// Build the field extractor, or `None` when analysis is not configured.
pub fn build_extractor(config: &Config, credential: &Arc<dyn CredentialPort>) -> Option<FieldExtractor> {
    let client = DocumentIntelligenceClient::from_config(&config.analysis, credential.clone())?;
    let strategy = match config.analysis.mode {
        AnalysisMode::ByUrl => AnalysisStrategy::ByUrl,
        AnalysisMode::FetchBytes => {
            AnalysisStrategy::FetchBytes(Arc::new(ReqwestBlobFetcher::new(credential.clone())))
        }
    };
    Some(FieldExtractor::new(Arc::new(client), strategy))
}

/// Validate `config` and assemble the reconciliation use case from it.
/// Every adapter shares one credential, and with it one token cache.
pub fn build_use_case(config: &Config) -> Result<ReconcileUseCase> {
    config.validate().context("invalid configuration")?;

    let credential = build_credential(&config.credential);
    let store = build_store(config, &credential)?;
    let extractor = build_extractor(config, &credential);
    let writer = UpsertWriter::new(store, config.store.collection(), config.write_policy);

    info!(
        backend = ?config.store.backend,
        target = %writer.target(),
        analysis = extractor.as_ref().map(|e| e.strategy_name()).unwrap_or("disabled"),
        write_policy = ?config.write_policy,
        "Reconciliation pipeline configured"
    );

    Ok(ReconcileUseCase::new(extractor, writer, Arc::new(SystemClock)))
}
