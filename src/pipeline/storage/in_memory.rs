use super::{CollectionRef, RecordStore};
use crate::domain::MetadataRecord;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type Items = HashMap<(CollectionRef, String), MetadataRecord>;

/// In-memory store for development/testing
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    items: Arc<Mutex<Items>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Items>, StoreError> {
        self.items
            .lock()
            .map_err(|_| StoreError::Task("in-memory store lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored record, sorted by collection then id.
    pub fn snapshot(&self) -> Vec<(CollectionRef, MetadataRecord)> {
        let mut all: Vec<_> = match self.lock() {
            Ok(items) => items
                .iter()
                .map(|((target, _), record)| (target.clone(), record.clone()))
                .collect(),
            Err(_) => Vec::new(),
        };
        all.sort_by(|a, b| (a.0.to_string(), &a.1.id).cmp(&(b.0.to_string(), &b.1.id)));
        all
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, target: &CollectionRef, id: &str) -> Result<Option<MetadataRecord>, StoreError> {
        let items = self.lock()?;
        Ok(items.get(&(target.clone(), id.to_string())).cloned())
    }

    async fn upsert(&self, target: &CollectionRef, record: &MetadataRecord) -> Result<(), StoreError> {
        let mut items = self.lock()?;
        let replaced = items
            .insert((target.clone(), record.id.clone()), record.clone())
            .is_some();
        debug!("Upserted record {} in {} (replaced: {})", record.id, target, replaced);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
