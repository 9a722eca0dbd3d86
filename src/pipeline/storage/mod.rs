// Destination store contract and the local implementations

pub mod in_memory;
pub mod sqlite;
pub mod writer;

pub use in_memory::InMemoryRecordStore;
pub use sqlite::SqliteRecordStore;
pub use writer::{UpsertWriter, WritePolicy};

use async_trait::async_trait;

use crate::domain::MetadataRecord;
use crate::error::StoreError;

/// A named collection inside a named logical database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub database: String,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.database, self.collection)
    }
}

/// Keyed document store. `upsert` inserts or fully replaces the item at
/// `record.id`; it never merges fields.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, target: &CollectionRef, id: &str) -> Result<Option<MetadataRecord>, StoreError>;

    async fn upsert(&self, target: &CollectionRef, record: &MetadataRecord) -> Result<(), StoreError>;

    fn backend_name(&self) -> &'static str;
}
