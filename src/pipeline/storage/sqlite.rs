use super::{CollectionRef, RecordStore};
use crate::domain::MetadataRecord;
use crate::error::StoreError;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Local single-file store. One row per `(database, collection, id)` holding
/// the record's JSON body.
#[derive(Clone)]
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS records (
                database    TEXT NOT NULL,
                collection  TEXT NOT NULL,
                id          TEXT NOT NULL,
                body        TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                PRIMARY KEY (database, collection, id)
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("sqlite connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, target: &CollectionRef, id: &str) -> Result<Option<MetadataRecord>, StoreError> {
        let target = target.clone();
        let id = id.to_string();
        let body = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT body FROM records WHERE database = ?1 AND collection = ?2 AND id = ?3",
                )?;
                let mut rows = stmt.query(params![target.database, target.collection, id])?;
                if let Some(row) = rows.next()? {
                    let body: String = row.get(0)?;
                    Ok(Some(body))
                } else {
                    Ok(None)
                }
            })
            .await?;
        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, target: &CollectionRef, record: &MetadataRecord) -> Result<(), StoreError> {
        let body = serde_json::to_string(record)?;
        let updated_at = record.timestamp.to_rfc3339();
        let target = target.clone();
        let id = record.id.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO records (database, collection, id, body, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(database, collection, id) DO UPDATE SET body=excluded.body, updated_at=excluded.updated_at",
                params![target.database, target.collection, id, body, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn record(total: Option<f64>) -> MetadataRecord {
        MetadataRecord {
            id: "r1.jpg".into(),
            file_name: "r1.jpg".into(),
            blob_path: "receipts/r1.jpg".into(),
            blob_url: Some("https://acct.blob.core.windows.net/files/receipts/r1.jpg".into()),
            blob_size: 2048,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            event_type: Some("Microsoft.Storage.BlobCreated".into()),
            purchase_date: None,
            merchant_name: None,
            total_amount: total,
        }
    }

    #[tokio::test]
    async fn round_trips_and_replaces() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let store = SqliteRecordStore::open(dir.path().join("nested").join("records.db"))?;
        let target = CollectionRef::new("serverless-demo", "files");

        assert!(store.get(&target, "r1.jpg").await?.is_none());

        store.upsert(&target, &record(Some(19.99))).await?;
        assert_eq!(store.get(&target, "r1.jpg").await?, Some(record(Some(19.99))));

        store.upsert(&target, &record(None)).await?;
        assert_eq!(store.get(&target, "r1.jpg").await?, Some(record(None)));
        Ok(())
    }

    #[tokio::test]
    async fn persists_across_reopen() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("records.db");
        let target = CollectionRef::new("db", "files");
        {
            let store = SqliteRecordStore::open(&path)?;
            store.upsert(&target, &record(Some(1.0))).await?;
        }
        let reopened = SqliteRecordStore::open(&path)?;
        assert_eq!(reopened.get(&target, "r1.jpg").await?.and_then(|r| r.total_amount), Some(1.0));
        Ok(())
    }
}
