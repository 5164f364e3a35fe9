//! Redb-backed key-value store.
//!
//! Implements [`KeyValueStore`] on the redb embedded database so channel
//! histories survive restarts without one file per channel.

use super::kv::KeyValueStore;
use crate::error::StorageError;
use async_trait::async_trait;
use redb::{Database, ReadableDatabase, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const HISTORY_TABLE: TableDefinition<&str, &str> = TableDefinition::new("causal_history");

#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Write {
                key: parent.display().to_string(),
                source,
            })?;
        }

        let db = Database::create(path).map_err(|e| StorageError::Database(e.to_string()))?;
        Self::from_database(Arc::new(db))
    }

    /// Share a database that is already open elsewhere in the application.
    pub fn from_database(db: Arc<Database>) -> Result<Self, StorageError> {
        // Ensure the table exists so reads never hit a missing table
        let write_txn = db
            .begin_write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        {
            let _ = write_txn
                .open_table(HISTORY_TABLE)
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(Self { db })
    }
}

#[async_trait]
impl KeyValueStore for RedbStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let table = read_txn
            .open_table(HISTORY_TABLE)
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let value = table
            .get(key)
            .map_err(|e| StorageError::Database(e.to_string()))?
            .map(|guard| guard.value().to_string());
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(HISTORY_TABLE)
                .map_err(|e| StorageError::Database(e.to_string()))?;
            table
                .insert(key, value.as_str())
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(HISTORY_TABLE)
                .map_err(|e| StorageError::Database(e.to_string()))?;
            table
                .remove(key)
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }
}
