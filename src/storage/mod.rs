//! History Storage Abstraction
//!
//! Information Hiding:
//! - Backend implementation details hidden behind trait
//! - Allows swapping between transient, filesystem, and key-value stores without API changes
//! - Each backend encapsulates its own key layout and failure modes
//!
//! Backends are chosen by the application and injected; nothing here
//! probes the runtime environment.

use crate::config::{StorageBackendKind, StorageConfig};
use crate::core::message::ContentMessage;
use crate::error::StorageError;
use async_trait::async_trait;
use std::sync::Arc;

pub mod filesystem;
pub mod kv;
pub mod memory;
pub mod noop;
pub mod redb;

pub use filesystem::FileStorage;
pub use kv::{KeyValueStorage, KeyValueStore};
pub use memory::MemoryStore;
pub use noop::TransientStorage;
pub use self::redb::RedbStore;

/// Trait defining per-channel history persistence
///
/// Every call reports failures through [`StorageError`]; the caller decides
/// the fallback.
#[async_trait]
pub trait HistoryStorage: Send + Sync {
    /// Load the persisted history for a channel
    /// Returns empty vector if nothing is stored for the channel
    async fn load(&self, channel_id: &str) -> Result<Vec<ContentMessage>, StorageError>;

    /// Replace the persisted history for a channel
    async fn save(&self, channel_id: &str, messages: &[ContentMessage]) -> Result<(), StorageError>;

    /// Remove the persisted history for a channel
    async fn remove(&self, channel_id: &str) -> Result<(), StorageError>;
}

/// Namespaced key for a channel's history: `{prefix}:{channel_id}`.
pub fn channel_key(prefix: &str, channel_id: &str) -> String {
    format!("{}:{}", prefix, channel_id)
}

/// Build the backend named by the storage configuration.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn HistoryStorage>, StorageError> {
    let storage: Arc<dyn HistoryStorage> = match config.backend {
        StorageBackendKind::Transient => Arc::new(TransientStorage),
        StorageBackendKind::Memory => Arc::new(KeyValueStorage::new(
            MemoryStore::new(),
            config.key_prefix.clone(),
        )),
        StorageBackendKind::File => Arc::new(FileStorage::new(&config.base_dir)),
        StorageBackendKind::Redb => Arc::new(KeyValueStorage::new(
            RedbStore::open(&config.database_path)?,
            config.key_prefix.clone(),
        )),
    };

    tracing::info!("[storage] Using {:?} history backend", config.backend);
    Ok(storage)
}
