//! Key-Value History Storage
//!
//! Information Hiding:
//! - Key namespacing hidden behind the channel-oriented trait
//! - Corrupt values are purged on load so they are not reloaded forever
//! - Any get/set/remove store can sit underneath

use super::{channel_key, HistoryStorage};
use crate::core::codec;
use crate::core::message::ContentMessage;
use crate::error::StorageError;
use async_trait::async_trait;

pub const DEFAULT_KEY_PREFIX: &str = "causal-history";

/// Generic string key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// History storage with one value per channel under `{prefix}:{channel_id}`
pub struct KeyValueStorage<S> {
    store: S,
    prefix: String,
}

impl<S: KeyValueStore> KeyValueStorage<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn with_default_prefix(store: S) -> Self {
        Self::new(store, DEFAULT_KEY_PREFIX)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn key_for(&self, channel_id: &str) -> String {
        channel_key(&self.prefix, channel_id)
    }
}

#[async_trait]
impl<S: KeyValueStore> HistoryStorage for KeyValueStorage<S> {
    async fn save(&self, channel_id: &str, messages: &[ContentMessage]) -> Result<(), StorageError> {
        let key = self.key_for(channel_id);
        let json = codec::encode_records(messages).map_err(|e| StorageError::Write {
            key: key.clone(),
            source: e.into(),
        })?;

        self.store.set(&key, json).await?;
        tracing::debug!("[KeyValueStorage] Saved {} messages under '{}'", messages.len(), key);
        Ok(())
    }

    async fn load(&self, channel_id: &str) -> Result<Vec<ContentMessage>, StorageError> {
        let key = self.key_for(channel_id);

        let Some(json) = self.store.get(&key).await? else {
            tracing::debug!("[KeyValueStorage] Nothing stored under '{}'", key);
            return Ok(Vec::new());
        };

        match codec::decode_records(&json) {
            Ok(messages) => {
                tracing::debug!("[KeyValueStorage] Loaded {} messages from '{}'", messages.len(), key);
                Ok(messages)
            }
            Err(e) => {
                tracing::warn!("[KeyValueStorage] Removing corrupt value under '{}': {}", key, e);
                self.store.remove(&key).await?;
                Err(StorageError::Corrupt {
                    key,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn remove(&self, channel_id: &str) -> Result<(), StorageError> {
        let key = self.key_for(channel_id);
        self.store.remove(&key).await?;
        tracing::debug!("[KeyValueStorage] Removed '{}'", key);
        Ok(())
    }
}
