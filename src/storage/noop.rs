//! Transient storage that discards all history.
//!
//! Used when no backend is configured: the history lives only in memory.
//! All operations succeed but store nothing.

use super::HistoryStorage;
use crate::core::message::ContentMessage;
use crate::error::StorageError;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, Default)]
pub struct TransientStorage;

#[async_trait]
impl HistoryStorage for TransientStorage {
    async fn load(&self, _channel_id: &str) -> Result<Vec<ContentMessage>, StorageError> {
        Ok(vec![])
    }

    async fn save(&self, _channel_id: &str, _messages: &[ContentMessage]) -> Result<(), StorageError> {
        Ok(())
    }

    async fn remove(&self, _channel_id: &str) -> Result<(), StorageError> {
        Ok(())
    }
}
