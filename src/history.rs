//! Local History - Bounded, Ordered, Persistent Message History
//!
//! Information Hiding:
//! - Storage backend hidden from history users
//! - Ordering, deduplication and eviction internalized
//! - Storage failures absorbed; callers only ever see validation errors

use crate::config::Settings;
use crate::core::message::{ChannelId, ContentMessage, HistoryEntry, Message, MessageId};
use crate::error::{HistoryError, StorageError};
use crate::storage::{self, FileStorage, HistoryStorage, TransientStorage};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use crate::config::DEFAULT_MAX_SIZE;

/// Where a history persists itself
#[derive(Clone, Default)]
pub enum StorageSelector {
    /// Pure in-memory history
    #[default]
    Transient,
    /// Default file backend for this channel
    Channel(ChannelId),
    /// Caller-supplied backend, keyed by this channel
    Backend {
        channel_id: ChannelId,
        storage: Arc<dyn HistoryStorage>,
    },
}

/// Construction options for [`LocalHistory`]
#[derive(Clone)]
pub struct HistoryOptions {
    pub storage: StorageSelector,
    pub max_size: usize,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            storage: StorageSelector::Transient,
            max_size: DEFAULT_MAX_SIZE,
        }
    }
}

impl HistoryOptions {
    pub fn with_channel(mut self, channel_id: impl Into<ChannelId>) -> Self {
        self.storage = StorageSelector::Channel(channel_id.into());
        self
    }

    pub fn with_backend(
        mut self,
        channel_id: impl Into<ChannelId>,
        storage: Arc<dyn HistoryStorage>,
    ) -> Self {
        self.storage = StorageSelector::Backend {
            channel_id: channel_id.into(),
            storage,
        };
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }
}

/// Opens histories for many channels over one configured backend.
///
/// The backend is built once, so stores that hold a file lock (redb) or
/// in-process state (memory) are shared by every channel.
#[derive(Clone)]
pub struct HistoryFactory {
    storage: Arc<dyn HistoryStorage>,
    max_size: usize,
}

impl HistoryFactory {
    pub fn new(storage: Arc<dyn HistoryStorage>, max_size: usize) -> Self {
        Self { storage, max_size }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, StorageError> {
        let storage = storage::from_config(&settings.storage)?;
        Ok(Self::new(storage, settings.history.max_size))
    }

    pub fn storage(&self) -> Arc<dyn HistoryStorage> {
        Arc::clone(&self.storage)
    }

    pub fn options(&self, channel_id: impl Into<ChannelId>) -> HistoryOptions {
        HistoryOptions::default()
            .with_backend(channel_id, self.storage())
            .with_max_size(self.max_size)
    }

    pub async fn open(&self, channel_id: impl Into<ChannelId>) -> Result<LocalHistory, HistoryError> {
        LocalHistory::new(self.options(channel_id)).await
    }
}

/// Gap-aware causal history for one channel.
///
/// Retained messages are kept sorted by (lamport timestamp, message id),
/// unique by id, and never more than `max_size` of them. Every mutating
/// call rewrites the persisted copy in full.
pub struct LocalHistory {
    channel_id: Option<ChannelId>,
    storage: Arc<dyn HistoryStorage>,
    messages: Vec<ContentMessage>,
    index: HashMap<MessageId, usize>,
    max_size: usize,
}

impl LocalHistory {
    /// Create a history and restore whatever the backend holds.
    ///
    /// Only an invalid `max_size` fails; restore problems yield an empty history.
    pub async fn new(options: HistoryOptions) -> Result<Self, HistoryError> {
        if options.max_size == 0 {
            return Err(HistoryError::InvalidMaxSize(options.max_size));
        }

        let (channel_id, storage): (Option<ChannelId>, Arc<dyn HistoryStorage>) =
            match options.storage {
                StorageSelector::Transient => (None, Arc::new(TransientStorage)),
                StorageSelector::Channel(channel_id) => {
                    (Some(channel_id), Arc::new(FileStorage::default()))
                }
                StorageSelector::Backend {
                    channel_id,
                    storage,
                } => (Some(channel_id), storage),
            };

        let mut history = Self {
            channel_id,
            storage,
            messages: Vec::new(),
            index: HashMap::new(),
            max_size: options.max_size,
        };
        history.restore().await;
        Ok(history)
    }

    /// In-memory history with the default bound.
    pub fn transient() -> Self {
        Self {
            channel_id: None,
            storage: Arc::new(TransientStorage),
            messages: Vec::new(),
            index: HashMap::new(),
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    fn storage_key(&self) -> &str {
        self.channel_id.as_deref().unwrap_or_default()
    }

    async fn restore(&mut self) {
        let loaded = match self.storage.load(self.storage_key()).await {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(
                    "[LocalHistory] Restore failed for channel '{}', starting empty: {}",
                    self.storage_key(),
                    e
                );
                return;
            }
        };

        if loaded.is_empty() {
            return;
        }

        // Persisted data may predate a smaller bound or hold duplicates
        self.merge(loaded);
        tracing::info!(
            "[LocalHistory] Restored {} messages for channel '{}'",
            self.messages.len(),
            self.storage_key()
        );
    }

    /// Validate, merge, order, deduplicate, bound and persist.
    ///
    /// The batch is all-or-nothing: if any message fails validation nothing
    /// is added. A message whose id is already present is ignored (the first
    /// copy seen is kept). Returns how many of the given messages are newly
    /// retained once the bound is enforced.
    pub async fn add_messages<I>(&mut self, messages: I) -> Result<usize, HistoryError>
    where
        I: IntoIterator,
        I::Item: Into<Message>,
    {
        let validated = messages
            .into_iter()
            .map(|message| ContentMessage::try_from(message.into()))
            .collect::<Result<Vec<_>, _>>()?;

        let admitted = self.merge(validated);
        self.persist().await;
        Ok(admitted)
    }

    /// Insert unseen messages, restore order, evict, rebuild the index.
    fn merge(&mut self, incoming: Vec<ContentMessage>) -> usize {
        let mut new_ids = HashSet::new();
        for message in incoming {
            if self.index.contains_key(&message.message_id)
                || !new_ids.insert(message.message_id.clone())
            {
                continue;
            }
            self.messages.push(message);
        }

        // Ids are unique at this point, so the order is total
        self.messages
            .sort_unstable_by(|a, b| a.ordering_key().cmp(&b.ordering_key()));

        if self.messages.len() > self.max_size {
            let excess = self.messages.len() - self.max_size;
            self.messages.drain(..excess);
            tracing::debug!("[LocalHistory] Evicted {} oldest messages", excess);
        }

        self.rebuild_index();
        new_ids
            .iter()
            .filter(|id| self.index.contains_key(*id))
            .count()
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .messages
            .iter()
            .enumerate()
            .map(|(position, message)| (message.message_id.clone(), position))
            .collect();
    }

    async fn persist(&self) {
        let result = if self.messages.is_empty() {
            self.storage.remove(self.storage_key()).await
        } else {
            self.storage.save(self.storage_key(), &self.messages).await
        };

        if let Err(e) = result {
            tracing::warn!(
                "[LocalHistory] Persist failed for channel '{}', keeping in-memory state: {}",
                self.storage_key(),
                e
            );
        }
    }

    /// Drop every message and the persisted copy.
    pub async fn clear(&mut self) {
        self.messages.clear();
        self.index.clear();
        self.persist().await;
    }

    pub fn has_message(&self, message_id: &str) -> bool {
        self.index.contains_key(message_id)
    }

    pub fn get_message(&self, message_id: &str) -> Option<&ContentMessage> {
        self.index
            .get(message_id)
            .and_then(|&position| self.messages.get(position))
    }

    /// The `count` most recent messages, oldest first.
    pub fn recent_messages(&self, count: usize) -> &[ContentMessage] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    /// Owned copy of the whole ordered history.
    pub fn all_messages(&self) -> Vec<ContentMessage> {
        self.messages.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentMessage> {
        self.messages.iter()
    }

    /// Ids of the `count` most recent messages, oldest first.
    pub fn recent_message_ids(&self, count: usize) -> impl Iterator<Item = &MessageId> {
        self.recent_messages(count).iter().map(|m| &m.message_id)
    }

    /// Entries whose message is not held locally, in input order.
    pub fn find_missing_dependencies(&self, entries: &[HistoryEntry]) -> Vec<HistoryEntry> {
        entries
            .iter()
            .filter(|entry| !self.has_message(&entry.message_id))
            .cloned()
            .collect()
    }

    pub fn latest_lamport_timestamp(&self) -> Option<u64> {
        self.messages.last().map(|m| m.lamport_timestamp)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::storage::{KeyValueStorage, KeyValueStore, MemoryStore};
    use async_trait::async_trait;

    fn message(id: &str, ts: u64) -> ContentMessage {
        ContentMessage::new(id, "general", "alice", ts, vec![1, 2, 3])
    }

    async fn bounded(max_size: usize) -> LocalHistory {
        LocalHistory::new(HistoryOptions::default().with_max_size(max_size))
            .await
            .unwrap()
    }

    fn ids(history: &LocalHistory) -> Vec<&str> {
        history.iter().map(|m| m.message_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_eviction_drops_oldest() {
        let mut history = bounded(2).await;

        history.add_messages([message("m1", 1)]).await.unwrap();
        history.add_messages([message("m2", 2)]).await.unwrap();
        assert_eq!(history.len(), 2);

        history.add_messages([message("m3", 3)]).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(ids(&history), vec!["m2", "m3"]);
        assert!(!history.has_message("m1"));
    }

    #[tokio::test]
    async fn test_batched_eviction_matches_incremental() {
        let mut history = bounded(2).await;

        history.add_messages([message("m1", 1)]).await.unwrap();
        history
            .add_messages([message("m2", 2), message("m3", 3)])
            .await
            .unwrap();

        assert_eq!(ids(&history), vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn test_out_of_order_insertion_is_sorted() {
        let mut history = LocalHistory::transient();

        history
            .add_messages([message("c", 10), message("b", 9), message("a", 10), message("z", 2)])
            .await
            .unwrap();

        assert_eq!(ids(&history), vec!["z", "b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_readding_existing_id_keeps_first_copy() {
        let mut history = LocalHistory::transient();
        history.add_messages([message("m1", 5)]).await.unwrap();

        let redelivered = ContentMessage::new("m1", "general", "mallory", 1, vec![9]);
        let admitted = history.add_messages([redelivered]).await.unwrap();

        assert_eq!(admitted, 0);
        assert_eq!(history.len(), 1);
        let kept = history.get_message("m1").unwrap();
        assert_eq!(kept.lamport_timestamp, 5);
        assert_eq!(kept.sender_id, "alice");
    }

    #[tokio::test]
    async fn test_duplicates_within_batch_keep_earliest() {
        let mut history = LocalHistory::transient();

        let first = message("m1", 3);
        let second = ContentMessage::new("m1", "general", "bob", 1, vec![0]);
        let admitted = history.add_messages([first.clone(), second]).await.unwrap();

        assert_eq!(admitted, 1);
        assert_eq!(history.all_messages(), vec![first]);
    }

    #[tokio::test]
    async fn test_invalid_batch_adds_nothing() {
        let mut history = LocalHistory::transient();
        history.add_messages([message("m0", 1)]).await.unwrap();

        let mut control: Message = message("ctl", 2).into();
        control.content = None;

        let err = history
            .add_messages(vec![message("m1", 2).into(), control])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            HistoryError::Validation(ValidationError::MissingContent { .. })
        ));
        assert_eq!(ids(&history), vec!["m0"]);
    }

    #[tokio::test]
    async fn test_zero_max_size_is_rejected() {
        let result = LocalHistory::new(HistoryOptions::default().with_max_size(0)).await;
        assert!(matches!(result, Err(HistoryError::InvalidMaxSize(0))));
    }

    #[tokio::test]
    async fn test_recent_messages() {
        let mut history = LocalHistory::transient();
        history
            .add_messages((1..=5).map(|i| message(&format!("m{}", i), i)))
            .await
            .unwrap();

        let recent: Vec<_> = history.recent_messages(2).iter().map(|m| m.lamport_timestamp).collect();
        assert_eq!(recent, vec![4, 5]);
        assert_eq!(history.recent_messages(100).len(), 5);
        assert!(history.recent_messages(0).is_empty());

        let recent_ids: Vec<_> = history.recent_message_ids(3).cloned().collect();
        assert_eq!(recent_ids, vec!["m3", "m4", "m5"]);
        assert_eq!(history.latest_lamport_timestamp(), Some(5));
    }

    #[tokio::test]
    async fn test_all_messages_is_a_copy() {
        let mut history = LocalHistory::transient();
        history.add_messages([message("m1", 1)]).await.unwrap();

        let mut copy = history.all_messages();
        copy.clear();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_find_missing_dependencies_preserves_order() {
        let mut history = LocalHistory::transient();
        history.add_messages([message("m2", 2)]).await.unwrap();

        let entries = vec![
            HistoryEntry::new("m3").with_retrieval_hint(vec![1]),
            HistoryEntry::new("m2"),
            HistoryEntry::new("m1"),
        ];
        let missing = history.find_missing_dependencies(&entries);

        assert_eq!(missing, vec![entries[0].clone(), entries[2].clone()]);
    }

    #[tokio::test]
    async fn test_index_follows_eviction() {
        let mut history = bounded(3).await;
        history
            .add_messages((1..=10).map(|i| message(&format!("m{}", i), i)))
            .await
            .unwrap();

        for message in history.iter() {
            assert_eq!(history.get_message(&message.message_id), Some(message));
        }
        assert!(history.get_message("m7").is_none());
        assert_eq!(ids(&history), vec!["m8", "m9", "m10"]);
    }

    #[tokio::test]
    async fn test_restore_from_backend() {
        let storage: Arc<dyn HistoryStorage> =
            Arc::new(KeyValueStorage::with_default_prefix(MemoryStore::new()));
        let options = HistoryOptions::default().with_backend("general", storage);

        {
            let mut history = LocalHistory::new(options.clone()).await.unwrap();
            history
                .add_messages([message("m2", 2), message("m1", 1)])
                .await
                .unwrap();
        }

        let history = LocalHistory::new(options).await.unwrap();
        assert_eq!(ids(&history), vec!["m1", "m2"]);
        assert_eq!(history.channel_id(), Some("general"));
    }

    #[tokio::test]
    async fn test_restore_enforces_smaller_bound() {
        let storage: Arc<dyn HistoryStorage> =
            Arc::new(KeyValueStorage::with_default_prefix(MemoryStore::new()));
        storage
            .save("general", &[message("m1", 1), message("m2", 2), message("m3", 3)])
            .await
            .unwrap();

        let history = LocalHistory::new(
            HistoryOptions::default()
                .with_backend("general", storage)
                .with_max_size(2),
        )
        .await
        .unwrap();

        assert_eq!(ids(&history), vec!["m2", "m3"]);
    }

    #[tokio::test]
    async fn test_clear_removes_persisted_copy() {
        let store = MemoryStore::new();
        let storage: Arc<dyn HistoryStorage> = Arc::new(KeyValueStorage::with_default_prefix(store.clone()));
        let mut history = LocalHistory::new(HistoryOptions::default().with_backend("general", storage))
            .await
            .unwrap();

        history.add_messages([message("m1", 1)]).await.unwrap();
        assert!(!store.is_empty().await);

        history.clear().await;
        assert!(history.is_empty());
        assert!(!history.has_message("m1"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_empty_optional_bytes_survive_restart() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let storage: Arc<dyn HistoryStorage> = Arc::new(FileStorage::new(temp_dir.path()));
        let options = HistoryOptions::default().with_backend("general", storage);

        let wire = Message {
            message_id: "m1".to_string(),
            channel_id: "general".to_string(),
            sender_id: "alice".to_string(),
            causal_history: vec![HistoryEntry {
                message_id: "m0".to_string(),
                retrieval_hint: Some(Vec::new()),
            }],
            lamport_timestamp: Some(1),
            bloom_filter: Some(Vec::new()),
            content: Some(vec![1]),
            retrieval_hint: Some(Vec::new()),
        };
        let built = message("m2", 2)
            .with_bloom_filter(Vec::new())
            .with_retrieval_hint(Vec::new());

        let before = {
            let mut history = LocalHistory::new(options.clone()).await.unwrap();
            history.add_messages(vec![wire, built.into()]).await.unwrap();
            history.all_messages()
        };

        let after = LocalHistory::new(options).await.unwrap();
        assert_eq!(after.all_messages(), before);
        assert_eq!(before[0].bloom_filter, None);
        assert_eq!(before[0].causal_history, vec![HistoryEntry::new("m0")]);
    }

    struct FailingStore;

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Database("unavailable".to_string()))
        }

        async fn set(&self, _key: &str, _value: String) -> Result<(), StorageError> {
            Err(StorageError::Database("unavailable".to_string()))
        }

        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Database("unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_storage_failures_are_absorbed() {
        let storage: Arc<dyn HistoryStorage> = Arc::new(KeyValueStorage::with_default_prefix(FailingStore));
        let mut history = LocalHistory::new(HistoryOptions::default().with_backend("general", storage))
            .await
            .unwrap();
        assert!(history.is_empty());

        let admitted = history.add_messages([message("m1", 1)]).await.unwrap();
        assert_eq!(admitted, 1);
        assert!(history.has_message("m1"));
    }
}
