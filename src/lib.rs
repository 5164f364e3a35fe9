//! Causal History - bounded, gap-aware, persistent message history
//!
//! This library keeps the local per-channel view of a message
//! synchronization protocol: a deduplicated, size-bounded sequence
//! totally ordered by (lamport timestamp, message id), persisted through a
//! pluggable storage backend, and able to report which causal ancestors
//! are still missing.

pub mod config;
pub mod core;
pub mod error;
pub mod history;
pub mod storage;
pub mod telemetry;

pub use self::config::Settings;
pub use self::core::codec::{self, StoredRecord};
pub use self::core::message::{
    ChannelId, ContentMessage, HistoryEntry, Message, MessageId, OrderingKey, ParticipantId,
};
pub use error::{HistoryError, StorageError, ValidationError};
pub use history::{HistoryFactory, HistoryOptions, LocalHistory, StorageSelector};
pub use storage::{
    FileStorage, HistoryStorage, KeyValueStorage, KeyValueStore, MemoryStore, RedbStore,
    TransientStorage,
};
