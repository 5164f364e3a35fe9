//! Error types for the history engine.
//!
//! Only [`HistoryError`] crosses the public [`LocalHistory`](crate::LocalHistory)
//! boundary. [`StorageError`] is the internal result type of every backend
//! call and is absorbed (logged and replaced by a safe fallback) before it
//! can reach a caller.

use crate::core::message::MessageId;
use thiserror::Error;

/// A message offered for admission is not a content message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message {message_id} has no lamport timestamp")]
    MissingLamportTimestamp { message_id: MessageId },

    #[error("message {message_id} has no content")]
    MissingContent { message_id: MessageId },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {key}: {source}")]
    Read {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The stored value for `key` is not a JSON array of records.
    #[error("corrupt history data under {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("database error: {0}")]
    Database(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("max_size must be at least 1, got {0}")]
    InvalidMaxSize(usize),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}
