//! Message model
//!
//! Information Hiding:
//! - Identifiers are opaque strings; the engine never inspects their structure
//! - Admission rules live in the `TryFrom<Message>` conversion
//! - Ordering is structural (clock first, id bytes second), never textual

use crate::error::ValidationError;
use std::cmp::Ordering;

pub type MessageId = String;
pub type ChannelId = String;
pub type ParticipantId = String;

/// Reference to a causal ancestor, never a full message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HistoryEntry {
    pub message_id: MessageId,
    /// Alternate-transport fetch hint for the referenced message
    pub retrieval_hint: Option<Vec<u8>>,
}

impl HistoryEntry {
    pub fn new(message_id: impl Into<MessageId>) -> Self {
        Self {
            message_id: message_id.into(),
            retrieval_hint: None,
        }
    }

    pub fn with_retrieval_hint(mut self, hint: impl Into<Vec<u8>>) -> Self {
        self.retrieval_hint = non_empty(Some(hint.into()));
        self
    }

    fn normalized(self) -> Self {
        Self {
            message_id: self.message_id,
            retrieval_hint: non_empty(self.retrieval_hint),
        }
    }
}

/// Zero-length optional bytes are the same as absent ones.
fn non_empty(bytes: Option<Vec<u8>>) -> Option<Vec<u8>> {
    bytes.filter(|b| !b.is_empty())
}

/// A message as handed over by the protocol layer.
///
/// Control and ephemeral variants carry neither a lamport timestamp nor
/// content; those are rejected when converting into a [`ContentMessage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: ParticipantId,
    pub causal_history: Vec<HistoryEntry>,
    pub lamport_timestamp: Option<u64>,
    pub bloom_filter: Option<Vec<u8>>,
    pub content: Option<Vec<u8>>,
    pub retrieval_hint: Option<Vec<u8>>,
}

/// A validated, content-bearing message. The only kind the history retains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMessage {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    pub sender_id: ParticipantId,
    pub causal_history: Vec<HistoryEntry>,
    pub lamport_timestamp: u64,
    pub bloom_filter: Option<Vec<u8>>,
    pub content: Vec<u8>,
    pub retrieval_hint: Option<Vec<u8>>,
}

impl ContentMessage {
    pub fn new(
        message_id: impl Into<MessageId>,
        channel_id: impl Into<ChannelId>,
        sender_id: impl Into<ParticipantId>,
        lamport_timestamp: u64,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            channel_id: channel_id.into(),
            sender_id: sender_id.into(),
            causal_history: Vec::new(),
            lamport_timestamp,
            bloom_filter: None,
            content: content.into(),
            retrieval_hint: None,
        }
    }

    pub fn with_causal_history(mut self, causal_history: Vec<HistoryEntry>) -> Self {
        self.causal_history = causal_history.into_iter().map(HistoryEntry::normalized).collect();
        self
    }

    pub fn with_bloom_filter(mut self, bloom_filter: impl Into<Vec<u8>>) -> Self {
        self.bloom_filter = non_empty(Some(bloom_filter.into()));
        self
    }

    pub fn with_retrieval_hint(mut self, hint: impl Into<Vec<u8>>) -> Self {
        self.retrieval_hint = non_empty(Some(hint.into()));
        self
    }

    pub fn ordering_key(&self) -> OrderingKey<'_> {
        OrderingKey {
            lamport_timestamp: self.lamport_timestamp,
            message_id: &self.message_id,
        }
    }

    /// A reference to this message suitable for another message's causal history.
    pub fn to_history_entry(&self) -> HistoryEntry {
        HistoryEntry {
            message_id: self.message_id.clone(),
            retrieval_hint: self.retrieval_hint.clone(),
        }
    }
}

impl TryFrom<Message> for ContentMessage {
    type Error = ValidationError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        let Some(lamport_timestamp) = message.lamport_timestamp else {
            return Err(ValidationError::MissingLamportTimestamp {
                message_id: message.message_id,
            });
        };
        let Some(content) = message.content else {
            return Err(ValidationError::MissingContent {
                message_id: message.message_id,
            });
        };

        // Zero-length optional bytes are admitted as absent
        Ok(Self {
            message_id: message.message_id,
            channel_id: message.channel_id,
            sender_id: message.sender_id,
            causal_history: message
                .causal_history
                .into_iter()
                .map(HistoryEntry::normalized)
                .collect(),
            lamport_timestamp,
            bloom_filter: non_empty(message.bloom_filter),
            content,
            retrieval_hint: non_empty(message.retrieval_hint),
        })
    }
}

impl From<ContentMessage> for Message {
    fn from(message: ContentMessage) -> Self {
        Self {
            message_id: message.message_id,
            channel_id: message.channel_id,
            sender_id: message.sender_id,
            causal_history: message.causal_history,
            lamport_timestamp: Some(message.lamport_timestamp),
            bloom_filter: message.bloom_filter,
            content: Some(message.content),
            retrieval_hint: message.retrieval_hint,
        }
    }
}

/// Total order over retained messages: numeric clock, then raw id bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderingKey<'a> {
    pub lamport_timestamp: u64,
    pub message_id: &'a str,
}

impl Ord for OrderingKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport_timestamp
            .cmp(&other.lamport_timestamp)
            .then_with(|| self.message_id.as_bytes().cmp(other.message_id.as_bytes()))
    }
}

impl PartialOrd for OrderingKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
