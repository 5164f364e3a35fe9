pub mod codec;
pub mod message;

pub use message::{ChannelId, ContentMessage, HistoryEntry, Message, MessageId, OrderingKey, ParticipantId};
