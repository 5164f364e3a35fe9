//! Storage codec
//!
//! Information Hiding:
//! - Text encoding of binary fields (hex) and of the lamport clock (decimal)
//! - Persisted JSON schema shape
//! - Per-record failure isolation during decoding

use crate::core::message::{ContentMessage, HistoryEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One persisted message, as it appears in the JSON array for a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub message_id: String,
    pub channel_id: String,
    pub sender_id: String,
    pub lamport_timestamp: String,
    pub causal_history: Vec<StoredHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bloom_filter: Option<String>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredHistoryEntry {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_hint: Option<String>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed record: {0}")]
    Structure(#[from] serde_json::Error),

    #[error("field {field} is not valid hex: {source}")]
    Hex {
        field: &'static str,
        #[source]
        source: hex::FromHexError,
    },

    #[error("lamport timestamp {0:?} is not an unsigned 64-bit decimal")]
    Timestamp(String),
}

/// Absent and zero-length optional fields are both omitted.
fn encode_optional(bytes: &Option<Vec<u8>>) -> Option<String> {
    bytes
        .as_deref()
        .filter(|b| !b.is_empty())
        .map(hex::encode)
}

fn decode_hex(field: &'static str, text: &str) -> Result<Vec<u8>, DecodeError> {
    hex::decode(text).map_err(|source| DecodeError::Hex { field, source })
}

fn decode_optional(field: &'static str, text: &Option<String>) -> Result<Option<Vec<u8>>, DecodeError> {
    let bytes = text.as_deref().map(|t| decode_hex(field, t)).transpose()?;
    Ok(bytes.filter(|b| !b.is_empty()))
}

fn decode_timestamp(text: &str) -> Result<u64, DecodeError> {
    // u64::from_str would accept a leading '+'
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::Timestamp(text.to_string()));
    }
    text.parse::<u64>()
        .map_err(|_| DecodeError::Timestamp(text.to_string()))
}

pub fn serialize(message: &ContentMessage) -> StoredRecord {
    StoredRecord {
        message_id: message.message_id.clone(),
        channel_id: message.channel_id.clone(),
        sender_id: message.sender_id.clone(),
        lamport_timestamp: message.lamport_timestamp.to_string(),
        causal_history: message
            .causal_history
            .iter()
            .map(|entry| StoredHistoryEntry {
                message_id: entry.message_id.clone(),
                retrieval_hint: encode_optional(&entry.retrieval_hint),
            })
            .collect(),
        bloom_filter: encode_optional(&message.bloom_filter),
        content: hex::encode(&message.content),
        retrieval_hint: encode_optional(&message.retrieval_hint),
    }
}

pub fn try_deserialize(record: &StoredRecord) -> Result<ContentMessage, DecodeError> {
    let causal_history = record
        .causal_history
        .iter()
        .map(|entry| {
            Ok(HistoryEntry {
                message_id: entry.message_id.clone(),
                retrieval_hint: decode_optional("causalHistory.retrievalHint", &entry.retrieval_hint)?,
            })
        })
        .collect::<Result<Vec<_>, DecodeError>>()?;

    Ok(ContentMessage {
        message_id: record.message_id.clone(),
        channel_id: record.channel_id.clone(),
        sender_id: record.sender_id.clone(),
        causal_history,
        lamport_timestamp: decode_timestamp(&record.lamport_timestamp)?,
        bloom_filter: decode_optional("bloomFilter", &record.bloom_filter)?,
        content: decode_hex("content", &record.content)?,
        retrieval_hint: decode_optional("retrievalHint", &record.retrieval_hint)?,
    })
}

/// Decode one record, or `None` if it is malformed. Callers drop `None`.
pub fn deserialize(record: &StoredRecord) -> Option<ContentMessage> {
    match try_deserialize(record) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!("[codec] Dropping record '{}': {}", record.message_id, e);
            None
        }
    }
}

/// Encode a full history as the persisted JSON array.
pub fn encode_records(messages: &[ContentMessage]) -> Result<String, serde_json::Error> {
    let records: Vec<StoredRecord> = messages.iter().map(serialize).collect();
    serde_json::to_string(&records)
}

/// Decode a persisted JSON array.
///
/// Fails only when the top level is not a JSON array. Individual elements
/// that do not decode are dropped without affecting their siblings.
pub fn decode_records(json: &str) -> Result<Vec<ContentMessage>, serde_json::Error> {
    let values: Vec<Value> = serde_json::from_str(json)?;

    let messages = values
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<StoredRecord>(value) {
            Ok(record) => deserialize(&record),
            Err(e) => {
                tracing::warn!("[codec] Dropping malformed record: {}", e);
                None
            }
        })
        .collect();

    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ContentMessage {
        ContentMessage::new("m1", "chan", "alice", 42, vec![1, 2, 3])
    }

    #[test]
    fn test_absent_bloom_filter_is_omitted() {
        let record = serialize(&sample());
        let value = serde_json::to_value(&record).unwrap();

        assert!(value.get("bloomFilter").is_none());
        assert!(value.get("retrievalHint").is_none());
        assert_eq!(value["content"], "010203");
        assert_eq!(value["lamportTimestamp"], "42");

        let decoded = deserialize(&record).unwrap();
        assert_eq!(decoded.bloom_filter, None);
    }

    #[test]
    fn test_round_trip_is_lossless_and_stable() {
        let message = sample()
            .with_bloom_filter(vec![0xde, 0xad])
            .with_retrieval_hint(vec![9])
            .with_causal_history(vec![
                HistoryEntry::new("m0"),
                HistoryEntry::new("m-1").with_retrieval_hint(vec![0xbe, 0xef]),
            ]);
        let message = ContentMessage {
            lamport_timestamp: u64::MAX,
            ..message
        };

        let record = serialize(&message);
        let decoded = deserialize(&record).unwrap();
        assert_eq!(decoded, message);

        let again = serde_json::to_string(&serialize(&decoded)).unwrap();
        assert_eq!(again, serde_json::to_string(&record).unwrap());
    }

    #[test]
    fn test_timestamp_overflow_drops_record() {
        let mut record = serialize(&sample());
        record.lamport_timestamp = "18446744073709551616".to_string();
        assert!(deserialize(&record).is_none());

        record.lamport_timestamp = "+5".to_string();
        assert!(deserialize(&record).is_none());
    }

    #[test]
    fn test_bad_hex_drops_record() {
        let mut record = serialize(&sample());
        record.content = "xyz".to_string();

        assert!(matches!(
            try_deserialize(&record),
            Err(DecodeError::Hex { field: "content", .. })
        ));
    }

    #[test]
    fn test_decode_records_keeps_valid_siblings() {
        let good = serde_json::to_value(serialize(&sample())).unwrap();
        let json = json!([good, { "messageId": "broken" }, 17]).to_string();

        let messages = decode_records(&json).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "m1");
    }

    #[test]
    fn test_decode_records_rejects_non_array() {
        assert!(decode_records("{ invalid json }").is_err());
        assert!(decode_records(r#"{"messageId":"m1"}"#).is_err());
    }

    #[test]
    fn test_encode_records_preserves_order() {
        let messages = vec![
            ContentMessage::new("a", "chan", "alice", 1, vec![1]),
            ContentMessage::new("b", "chan", "bob", 2, vec![2]),
        ];

        let decoded = decode_records(&encode_records(&messages).unwrap()).unwrap();
        assert_eq!(decoded, messages);
    }
}
