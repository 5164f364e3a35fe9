//! File System History Storage
//!
//! Information Hiding:
//! - File paths and JSON serialization format hidden from users
//! - Directory structure management hidden behind interface
//! - Persistence mechanism independent of storage trait users

use super::HistoryStorage;
use crate::core::codec;
use crate::core::message::ContentMessage;
use crate::error::StorageError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_BASE_DIR: &str = "./history";

/// File system storage - each channel is a JSON file
/// Files are stored as {base_path}/{escaped channel_id}.json
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    /// No I/O happens here; the directory is created on first save.
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn channel_path(&self, channel_id: &str) -> PathBuf {
        self.base_path.join(format!("{}.json", escape_channel_id(channel_id)))
    }

    /// List channels that have a history file.
    pub async fn channels(&self) -> Result<Vec<String>, StorageError> {
        let key = self.base_path.display().to_string();
        let mut channels = Vec::new();

        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(channels),
            Err(source) => return Err(StorageError::Read { key, source }),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StorageError::Read { key: key.clone(), source })?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                if let Some(channel_id) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(unescape_channel_id)
                {
                    channels.push(channel_id);
                }
            }
        }

        tracing::debug!("[FileStorage] Listed {} channels", channels.len());
        Ok(channels)
    }
}

impl Default for FileStorage {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DIR)
    }
}

/// Stem for the empty channel id; escaping never produces a bare `%`.
const EMPTY_CHANNEL_STEM: &str = "%";

/// Keep `[A-Za-z0-9._-]`, escape every other byte as `%XX`.
///
/// Distinct ids map to distinct, non-empty names that never contain a path separator.
fn escape_channel_id(channel_id: &str) -> String {
    if channel_id.is_empty() {
        return EMPTY_CHANNEL_STEM.to_string();
    }
    let mut escaped = String::with_capacity(channel_id.len());
    for byte in channel_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            escaped.push(byte as char);
        } else {
            escaped.push_str(&format!("%{:02X}", byte));
        }
    }
    escaped
}

fn unescape_channel_id(escaped: &str) -> Option<String> {
    if escaped == EMPTY_CHANNEL_STEM {
        return Some(String::new());
    }
    let mut bytes = Vec::with_capacity(escaped.len());
    let mut iter = escaped.bytes();
    while let Some(byte) = iter.next() {
        if byte == b'%' {
            let hi = iter.next()?;
            let lo = iter.next()?;
            let pair = [hi, lo];
            let text = std::str::from_utf8(&pair).ok()?;
            bytes.push(u8::from_str_radix(text, 16).ok()?);
        } else {
            bytes.push(byte);
        }
    }
    String::from_utf8(bytes).ok()
}

#[async_trait]
impl HistoryStorage for FileStorage {
    async fn save(&self, channel_id: &str, messages: &[ContentMessage]) -> Result<(), StorageError> {
        let path = self.channel_path(channel_id);
        let key = path.display().to_string();

        let json = codec::encode_records(messages).map_err(|e| StorageError::Write {
            key: key.clone(),
            source: e.into(),
        })?;

        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|source| StorageError::Write { key: key.clone(), source })?;

        // Write then rename so a crash never leaves a half-written file behind
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .await
            .map_err(|source| StorageError::Write { key: key.clone(), source })?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|source| StorageError::Write { key, source })?;

        tracing::debug!(
            "[FileStorage] Saved {} messages for channel '{}' to {:?}",
            messages.len(),
            channel_id,
            path
        );
        Ok(())
    }

    async fn load(&self, channel_id: &str) -> Result<Vec<ContentMessage>, StorageError> {
        let path = self.channel_path(channel_id);
        let key = path.display().to_string();

        let json = match fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("[FileStorage] Channel '{}' has no history file", channel_id);
                return Ok(Vec::new());
            }
            Err(source) => return Err(StorageError::Read { key, source }),
        };

        // A corrupt file is reported but left in place; the next save overwrites it
        let messages = codec::decode_records(&json).map_err(|e| StorageError::Corrupt {
            key,
            reason: e.to_string(),
        })?;

        tracing::debug!(
            "[FileStorage] Loaded {} messages for channel '{}' from {:?}",
            messages.len(),
            channel_id,
            path
        );
        Ok(messages)
    }

    async fn remove(&self, channel_id: &str) -> Result<(), StorageError> {
        let path = self.channel_path(channel_id);

        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("[FileStorage] Removed channel '{}' at {:?}", channel_id, path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("[FileStorage] Channel '{}' does not exist, nothing to remove", channel_id);
                Ok(())
            }
            Err(source) => Err(StorageError::Write {
                key: path.display().to_string(),
                source,
            }),
        }
    }
}
