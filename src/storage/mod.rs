//! Persistence and alarm abstraction.
//!
//! A room owns a private key-value namespace plus a single pending alarm.
//! Writes are individually atomic; the room core never relies on multi-key
//! transactions. The in-memory implementation lives in [`memory`].

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use memory::{AlarmFired, MemoryStore};

/// Keys used inside a room's namespace.
pub mod keys {
    pub const ROOM: &str = "room";
    pub const GAME_STATE: &str = "game_state";
    pub const CHAT_MESSAGES: &str = "chat:messages";
    pub const CHAT_RATE_LIMITS: &str = "chat:rateLimits";
    pub const ALARM_DATA: &str = "alarm_data";
    pub const AI_TURN_DATA: &str = "ai_turn_data";
    pub const JOIN_REQUESTS: &str = "join_requests";
}

/// Ceiling on the serialized per-connection attachment.
pub const MAX_ATTACHMENT_BYTES: usize = 2048;

/// Abstract per-room storage: key-value namespace plus one pending alarm.
///
/// Scheduling a new alarm supersedes the previous one; at most one time is
/// ever pending.
#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;

    async fn set_alarm(&self, at: DateTime<Utc>) -> Result<()>;
    async fn get_alarm(&self) -> Result<Option<DateTime<Utc>>>;
    async fn delete_alarm(&self) -> Result<()>;
}

/// Typed helpers over the raw value interface.
#[async_trait]
pub trait RoomStoreExt: RoomStore {
    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn save<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        self.put(key, serde_json::to_value(value)?).await
    }
}

#[async_trait]
impl<S: RoomStore + ?Sized> RoomStoreExt for S {}

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("attachment of {size} bytes exceeds the {MAX_ATTACHMENT_BYTES} byte limit")]
    TooLarge { size: usize },
    #[error("attachment could not be encoded or decoded: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Serialize a connection attachment, enforcing the size bound.
pub fn encode_attachment<T: Serialize>(value: &T) -> Result<Vec<u8>, AttachmentError> {
    let bytes = serde_json::to_vec(value)?;
    if bytes.len() > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge { size: bytes.len() });
    }
    Ok(bytes)
}

/// Decode a previously attached blob.
pub fn decode_attachment<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, AttachmentError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Blob {
        name: String,
    }

    #[test]
    fn test_attachment_round_trip() {
        let blob = Blob {
            name: "ana".to_string(),
        };
        let bytes = encode_attachment(&blob).unwrap();
        assert!(bytes.len() <= MAX_ATTACHMENT_BYTES);
        let back: Blob = decode_attachment(&bytes).unwrap();
        assert_eq!(back, blob);
    }

    #[test]
    fn test_attachment_size_bound() {
        let blob = Blob {
            name: "x".repeat(MAX_ATTACHMENT_BYTES),
        };
        assert!(matches!(
            encode_attachment(&blob),
            Err(AttachmentError::TooLarge { .. })
        ));
    }
}
