//! Raw queue message.

use serde::{Deserialize, Serialize};

/// A raw message as delivered by the queue, before envelope decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// Optional partitioning key set by the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
}

impl QueueMessage {
    /// Create a message without a key.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
        }
    }

    /// Set the partitioning key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Serialize a value as the JSON payload of a new message.
    pub fn json<T: Serialize>(topic: impl Into<String>, value: &T) -> crate::Result<Self> {
        Ok(Self::new(topic, serde_json::to_vec(value)?))
    }
}
