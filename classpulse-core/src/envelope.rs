//! Event envelope carried on the ingestion queue.
//!
//! Producers publish `{type, content, timestamp, version}` JSON. The
//! `content` is kept as raw JSON bytes and decoded into a typed record only
//! when a worker needs it.

use std::fmt;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::behavior::{StudentBehavior, TeacherBehavior};
use crate::communication::CommunicationEvent;
use crate::error::EnvelopeError;

/// Current envelope schema version.
pub const SCHEMA_VERSION: &str = "1.0";

/// The kind of telemetry an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TeacherBehavior,
    StudentBehavior,
    Communication,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::TeacherBehavior,
        EventKind::StudentBehavior,
        EventKind::Communication,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TeacherBehavior => "teacher_behavior",
            EventKind::StudentBehavior => "student_behavior",
            EventKind::Communication => "communication",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct WireEnvelopeRef<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    content: &'a RawValue,
    timestamp: i64,
    version: &'a str,
}

#[derive(Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    content: Box<RawValue>,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    version: String,
}

/// An immutable, typed wrapper around one queue payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventEnvelope {
    pub kind: EventKind,
    /// Raw JSON bytes of the kind-specific content.
    pub payload: Vec<u8>,
    /// Producer timestamp (unix seconds).
    pub timestamp: i64,
    pub schema_version: String,
}

impl EventEnvelope {
    /// Build an envelope around a typed payload, stamped now.
    pub fn new<T: Serialize>(kind: EventKind, payload: &T) -> Result<Self, EnvelopeError> {
        Ok(Self {
            kind,
            payload: serde_json::to_vec(payload)?,
            timestamp: Utc::now().timestamp(),
            schema_version: SCHEMA_VERSION.to_string(),
        })
    }

    pub fn teacher_behavior(record: &TeacherBehavior) -> Result<Self, EnvelopeError> {
        Self::new(EventKind::TeacherBehavior, record)
    }

    pub fn student_behavior(record: &StudentBehavior) -> Result<Self, EnvelopeError> {
        Self::new(EventKind::StudentBehavior, record)
    }

    pub fn communication(event: &CommunicationEvent) -> Result<Self, EnvelopeError> {
        Self::new(EventKind::Communication, event)
    }

    /// Decode wire bytes into an envelope.
    ///
    /// Fails on malformed JSON and on unknown `type` values.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope = serde_json::from_slice(bytes)?;
        let kind =
            EventKind::parse(&wire.kind).ok_or_else(|| EnvelopeError::UnknownKind(wire.kind))?;

        Ok(Self {
            kind,
            payload: wire.content.get().as_bytes().to_vec(),
            timestamp: wire.timestamp,
            schema_version: wire.version,
        })
    }

    /// Encode to wire bytes. The payload is embedded verbatim.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let text = std::str::from_utf8(&self.payload).map_err(|_| EnvelopeError::InvalidPayload)?;
        let content: &RawValue = serde_json::from_str(text)?;

        Ok(serde_json::to_vec(&WireEnvelopeRef {
            kind: self.kind.as_str(),
            content,
            timestamp: self.timestamp,
            version: &self.schema_version,
        })?)
    }

    /// Decode the payload into a typed record.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}
