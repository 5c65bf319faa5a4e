//! Message queue abstraction for classpulse.
//!
//! Producers append raw [`QueueMessage`]s to per-topic logs; the ingestion
//! service reads them back in batches under a consumer group, tracking its
//! own committed offset.
//!
//! # Key Types
//!
//! - [`EventLog`] - Trait for appending messages and creating consumers
//! - [`EventConsumer`] - Trait for polling messages with offset tracking
//! - [`InMemoryEventLog`] - In-process implementation used by tests and replay
//! - [`TopicRegistry`] - One log per configured topic
//! - [`QueueConfig`] - Topics, consumer group, batch size and timeouts

pub mod config;
pub mod error;
pub mod memory;
pub mod message;
pub mod topics;
pub mod traits;

// Re-exports
pub use config::QueueConfig;
pub use error::{Error, Result};
pub use memory::InMemoryEventLog;
pub use message::QueueMessage;
pub use topics::TopicRegistry;
pub use traits::{EventBatch, EventConsumer, EventLog, Offset, SeekPosition};
