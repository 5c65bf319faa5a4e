//! Per-topic registry of in-memory logs.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::memory::InMemoryEventLog;
use crate::message::QueueMessage;
use crate::traits::{EventLog, Offset};

/// Holds one [`InMemoryEventLog`] per topic.
#[derive(Clone, Default)]
pub struct TopicRegistry {
    topics: BTreeMap<String, Arc<InMemoryEventLog<QueueMessage>>>,
}

impl TopicRegistry {
    /// Create a registry with a log for each topic.
    pub fn new<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics = topics
            .into_iter()
            .map(|t| (t.into(), Arc::new(InMemoryEventLog::new())))
            .collect();
        Self { topics }
    }

    /// Get the log for a topic.
    pub fn log(&self, topic: &str) -> Result<Arc<InMemoryEventLog<QueueMessage>>> {
        self.topics
            .get(topic)
            .cloned()
            .ok_or_else(|| Error::UnknownTopic(topic.to_string()))
    }

    /// Publish a message to the log named by its topic.
    pub async fn publish(&self, message: QueueMessage) -> Result<Offset> {
        let log = self.log(&message.topic)?;
        log.append(message).await
    }

    /// Registered topic names in sorted order.
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.topics.keys().map(String::as_str)
    }
}
