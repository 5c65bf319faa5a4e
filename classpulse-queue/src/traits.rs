//! Core traits for queue operations.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Offset into a topic log.
pub type Offset = u64;

/// Position to seek to when starting a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPosition {
    /// Start from the beginning.
    Beginning,
    /// Start from the end (new messages only).
    End,
    /// Start from a specific offset.
    Offset(Offset),
}

/// A batch of messages returned from polling, in log order.
#[derive(Debug, Clone)]
pub struct EventBatch<E> {
    events: Vec<(Offset, E)>,
}

impl<E> EventBatch<E> {
    /// Create a batch from offset/message pairs.
    #[must_use]
    pub fn new(events: Vec<(Offset, E)>) -> Self {
        Self { events }
    }

    /// An empty batch.
    #[must_use]
    pub fn empty() -> Self {
        Self { events: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Offset of the first message, if any.
    pub fn first_offset(&self) -> Option<Offset> {
        self.events.first().map(|(o, _)| *o)
    }

    /// Offset of the last message, if any.
    pub fn last_offset(&self) -> Option<Offset> {
        self.events.last().map(|(o, _)| *o)
    }
}

impl<E> IntoIterator for EventBatch<E> {
    type Item = (Offset, E);
    type IntoIter = std::vec::IntoIter<(Offset, E)>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// Trait for appending messages and creating consumers.
#[async_trait]
pub trait EventLog<E>: Send + Sync {
    /// Append a message, returning its offset.
    async fn append(&self, event: E) -> Result<Offset>;

    /// Append several messages, returning the offset of the last one.
    async fn append_batch(&self, events: Vec<E>) -> Result<Offset>;

    /// Create a consumer for the given consumer group.
    ///
    /// The consumer resumes after the group's last committed offset.
    async fn consumer(&self, group: &str) -> Result<Box<dyn EventConsumer<E>>>;

    /// Offset that the next appended message will receive.
    fn high_water_mark(&self) -> Offset;
}

/// Trait for polling messages with offset tracking.
#[async_trait]
pub trait EventConsumer<E>: Send + Sync {
    /// Poll for up to `max_count` messages, waiting at most `timeout` for the first.
    async fn poll(&mut self, max_count: usize, timeout: Duration) -> Result<EventBatch<E>>;

    /// Commit the offset of the last processed message.
    async fn commit(&mut self, offset: Offset) -> Result<()>;

    /// Move the read position.
    async fn seek(&mut self, position: SeekPosition) -> Result<()>;

    /// The last committed offset.
    fn committed_offset(&self) -> Option<Offset>;

    /// The consumer group name.
    fn group(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_offsets() {
        let batch = EventBatch::new(vec![(4, "a"), (5, "b"), (6, "c")]);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.first_offset(), Some(4));
        assert_eq!(batch.last_offset(), Some(6));
    }

    #[test]
    fn empty_batch_has_no_offsets() {
        let batch: EventBatch<String> = EventBatch::empty();
        assert!(batch.is_empty());
        assert_eq!(batch.first_offset(), None);
        assert_eq!(batch.last_offset(), None);
    }
}
