//! In-memory EventLog implementation.
//!
//! Messages are kept in process without persistence. Consumers share the
//! backing storage, so a live consumer sees messages appended after it was
//! created, and committed offsets are remembered per consumer group.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tracing::trace;

use crate::error::{Error, Result};
use crate::traits::{EventBatch, EventConsumer, EventLog, Offset, SeekPosition};

struct Shared<E> {
    events: RwLock<Vec<E>>,
    committed: RwLock<HashMap<String, Offset>>,
    appended: Notify,
    next_offset: AtomicU64,
}

/// In-memory implementation of EventLog.
pub struct InMemoryEventLog<E> {
    shared: Arc<Shared<E>>,
}

impl<E> InMemoryEventLog<E>
where
    E: Clone + Send + Sync + 'static,
{
    /// Create a new in-memory event log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                events: RwLock::new(Vec::new()),
                committed: RwLock::new(HashMap::new()),
                appended: Notify::new(),
                next_offset: AtomicU64::new(0),
            }),
        }
    }

    /// Get the number of messages in the log.
    pub async fn len(&self) -> usize {
        self.shared.events.read().await.len()
    }

    /// Check if the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.shared.events.read().await.is_empty()
    }

    /// Last committed offset for a consumer group.
    pub async fn committed_offset(&self, group: &str) -> Option<Offset> {
        self.shared.committed.read().await.get(group).copied()
    }
}

impl<E> Default for InMemoryEventLog<E>
where
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<E> EventLog<E> for InMemoryEventLog<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn append(&self, event: E) -> Result<Offset> {
        let offset = {
            let mut events = self.shared.events.write().await;
            events.push(event);
            self.shared
                .next_offset
                .store(events.len() as Offset, Ordering::SeqCst);
            (events.len() - 1) as Offset
        };
        self.shared.appended.notify_waiters();
        Ok(offset)
    }

    async fn append_batch(&self, batch: Vec<E>) -> Result<Offset> {
        let last = {
            let mut events = self.shared.events.write().await;
            events.extend(batch);
            self.shared
                .next_offset
                .store(events.len() as Offset, Ordering::SeqCst);
            (events.len() as Offset).saturating_sub(1)
        };
        self.shared.appended.notify_waiters();
        Ok(last)
    }

    async fn consumer(&self, group: &str) -> Result<Box<dyn EventConsumer<E>>> {
        let committed = self.shared.committed.read().await.get(group).copied();

        Ok(Box::new(InMemoryConsumer {
            group: group.to_string(),
            shared: Arc::clone(&self.shared),
            position: committed.map_or(0, |o| o + 1),
            committed,
        }))
    }

    fn high_water_mark(&self) -> Offset {
        self.shared.next_offset.load(Ordering::SeqCst)
    }
}

/// In-memory consumer implementation.
struct InMemoryConsumer<E> {
    group: String,
    shared: Arc<Shared<E>>,
    position: Offset,
    committed: Option<Offset>,
}

impl<E: Clone> InMemoryConsumer<E> {
    async fn read_batch(&mut self, max_count: usize) -> EventBatch<E> {
        let events = self.shared.events.read().await;
        let start = self.position as usize;
        if start >= events.len() {
            return EventBatch::empty();
        }

        let end = std::cmp::min(start + max_count, events.len());
        let batch: Vec<(Offset, E)> = events[start..end]
            .iter()
            .enumerate()
            .map(|(i, e)| ((start + i) as Offset, e.clone()))
            .collect();

        self.position = end as Offset;
        EventBatch::new(batch)
    }
}

#[async_trait]
impl<E> EventConsumer<E> for InMemoryConsumer<E>
where
    E: Clone + Send + Sync + 'static,
{
    async fn poll(&mut self, max_count: usize, timeout: Duration) -> Result<EventBatch<E>> {
        let shared = Arc::clone(&self.shared);
        let notified = shared.appended.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batch = self.read_batch(max_count).await;
        if !batch.is_empty() {
            return Ok(batch);
        }

        if tokio::time::timeout(timeout, notified).await.is_err() {
            trace!(group = %self.group, "poll timed out");
            return Ok(EventBatch::empty());
        }
        Ok(self.read_batch(max_count).await)
    }

    async fn commit(&mut self, offset: Offset) -> Result<()> {
        self.committed = Some(offset);
        self.shared
            .committed
            .write()
            .await
            .insert(self.group.clone(), offset);
        Ok(())
    }

    async fn seek(&mut self, position: SeekPosition) -> Result<()> {
        let len = self.shared.events.read().await.len() as Offset;
        self.position = match position {
            SeekPosition::Beginning => 0,
            SeekPosition::End => len,
            SeekPosition::Offset(o) if o > len => {
                return Err(Error::OffsetOutOfRange {
                    offset: o,
                    high_water_mark: len,
                });
            }
            SeekPosition::Offset(o) => o,
        };
        Ok(())
    }

    fn committed_offset(&self) -> Option<Offset> {
        self.committed
    }

    fn group(&self) -> &str {
        &self.group
    }
}
