//! Consumer tasks that feed queue batches to a [`BatchHandler`].
//!
//! Each subscribed topic gets its own task. A task polls up to `batch_size`
//! messages, hands the whole batch to the handler, waits for the report and
//! then commits the last offset of the batch, whatever the report says.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────┐   ┌────────────────────┐
//! │ topic: behavior    │   │ topic: chat        │
//! │ [m0][m1]...[mN]    │   │ [m0][m1]...[mN]    │
//! └─────────┬──────────┘   └─────────┬──────────┘
//!           │ poll(batch_size)       │
//!           ▼                        ▼
//! ┌────────────────────┐   ┌────────────────────┐
//! │ consumer task      │   │ consumer task      │
//! │ (group: ingest)    │   │ (group: ingest)    │
//! └─────────┬──────────┘   └─────────┬──────────┘
//!           └───────────┬────────────┘
//!                       ▼
//!               BatchHandler → BatchReport
//! ```
//!
//! Shutdown is cooperative: a batch that is being handled runs to completion
//! and is committed before the task exits.

use std::sync::Arc;
use std::time::Duration;

use classpulse_queue::{EventLog, QueueConfig, QueueMessage, SeekPosition, TopicRegistry};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::dispatcher::BatchHandler;
use crate::report::BatchReport;

/// Result type for consumer operations.
pub type Result<T> = std::result::Result<T, ConsumerError>;

/// Errors that can occur in consumer operations.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Failed to create consumer: {0}")]
    Creation(String),

    #[error("Consumer poll failed: {0}")]
    Poll(String),

    #[error("Consumer seek failed: {0}")]
    Seek(String),

    #[error("Consumer commit failed: {0}")]
    Commit(String),
}

/// Configuration for a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    /// Consumer group name (determines offset tracking).
    pub group: String,
    /// Where to start reading from. `None` resumes after the group's last
    /// committed offset.
    pub start_position: Option<SeekPosition>,
    /// Maximum messages per batch.
    pub batch_size: usize,
    /// Maximum wait while filling a batch.
    pub poll_timeout: Duration,
}

impl ConsumerConfig {
    /// Create a live consumer that only receives new messages.
    pub fn live(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            start_position: Some(SeekPosition::End),
            batch_size: 100,
            poll_timeout: Duration::from_millis(50),
        }
    }

    /// Create a replay consumer that processes every message from the beginning.
    pub fn replay(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            start_position: Some(SeekPosition::Beginning),
            batch_size: 100,
            poll_timeout: Duration::from_secs(1),
        }
    }

    /// Consumer for the ingestion group described by a queue config.
    ///
    /// Resumes after the last committed offset.
    pub fn from_queue(config: &QueueConfig) -> Self {
        Self {
            group: config.group.clone(),
            start_position: None,
            batch_size: config.batch_size.max(1),
            poll_timeout: config.batch_timeout,
        }
    }

    /// Set the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the poll timeout.
    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the start position.
    #[must_use]
    pub fn with_start_position(mut self, position: SeekPosition) -> Self {
        self.start_position = Some(position);
        self
    }
}

fn log_report(topic: &str, group: &str, report: &BatchReport) {
    match report.error_summary() {
        Some(summary) => warn!(
            topic,
            group,
            received = report.received,
            persisted = report.persisted(),
            errors = %summary,
            "Batch handled with errors"
        ),
        None => debug!(
            topic,
            group,
            received = report.received,
            persisted = report.persisted(),
            "Batch handled"
        ),
    }
}

/// Read a log to its current end, handling one batch at a time.
///
/// Stops at the first empty poll. Every handled batch is committed.
pub async fn drain(
    log: &dyn EventLog<QueueMessage>,
    config: &ConsumerConfig,
    handler: &BatchHandler,
) -> Result<Vec<BatchReport>> {
    let mut consumer = log
        .consumer(&config.group)
        .await
        .map_err(|e| ConsumerError::Creation(e.to_string()))?;
    if let Some(position) = config.start_position {
        consumer
            .seek(position)
            .await
            .map_err(|e| ConsumerError::Seek(e.to_string()))?;
    }

    let mut reports = Vec::new();
    loop {
        let batch = consumer
            .poll(config.batch_size, config.poll_timeout)
            .await
            .map_err(|e| ConsumerError::Poll(e.to_string()))?;
        let Some(last_offset) = batch.last_offset() else {
            break;
        };

        let messages: Vec<QueueMessage> = batch.into_iter().map(|(_, m)| m).collect();
        let report = handler(messages).await;
        log_report("drain", &config.group, &report);
        reports.push(report);

        consumer
            .commit(last_offset)
            .await
            .map_err(|e| ConsumerError::Commit(e.to_string()))?;
    }
    Ok(reports)
}

/// Manages consumer tasks that feed batches to a handler.
pub struct ConsumerManager {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl Default for ConsumerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerManager {
    /// Create a new consumer manager.
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Spawn a consumer task for one topic log.
    ///
    /// The consumer runs until shutdown is called.
    pub async fn spawn_consumer(
        &mut self,
        topic: impl Into<String>,
        log: Arc<dyn EventLog<QueueMessage>>,
        config: ConsumerConfig,
        handler: BatchHandler,
    ) -> Result<()> {
        let topic = topic.into();
        let mut consumer = log
            .consumer(&config.group)
            .await
            .map_err(|e| ConsumerError::Creation(e.to_string()))?;

        if let Some(position) = config.start_position {
            consumer
                .seek(position)
                .await
                .map_err(|e| ConsumerError::Seek(e.to_string()))?;
        }

        let shutdown = self.shutdown.clone();
        let group = config.group.clone();

        let handle = tokio::spawn(async move {
            info!(topic = %topic, group = %group, "Consumer started");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!(topic = %topic, group = %group, "Consumer received shutdown signal");
                        break;
                    }
                    result = consumer.poll(config.batch_size, config.poll_timeout) => {
                        match result {
                            Ok(batch) => {
                                let Some(last_offset) = batch.last_offset() else {
                                    trace!(topic = %topic, group = %group, "Empty batch, continuing");
                                    continue;
                                };

                                let messages: Vec<QueueMessage> =
                                    batch.into_iter().map(|(_, m)| m).collect();
                                let report = handler(messages).await;
                                log_report(&topic, &group, &report);

                                // Offsets advance on attempt, not on success
                                if let Err(e) = consumer.commit(last_offset).await {
                                    error!(topic = %topic, group = %group, error = %e, "Failed to commit offset");
                                }
                            }
                            Err(e) => {
                                error!(topic = %topic, group = %group, error = %e, "Poll failed");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                }
            }

            info!(topic = %topic, group = %group, "Consumer stopped");
        });

        self.handles.push(handle);
        Ok(())
    }

    /// Spawn one consumer per topic configured in `queue`.
    pub async fn spawn_topics(
        &mut self,
        registry: &TopicRegistry,
        queue: &QueueConfig,
        handler: BatchHandler,
    ) -> Result<()> {
        for topic in &queue.topics {
            let log = registry
                .log(topic)
                .map_err(|e| ConsumerError::Creation(e.to_string()))?;
            self.spawn_consumer(
                topic.clone(),
                log,
                ConsumerConfig::from_queue(queue),
                Arc::clone(&handler),
            )
            .await?;
        }
        Ok(())
    }

    /// Signal all consumers to shut down gracefully.
    pub fn shutdown(&self) {
        info!("Signaling consumer shutdown");
        self.shutdown.cancel();
    }

    /// A token that is cancelled when [`shutdown`](Self::shutdown) is called.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for all consumer tasks to complete.
    pub async fn wait_for_shutdown(self) {
        info!(count = self.handles.len(), "Waiting for consumers to stop");
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Consumer task panicked");
            }
        }
        info!("All consumers stopped");
    }

    /// Get the number of active consumers.
    pub fn consumer_count(&self) -> usize {
        self.handles.len()
    }
}
