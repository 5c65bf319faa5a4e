//! Batch classification and concurrent per-kind dispatch.
//!
//! A batch is decoded into envelopes, grouped by kind (order within a kind is
//! kept) and each non-empty group runs in its own task. The dispatcher waits
//! for every group before returning. Failures are recorded per group and never
//! fail the batch: the queue offset advances on attempt, so reporting an error
//! upstream would only cause already-stored records to be redelivered.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use classpulse_core::validate::retain_valid;
use classpulse_core::{
    BehaviorStore, CommunicationEvent, CommunicationMessage, EventEnvelope, EventKind,
    SessionError, SessionManager, StoreError, StudentBehavior, TeacherBehavior, TtlStore, Validate,
};
use classpulse_queue::QueueMessage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::report::{BatchReport, GroupReport};

/// Async batch handler handed to the consumer.
pub type BatchHandler = Arc<
    dyn Fn(Vec<QueueMessage>) -> Pin<Box<dyn Future<Output = BatchReport> + Send>> + Send + Sync,
>;

/// Errors from one store or session call inside a worker.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl DispatchError {
    /// Errors that concern a single item rather than the store.
    fn is_rejection(&self) -> bool {
        matches!(
            self,
            DispatchError::Session(
                SessionError::NotFound(_)
                    | SessionError::Closed(_)
                    | SessionError::ForbiddenOpener(_)
                    | SessionError::Invalid(_)
            )
        )
    }
}

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Deadline applied to every store call.
    #[serde(default = "default_store_timeout", with = "humantime_serde")]
    pub store_timeout: Duration,
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            store_timeout: default_store_timeout(),
        }
    }
}

impl DispatcherConfig {
    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }
}

/// Behavior records persisted with one store call per group.
#[async_trait]
trait BehaviorBatch: DeserializeOwned + Validate + Send + Sized + 'static {
    const OPERATION: &'static str;

    async fn save(store: &dyn BehaviorStore, records: Vec<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl BehaviorBatch for TeacherBehavior {
    const OPERATION: &'static str = "save_teacher_behaviors";

    async fn save(store: &dyn BehaviorStore, records: Vec<Self>) -> Result<(), StoreError> {
        store.save_teacher_behaviors(records).await
    }
}

#[async_trait]
impl BehaviorBatch for StudentBehavior {
    const OPERATION: &'static str = "save_student_behaviors";

    async fn save(store: &dyn BehaviorStore, records: Vec<Self>) -> Result<(), StoreError> {
        store.save_student_behaviors(records).await
    }
}

/// Everything a kind-group task needs. Cheap to clone into each task.
#[derive(Clone)]
struct Worker {
    store: Arc<dyn BehaviorStore>,
    sessions: Arc<SessionManager>,
    store_timeout: Duration,
}

impl Worker {
    async fn timed<T, E>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, DispatchError>
    where
        DispatchError: From<E>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result.map_err(DispatchError::from),
            Err(_) => Err(DispatchError::Timeout {
                operation,
                after: self.store_timeout,
            }),
        }
    }

    async fn process(self, kind: EventKind, envelopes: Vec<EventEnvelope>) -> GroupReport {
        let mut report = GroupReport::new(kind, envelopes.len());
        match kind {
            EventKind::TeacherBehavior => {
                self.behaviors::<TeacherBehavior>(envelopes, &mut report).await
            }
            EventKind::StudentBehavior => {
                self.behaviors::<StudentBehavior>(envelopes, &mut report).await
            }
            EventKind::Communication => self.communication(envelopes, &mut report).await,
        }
        report
    }

    fn decode_all<T: DeserializeOwned>(
        envelopes: Vec<EventEnvelope>,
        report: &mut GroupReport,
    ) -> Vec<T> {
        envelopes
            .into_iter()
            .filter_map(|envelope| match envelope.decode_payload::<T>() {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(kind = %envelope.kind, error = %e, "dropping undecodable payload");
                    report.dropped += 1;
                    None
                }
            })
            .collect()
    }

    async fn behaviors<T: BehaviorBatch>(&self, envelopes: Vec<EventEnvelope>, report: &mut GroupReport) {
        let kind = report.kind;
        let records: Vec<T> = Self::decode_all(envelopes, report);
        let decoded = records.len();
        let valid = retain_valid(records, kind.as_str());
        report.dropped += decoded - valid.len();

        if valid.is_empty() {
            return;
        }

        let count = valid.len();
        match self.timed(T::OPERATION, T::save(self.store.as_ref(), valid)).await {
            Ok(()) => {
                debug!(%kind, count, "behaviors persisted");
                report.persisted += count;
            }
            Err(e) => {
                error!(%kind, count, error = %e, "failed to persist behaviors");
                report.fail(e);
            }
        }
    }

    async fn communication(&self, envelopes: Vec<EventEnvelope>, report: &mut GroupReport) {
        let events: Vec<CommunicationEvent> = Self::decode_all(envelopes, report);
        let mut pending: Vec<CommunicationMessage> = Vec::new();

        for event in events {
            match event {
                CommunicationEvent::OpenSession(open) => {
                    let result = self.timed("open_session", self.sessions.open(open)).await;
                    Self::settle(result.map(|_| ()), report);
                }
                CommunicationEvent::CloseSession { session_id } => {
                    self.flush(&mut pending, report).await;
                    let result = self
                        .timed("close_session", self.sessions.close(&session_id, Utc::now()))
                        .await;
                    Self::settle(result.map(|_| ()), report);
                }
                CommunicationEvent::Message(message) => {
                    if let Err(e) = message.validate() {
                        warn!(message_id = %message.message_id, error = %e, "dropping invalid message");
                        report.dropped += 1;
                        continue;
                    }
                    let admitted = self
                        .timed("admit_message", self.sessions.admit(&message, Utc::now()))
                        .await;
                    match admitted {
                        Ok(()) => pending.push(message),
                        Err(e) if e.is_rejection() => {
                            warn!(message_id = %message.message_id, error = %e, "message not admitted");
                            report.dropped += 1;
                        }
                        Err(e) => {
                            error!(message_id = %message.message_id, error = %e, "message admission failed");
                            report.dropped += 1;
                            report.fail(e);
                        }
                    }
                }
            }
        }

        self.flush(&mut pending, report).await;
    }

    fn settle(result: Result<(), DispatchError>, report: &mut GroupReport) {
        match result {
            Ok(()) => report.persisted += 1,
            Err(e) if e.is_rejection() => {
                warn!(error = %e, "session event rejected");
                report.dropped += 1;
            }
            Err(e) => {
                error!(error = %e, "session event failed");
                report.dropped += 1;
                report.fail(e);
            }
        }
    }

    /// Store pending messages that are not already stored, in one call.
    async fn flush(&self, pending: &mut Vec<CommunicationMessage>, report: &mut GroupReport) {
        if pending.is_empty() {
            return;
        }
        let batch = std::mem::take(pending);
        let ids: Vec<String> = batch.iter().map(|m| m.message_id.clone()).collect();

        let existing = match self
            .timed("check_message_ids_exist", self.store.check_message_ids_exist(&ids))
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                error!(count = batch.len(), error = %e, "failed to check message ids");
                report.dropped += batch.len();
                report.fail(e);
                return;
            }
        };

        let mut seen = HashSet::new();
        let fresh: Vec<CommunicationMessage> = batch
            .into_iter()
            .filter(|m| !existing.contains(&m.message_id) && seen.insert(m.message_id.clone()))
            .collect();
        let duplicates = ids.len() - fresh.len();
        if duplicates > 0 {
            debug!(duplicates, "skipping already stored messages");
            report.dropped += duplicates;
        }
        if fresh.is_empty() {
            return;
        }

        let count = fresh.len();
        match self
            .timed("save_communication", self.store.save_communication(Vec::new(), fresh))
            .await
        {
            Ok(()) => report.persisted += count,
            Err(e) => {
                error!(count, error = %e, "failed to persist messages");
                report.dropped += count;
                report.fail(e);
            }
        }
    }
}

/// Decodes, groups and concurrently persists queue batches.
pub struct BatchDispatcher {
    worker: Worker,
}

impl BatchDispatcher {
    pub fn new(store: Arc<dyn BehaviorStore>, ttl: Arc<dyn TtlStore>) -> Self {
        Self::with_config(store, ttl, DispatcherConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn BehaviorStore>,
        ttl: Arc<dyn TtlStore>,
        config: DispatcherConfig,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(store.clone(), ttl));
        Self::with_sessions(store, sessions, config)
    }

    pub fn with_sessions(
        store: Arc<dyn BehaviorStore>,
        sessions: Arc<SessionManager>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            worker: Worker {
                store,
                sessions,
                store_timeout: config.store_timeout,
            },
        }
    }

    /// Decode each message and group envelopes by kind, keeping arrival order.
    ///
    /// Returns the groups and the number of messages that failed to decode.
    pub fn classify(messages: &[QueueMessage]) -> (BTreeMap<EventKind, Vec<EventEnvelope>>, usize) {
        let mut groups: BTreeMap<EventKind, Vec<EventEnvelope>> = BTreeMap::new();
        let mut undecodable = 0;

        for (index, message) in messages.iter().enumerate() {
            match EventEnvelope::decode(&message.payload) {
                Ok(envelope) => groups.entry(envelope.kind).or_default().push(envelope),
                Err(e) => {
                    warn!(topic = %message.topic, index, error = %e, "dropping undecodable message");
                    undecodable += 1;
                }
            }
        }
        (groups, undecodable)
    }

    /// Process one batch. Always completes; problems are in the report.
    pub async fn dispatch(&self, messages: Vec<QueueMessage>) -> BatchReport {
        let (groups, undecodable) = Self::classify(&messages);
        let mut report = BatchReport {
            received: messages.len(),
            undecodable,
            groups: Vec::with_capacity(groups.len()),
        };

        let mut pending: BTreeSet<EventKind> = groups.keys().copied().collect();
        let mut tasks = JoinSet::new();
        for (kind, envelopes) in groups {
            let worker = self.worker.clone();
            tasks.spawn(worker.process(kind, envelopes));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(group) => {
                    pending.remove(&group.kind);
                    report.groups.push(group);
                }
                Err(e) => error!(error = %e, "dispatch worker panicked"),
            }
        }
        for kind in pending {
            let mut group = GroupReport::new(kind, 0);
            group.fail("worker panicked");
            report.groups.push(group);
        }
        report.groups.sort_by_key(|g| g.kind);

        match report.error_summary() {
            Some(summary) => warn!(persisted = report.persisted(), errors = %summary, "batch processed with errors"),
            None => info!(received = report.received, persisted = report.persisted(), "batch processed"),
        }
        report
    }

    /// Wrap the dispatcher as a consumer batch handler.
    pub fn handler(self: Arc<Self>) -> BatchHandler {
        let handler: BatchHandler = Arc::new(move |messages| {
            let dispatcher = Arc::clone(&self);
            Box::pin(async move { dispatcher.dispatch(messages).await })
        });
        handler
    }
}
