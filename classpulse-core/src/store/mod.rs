//! Storage traits and implementations.
//!
//! Two collaborators back the core:
//! - [`BehaviorStore`] - durable, append-only behavior log plus communication
//!   sessions/messages. Authoritative.
//! - [`TtlStore`] - atomic key-value store with expiry, holding dedup and
//!   rate-limit markers. Derived state only; every key expires.

mod error;
mod memory;
mod ttl;
mod turso;

pub use error::{Result, StoreError};
pub use memory::InMemoryBehaviorStore;
pub use ttl::InMemoryTtlStore;
pub use turso::TursoBehaviorStore;

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::behavior::{StudentBehavior, TeacherBehavior};
use crate::communication::{CommunicationMessage, CommunicationSession, Participants};

/// One page of a paginated query. Pages are numbered from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Page {
    pub fn first(size: u32) -> Self {
        Self {
            number: 1,
            size: size.max(1),
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        Self {
            number: self.number + 1,
            ..self
        }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> usize {
        (self.number.saturating_sub(1) as usize) * self.size as usize
    }
}

/// Fields to change on a communication session. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub closed: Option<bool>,
    pub end_time: Option<DateTime<Utc>>,
    pub participants: Option<Participants>,
}

impl SessionUpdate {
    /// The update applied when a session closes.
    pub fn close(end_time: DateTime<Utc>, participants: Participants) -> Self {
        Self {
            closed: Some(true),
            end_time: Some(end_time),
            participants: Some(participants),
        }
    }

    pub(crate) fn apply(&self, session: &mut CommunicationSession) {
        if let Some(closed) = self.closed {
            session.closed = closed;
        }
        if let Some(end_time) = self.end_time {
            session.end_time = Some(end_time);
        }
        if let Some(participants) = &self.participants {
            session.participants = participants.clone();
        }
    }
}

/// Durable behavior log and communication store.
#[async_trait]
pub trait BehaviorStore: Send + Sync {
    /// Append teacher behavior rows.
    async fn save_teacher_behaviors(&self, records: Vec<TeacherBehavior>) -> Result<()>;

    /// Append student behavior rows.
    async fn save_student_behaviors(&self, records: Vec<StudentBehavior>) -> Result<()>;

    /// Persist new sessions and messages.
    async fn save_communication(
        &self,
        sessions: Vec<CommunicationSession>,
        messages: Vec<CommunicationMessage>,
    ) -> Result<()>;

    /// Get a session by id.
    async fn get_communication_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CommunicationSession>>;

    /// Messages of a session in posting order, one page at a time.
    async fn get_communication_session_messages(
        &self,
        session_id: &str,
        page: Page,
    ) -> Result<Vec<CommunicationMessage>>;

    /// The subset of `session_ids` that exist.
    async fn check_session_ids_exist(&self, session_ids: &[String]) -> Result<HashSet<String>>;

    /// The subset of `message_ids` that exist.
    async fn check_message_ids_exist(&self, message_ids: &[String]) -> Result<HashSet<String>>;

    /// Apply `update` to a session. Returns false when no session matched.
    async fn update_communication_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<bool>;

    /// The most recent behavior of each student in a classroom.
    async fn get_class_latest_behaviors(&self, classroom_id: u64) -> Result<Vec<StudentBehavior>>;

    /// Every student behavior in a classroom, oldest first.
    async fn get_class_all_behaviors(&self, classroom_id: u64) -> Result<Vec<StudentBehavior>>;

    /// Every behavior of the given students, oldest first.
    async fn get_students_behaviors(&self, student_ids: &[u64]) -> Result<Vec<StudentBehavior>>;
}

/// Atomic key-value store with per-key expiry.
///
/// Each write carries a TTL; `incr` and `hset` refresh the TTL of the whole key.
#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Set only when the key is absent. Returns true when the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Increment an integer counter, creating it at 0 first.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<i64>;

    async fn hset(&self, key: &str, field: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hget_all(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn key_exists(&self, key: &str) -> Result<bool>;

    /// Remove a key. Returns true when a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool>;
}
