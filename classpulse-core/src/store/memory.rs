//! In-memory BehaviorStore implementation.
//!
//! Keeps every row in process. Used by tests and by the replay command when
//! no database path is configured.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BehaviorStore, Page, Result, SessionUpdate};
use crate::behavior::{StudentBehavior, TeacherBehavior};
use crate::communication::{CommunicationMessage, CommunicationSession};

#[derive(Default)]
struct Inner {
    teacher_behaviors: Vec<TeacherBehavior>,
    student_behaviors: Vec<StudentBehavior>,
    sessions: HashMap<String, CommunicationSession>,
    messages: Vec<CommunicationMessage>,
}

/// In-memory implementation of BehaviorStore.
#[derive(Default)]
pub struct InMemoryBehaviorStore {
    inner: RwLock<Inner>,
}

impl InMemoryBehaviorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All teacher rows in insertion order.
    pub async fn teacher_behaviors(&self) -> Vec<TeacherBehavior> {
        self.inner.read().await.teacher_behaviors.clone()
    }

    /// All student rows in insertion order.
    pub async fn student_behaviors(&self) -> Vec<StudentBehavior> {
        self.inner.read().await.student_behaviors.clone()
    }

    /// All messages in insertion order.
    pub async fn messages(&self) -> Vec<CommunicationMessage> {
        self.inner.read().await.messages.clone()
    }
}

fn oldest_first(mut rows: Vec<StudentBehavior>) -> Vec<StudentBehavior> {
    rows.sort_by_key(|r| r.created_at);
    rows
}

#[async_trait]
impl BehaviorStore for InMemoryBehaviorStore {
    async fn save_teacher_behaviors(&self, records: Vec<TeacherBehavior>) -> Result<()> {
        self.inner.write().await.teacher_behaviors.extend(records);
        Ok(())
    }

    async fn save_student_behaviors(&self, records: Vec<StudentBehavior>) -> Result<()> {
        self.inner.write().await.student_behaviors.extend(records);
        Ok(())
    }

    async fn save_communication(
        &self,
        sessions: Vec<CommunicationSession>,
        messages: Vec<CommunicationMessage>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        for session in sessions {
            inner.sessions.insert(session.session_id.clone(), session);
        }
        inner.messages.extend(messages);
        Ok(())
    }

    async fn get_communication_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CommunicationSession>> {
        Ok(self.inner.read().await.sessions.get(session_id).cloned())
    }

    async fn get_communication_session_messages(
        &self,
        session_id: &str,
        page: Page,
    ) -> Result<Vec<CommunicationMessage>> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .skip(page.offset())
            .take(page.size as usize)
            .cloned()
            .collect())
    }

    async fn check_session_ids_exist(&self, session_ids: &[String]) -> Result<HashSet<String>> {
        let inner = self.inner.read().await;
        Ok(session_ids
            .iter()
            .filter(|id| inner.sessions.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn check_message_ids_exist(&self, message_ids: &[String]) -> Result<HashSet<String>> {
        let inner = self.inner.read().await;
        let wanted: HashSet<&str> = message_ids.iter().map(String::as_str).collect();
        Ok(inner
            .messages
            .iter()
            .filter(|m| wanted.contains(m.message_id.as_str()))
            .map(|m| m.message_id.clone())
            .collect())
    }

    async fn update_communication_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(session_id) {
            Some(session) => {
                update.apply(session);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_class_latest_behaviors(&self, classroom_id: u64) -> Result<Vec<StudentBehavior>> {
        let all = self.get_class_all_behaviors(classroom_id).await?;
        let mut latest: BTreeMap<u64, StudentBehavior> = BTreeMap::new();
        for row in all {
            latest.insert(row.student_id, row);
        }
        Ok(latest.into_values().collect())
    }

    async fn get_class_all_behaviors(&self, classroom_id: u64) -> Result<Vec<StudentBehavior>> {
        let inner = self.inner.read().await;
        Ok(oldest_first(
            inner
                .student_behaviors
                .iter()
                .filter(|r| r.classroom_id == Some(classroom_id))
                .cloned()
                .collect(),
        ))
    }

    async fn get_students_behaviors(&self, student_ids: &[u64]) -> Result<Vec<StudentBehavior>> {
        let inner = self.inner.read().await;
        Ok(oldest_first(
            inner
                .student_behaviors
                .iter()
                .filter(|r| student_ids.contains(&r.student_id))
                .cloned()
                .collect(),
        ))
    }
}
