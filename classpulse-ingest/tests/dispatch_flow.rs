//! End-to-end ingestion: producers publish envelopes, the consumer feeds
//! batches to the dispatcher, and partial failures stay contained to their
//! kind-group.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use classpulse_core::{
    BehaviorStore, BehaviorType, CommunicationEvent, CommunicationMessage, CommunicationSession,
    EventEnvelope, EventKind, InMemoryBehaviorStore, InMemoryTtlStore, OpenSession, Page,
    SessionType, SessionUpdate, StoreError, StudentBehavior, TeacherBehavior, UserType,
};
use classpulse_ingest::consumer::drain;
use classpulse_ingest::{BatchDispatcher, ConsumerConfig, ConsumerManager, DispatcherConfig};
use classpulse_queue::{EventLog, InMemoryEventLog, QueueConfig, QueueMessage, TopicRegistry};
use serde_json::json;

type StoreResult<T> = std::result::Result<T, StoreError>;

/// Delegates to an in-memory store, except where told to fail or stall.
struct FlakyStore {
    inner: InMemoryBehaviorStore,
    fail_teacher_saves: bool,
    stall_student_saves: Option<Duration>,
}

impl FlakyStore {
    fn failing_teacher_saves() -> Self {
        Self {
            inner: InMemoryBehaviorStore::new(),
            fail_teacher_saves: true,
            stall_student_saves: None,
        }
    }

    fn stalling_student_saves(delay: Duration) -> Self {
        Self {
            inner: InMemoryBehaviorStore::new(),
            fail_teacher_saves: false,
            stall_student_saves: Some(delay),
        }
    }
}

#[async_trait]
impl BehaviorStore for FlakyStore {
    async fn save_teacher_behaviors(&self, records: Vec<TeacherBehavior>) -> StoreResult<()> {
        if self.fail_teacher_saves {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.save_teacher_behaviors(records).await
    }

    async fn save_student_behaviors(&self, records: Vec<StudentBehavior>) -> StoreResult<()> {
        if let Some(delay) = self.stall_student_saves {
            tokio::time::sleep(delay).await;
        }
        self.inner.save_student_behaviors(records).await
    }

    async fn save_communication(
        &self,
        sessions: Vec<CommunicationSession>,
        messages: Vec<CommunicationMessage>,
    ) -> StoreResult<()> {
        self.inner.save_communication(sessions, messages).await
    }

    async fn get_communication_session(
        &self,
        session_id: &str,
    ) -> StoreResult<Option<CommunicationSession>> {
        self.inner.get_communication_session(session_id).await
    }

    async fn get_communication_session_messages(
        &self,
        session_id: &str,
        page: Page,
    ) -> StoreResult<Vec<CommunicationMessage>> {
        self.inner
            .get_communication_session_messages(session_id, page)
            .await
    }

    async fn check_session_ids_exist(&self, session_ids: &[String]) -> StoreResult<HashSet<String>> {
        self.inner.check_session_ids_exist(session_ids).await
    }

    async fn check_message_ids_exist(&self, message_ids: &[String]) -> StoreResult<HashSet<String>> {
        self.inner.check_message_ids_exist(message_ids).await
    }

    async fn update_communication_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> StoreResult<bool> {
        self.inner
            .update_communication_session(session_id, update)
            .await
    }

    async fn get_class_latest_behaviors(&self, classroom_id: u64) -> StoreResult<Vec<StudentBehavior>> {
        self.inner.get_class_latest_behaviors(classroom_id).await
    }

    async fn get_class_all_behaviors(&self, classroom_id: u64) -> StoreResult<Vec<StudentBehavior>> {
        self.inner.get_class_all_behaviors(classroom_id).await
    }

    async fn get_students_behaviors(&self, student_ids: &[u64]) -> StoreResult<Vec<StudentBehavior>> {
        self.inner.get_students_behaviors(student_ids).await
    }
}

fn student(student_id: u64, created_at: i64) -> QueueMessage {
    let record = StudentBehavior {
        school_id: 1,
        class_id: 2,
        classroom_id: Some(3),
        student_id,
        behavior_type: BehaviorType::Answer,
        context: json!({"is_correct": true}),
        created_at,
        ..Default::default()
    };
    let envelope = EventEnvelope::student_behavior(&record).unwrap();
    QueueMessage::new("classroom-behavior", envelope.encode().unwrap())
}

fn teacher(teacher_id: u64) -> QueueMessage {
    let record = TeacherBehavior {
        school_id: 1,
        class_id: 2,
        classroom_id: Some(3),
        teacher_id,
        behavior_type: BehaviorType::Praise,
        context: json!({"student_id": 1, "type": "correct_streak"}),
        created_at: 50,
        ..Default::default()
    };
    let envelope = EventEnvelope::teacher_behavior(&record).unwrap();
    QueueMessage::new("classroom-behavior", envelope.encode().unwrap())
}

fn communication(event: &CommunicationEvent) -> QueueMessage {
    let envelope = EventEnvelope::communication(event).unwrap();
    QueueMessage::new("classroom-chat", envelope.encode().unwrap())
}

#[tokio::test]
async fn test_failed_kind_does_not_block_other_kinds() {
    let store = Arc::new(FlakyStore::failing_teacher_saves());
    let dispatcher = BatchDispatcher::new(store.clone(), Arc::new(InMemoryTtlStore::new()));

    let report = dispatcher
        .dispatch(vec![teacher(9), student(1, 10), student(2, 20)])
        .await;

    let teachers = report.group(EventKind::TeacherBehavior).unwrap();
    assert_eq!(teachers.persisted, 0);
    assert_eq!(teachers.errors.len(), 1);
    assert_eq!(report.group(EventKind::StudentBehavior).unwrap().persisted, 2);

    let summary = report.error_summary().unwrap();
    assert!(summary.starts_with("teacher_behavior"), "{summary}");
    assert!(summary.contains("connection refused"), "{summary}");
    assert_eq!(store.inner.student_behaviors().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_call_times_out() {
    let store = Arc::new(FlakyStore::stalling_student_saves(Duration::from_secs(30)));
    let dispatcher = BatchDispatcher::with_config(
        store.clone(),
        Arc::new(InMemoryTtlStore::new()),
        DispatcherConfig::default().with_store_timeout(Duration::from_secs(2)),
    );

    let report = dispatcher.dispatch(vec![student(1, 10), teacher(9)]).await;

    let students = report.group(EventKind::StudentBehavior).unwrap();
    assert_eq!(students.persisted, 0);
    assert!(students.errors[0].contains("timed out"), "{:?}", students.errors);
    assert_eq!(report.group(EventKind::TeacherBehavior).unwrap().persisted, 1);
}

#[tokio::test]
async fn test_consumer_commits_after_partial_failure() {
    let log = Arc::new(InMemoryEventLog::<QueueMessage>::new());
    log.append(teacher(9)).await.unwrap();
    log.append(student(1, 10)).await.unwrap();

    let store = Arc::new(FlakyStore::failing_teacher_saves());
    let dispatcher = Arc::new(BatchDispatcher::new(store.clone(), Arc::new(InMemoryTtlStore::new())));
    let config = ConsumerConfig::replay("ingest").with_poll_timeout(Duration::from_millis(20));

    let reports = drain(log.as_ref(), &config, &dispatcher.handler()).await.unwrap();

    assert_eq!(reports.len(), 1);
    assert!(reports[0].error_summary().is_some());
    assert_eq!(log.committed_offset("ingest").await, Some(1));
    assert_eq!(store.inner.student_behaviors().await.len(), 1);
}

#[tokio::test]
async fn test_topics_feed_one_dispatcher() {
    let queue = QueueConfig::default()
        .with_topics(["classroom-behavior", "classroom-chat"])
        .with_batch_timeout(Duration::from_millis(10));
    let registry = TopicRegistry::new(queue.topics.clone());

    let store = Arc::new(InMemoryBehaviorStore::new());
    let dispatcher = Arc::new(BatchDispatcher::new(store.clone(), Arc::new(InMemoryTtlStore::new())));
    let mut manager = ConsumerManager::new();
    manager
        .spawn_topics(&registry, &queue, dispatcher.handler())
        .await
        .unwrap();

    let open = CommunicationEvent::OpenSession(OpenSession {
        session_id: Some("chat-1".to_string()),
        user_id: 1,
        user_type: UserType::Student,
        school_id: 1,
        course_id: None,
        classroom_id: Some(3),
        session_type: SessionType::Question,
        target_id: None,
    });
    let ask = CommunicationEvent::Message(CommunicationMessage {
        message_id: "m-1".to_string(),
        session_id: "chat-1".to_string(),
        user_id: 1,
        user_type: UserType::Student,
        content: "what is a prime number?".to_string(),
        message_type: "text".to_string(),
        answer_to: None,
        created_at: Utc::now(),
    });
    registry.publish(student(1, 10)).await.unwrap();
    registry.publish(communication(&open)).await.unwrap();
    registry.publish(communication(&ask)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(store.student_behaviors().await.len(), 1);
    assert!(store.get_communication_session("chat-1").await.unwrap().is_some());
    assert_eq!(store.messages().await.len(), 1);

    manager.shutdown();
    manager.wait_for_shutdown().await;
}
