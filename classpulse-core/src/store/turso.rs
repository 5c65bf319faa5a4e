//! Turso/libSQL implementation of the behavior store.
//!
//! Connects to a local embedded SQLite file or an in-memory database. A
//! single connection is held for the lifetime of the store.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{BehaviorStore, Page, Result, SessionUpdate, StoreError};
use crate::behavior::{BehaviorRecord, BehaviorType, StudentBehavior, TeacherBehavior};
use crate::communication::{
    CommunicationMessage, CommunicationSession, Participants, SessionType, UserType,
};

const SCHEMA_TEACHER_BEHAVIORS: &str = r#"
CREATE TABLE IF NOT EXISTS teacher_behaviors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    school_id INTEGER NOT NULL,
    class_id INTEGER NOT NULL,
    classroom_id INTEGER,
    teacher_id INTEGER NOT NULL,
    behavior_type TEXT NOT NULL,
    communication_session_id TEXT,
    context TEXT NOT NULL,
    created_at INTEGER NOT NULL
)
"#;

const SCHEMA_STUDENT_BEHAVIORS: &str = r#"
CREATE TABLE IF NOT EXISTS student_behaviors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    school_id INTEGER NOT NULL,
    class_id INTEGER NOT NULL,
    classroom_id INTEGER,
    student_id INTEGER NOT NULL,
    behavior_type TEXT NOT NULL,
    communication_session_id TEXT,
    context TEXT NOT NULL,
    is_correct INTEGER,
    question_id TEXT,
    created_at INTEGER NOT NULL
)
"#;

const SCHEMA_SESSIONS: &str = r#"
CREATE TABLE IF NOT EXISTS communication_sessions (
    session_id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    user_type TEXT NOT NULL,
    school_id INTEGER NOT NULL,
    course_id INTEGER,
    classroom_id INTEGER,
    session_type TEXT NOT NULL,
    target_id TEXT,
    closed INTEGER NOT NULL DEFAULT 0,
    participants TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT
)
"#;

const SCHEMA_MESSAGES: &str = r#"
CREATE TABLE IF NOT EXISTS communication_messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL UNIQUE,
    session_id TEXT NOT NULL,
    user_id INTEGER NOT NULL,
    user_type TEXT NOT NULL,
    content TEXT NOT NULL,
    message_type TEXT NOT NULL,
    answer_to TEXT,
    created_at TEXT NOT NULL
)
"#;

const INDEX_STUDENT_CLASSROOM: &str = r#"
CREATE INDEX IF NOT EXISTS idx_student_behaviors_classroom
ON student_behaviors(classroom_id, created_at)
"#;

const INDEX_STUDENT_ID: &str = r#"
CREATE INDEX IF NOT EXISTS idx_student_behaviors_student
ON student_behaviors(student_id, created_at)
"#;

const INDEX_MESSAGES_SESSION: &str = r#"
CREATE INDEX IF NOT EXISTS idx_messages_session
ON communication_messages(session_id, seq)
"#;

const STUDENT_COLUMNS: &str = "school_id, class_id, classroom_id, student_id, behavior_type, communication_session_id, context, created_at";

const SESSION_COLUMNS: &str = "session_id, user_id, user_type, school_id, course_id, classroom_id, session_type, target_id, closed, participants, start_time, end_time";

const MESSAGE_COLUMNS: &str =
    "message_id, session_id, user_id, user_type, content, message_type, answer_to, created_at";

/// Turso-backed behavior store.
#[derive(Clone)]
pub struct TursoBehaviorStore {
    conn: Connection,
}

impl TursoBehaviorStore {
    /// Create a store backed by a local embedded database file.
    pub async fn new_local(path: &Path) -> Result<Self> {
        let db = Builder::new_local(path).build().await?;
        Self::with_connection(db.connect()?).await
    }

    /// Create a new in-memory store (for testing).
    pub async fn new_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::with_connection(db.connect()?).await
    }

    async fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Ensure the database schema exists.
    async fn ensure_schema(&self) -> Result<()> {
        for statement in [
            SCHEMA_TEACHER_BEHAVIORS,
            SCHEMA_STUDENT_BEHAVIORS,
            SCHEMA_SESSIONS,
            SCHEMA_MESSAGES,
            INDEX_STUDENT_CLASSROOM,
            INDEX_STUDENT_ID,
            INDEX_MESSAGES_SESSION,
        ] {
            self.conn.execute(statement, ()).await?;
        }
        Ok(())
    }

    async fn query_students(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<StudentBehavior>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(Self::parse_student(&row)?);
        }
        Ok(out)
    }

    /// Parse a student behavior from a database row.
    fn parse_student(row: &libsql::Row) -> Result<StudentBehavior> {
        let school_id: i64 = row.get(0)?;
        let class_id: i64 = row.get(1)?;
        let classroom_id: Option<i64> = row.get(2)?;
        let student_id: i64 = row.get(3)?;
        let behavior_type: String = row.get(4)?;
        let communication_session_id: Option<String> = row.get(5)?;
        let context_json: String = row.get(6)?;
        let created_at: i64 = row.get(7)?;

        Ok(StudentBehavior {
            school_id: school_id as u64,
            class_id: class_id as u64,
            classroom_id: classroom_id.map(|v| v as u64),
            student_id: student_id as u64,
            behavior_type: BehaviorType::parse(&behavior_type),
            communication_session_id,
            context: serde_json::from_str::<Value>(&context_json)?,
            created_at,
        })
    }

    /// Parse a session from a database row.
    fn parse_session(row: &libsql::Row) -> Result<CommunicationSession> {
        let session_id: String = row.get(0)?;
        let user_id: i64 = row.get(1)?;
        let user_type: String = row.get(2)?;
        let school_id: i64 = row.get(3)?;
        let course_id: Option<i64> = row.get(4)?;
        let classroom_id: Option<i64> = row.get(5)?;
        let session_type: String = row.get(6)?;
        let target_id: Option<String> = row.get(7)?;
        let closed: i64 = row.get(8)?;
        let participants_json: String = row.get(9)?;
        let start_time: String = row.get(10)?;
        let end_time: Option<String> = row.get(11)?;

        Ok(CommunicationSession {
            session_id,
            user_id: user_id as u64,
            user_type: parse_user_type(&user_type)?,
            school_id: school_id as u64,
            course_id: course_id.map(|v| v as u64),
            classroom_id: classroom_id.map(|v| v as u64),
            session_type: SessionType::parse(&session_type),
            target_id,
            closed: closed != 0,
            participants: serde_json::from_str::<Participants>(&participants_json)?,
            start_time: parse_datetime(&start_time)?,
            end_time: end_time.as_deref().map(parse_datetime).transpose()?,
        })
    }

    /// Parse a message from a database row.
    fn parse_message(row: &libsql::Row) -> Result<CommunicationMessage> {
        let message_id: String = row.get(0)?;
        let session_id: String = row.get(1)?;
        let user_id: i64 = row.get(2)?;
        let user_type: String = row.get(3)?;
        let content: String = row.get(4)?;
        let message_type: String = row.get(5)?;
        let answer_to: Option<String> = row.get(6)?;
        let created_at: String = row.get(7)?;

        Ok(CommunicationMessage {
            message_id,
            session_id,
            user_id: user_id as u64,
            user_type: parse_user_type(&user_type)?,
            content,
            message_type,
            answer_to,
            created_at: parse_datetime(&created_at)?,
        })
    }

    async fn exists(&self, sql: &str, id: &str) -> Result<bool> {
        let mut rows = self.conn.query(sql, [id.to_string()]).await?;
        Ok(rows.next().await?.is_some())
    }
}

#[async_trait]
impl BehaviorStore for TursoBehaviorStore {
    #[instrument(skip(self, records), fields(count = records.len()), level = "debug")]
    async fn save_teacher_behaviors(&self, records: Vec<TeacherBehavior>) -> Result<()> {
        for record in &records {
            self.conn
                .execute(
                    "INSERT INTO teacher_behaviors (school_id, class_id, classroom_id, teacher_id, behavior_type, communication_session_id, context, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                    libsql::params![
                        record.school_id as i64,
                        record.class_id as i64,
                        record.classroom_id.map(|v| v as i64),
                        record.teacher_id as i64,
                        record.behavior_type.as_str().to_string(),
                        record.communication_session_id.clone(),
                        serde_json::to_string(&record.context)?,
                        record.created_at
                    ],
                )
                .await?;
        }
        debug!("teacher behaviors saved");
        Ok(())
    }

    #[instrument(skip(self, records), fields(count = records.len()), level = "debug")]
    async fn save_student_behaviors(&self, records: Vec<StudentBehavior>) -> Result<()> {
        for record in &records {
            let answer = record.answer_context();
            self.conn
                .execute(
                    "INSERT INTO student_behaviors (school_id, class_id, classroom_id, student_id, behavior_type, communication_session_id, context, is_correct, question_id, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    libsql::params![
                        record.school_id as i64,
                        record.class_id as i64,
                        record.classroom_id.map(|v| v as i64),
                        record.student_id as i64,
                        record.behavior_type.as_str().to_string(),
                        record.communication_session_id.clone(),
                        serde_json::to_string(&record.context)?,
                        answer.as_ref().map(|a| a.is_correct as i64),
                        answer.and_then(|a| a.question_id),
                        record.created_at
                    ],
                )
                .await?;
        }
        debug!("student behaviors saved");
        Ok(())
    }

    #[instrument(skip(self, sessions, messages), fields(sessions = sessions.len(), messages = messages.len()), level = "debug")]
    async fn save_communication(
        &self,
        sessions: Vec<CommunicationSession>,
        messages: Vec<CommunicationMessage>,
    ) -> Result<()> {
        for session in &sessions {
            self.conn
                .execute(
                    &format!(
                        "INSERT OR REPLACE INTO communication_sessions ({SESSION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
                    ),
                    libsql::params![
                        session.session_id.clone(),
                        session.user_id as i64,
                        session.user_type.as_str(),
                        session.school_id as i64,
                        session.course_id.map(|v| v as i64),
                        session.classroom_id.map(|v| v as i64),
                        session.session_type.as_str(),
                        session.target_id.clone(),
                        session.closed as i64,
                        serde_json::to_string(&session.participants)?,
                        format_datetime(session.start_time),
                        session.end_time.map(format_datetime)
                    ],
                )
                .await?;
        }

        for message in &messages {
            self.conn
                .execute(
                    &format!(
                        "INSERT OR IGNORE INTO communication_messages ({MESSAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
                    ),
                    libsql::params![
                        message.message_id.clone(),
                        message.session_id.clone(),
                        message.user_id as i64,
                        message.user_type.as_str(),
                        message.content.clone(),
                        message.message_type.clone(),
                        message.answer_to.clone(),
                        format_datetime(message.created_at)
                    ],
                )
                .await?;
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_communication_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CommunicationSession>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {SESSION_COLUMNS} FROM communication_sessions WHERE session_id = ?"),
                [session_id.to_string()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_session(&row)?))
        } else {
            Ok(None)
        }
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_communication_session_messages(
        &self,
        session_id: &str,
        page: Page,
    ) -> Result<Vec<CommunicationMessage>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM communication_messages WHERE session_id = ? ORDER BY seq LIMIT ? OFFSET ?"
                ),
                libsql::params![session_id.to_string(), page.size as i64, page.offset() as i64],
            )
            .await?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await? {
            messages.push(Self::parse_message(&row)?);
        }
        Ok(messages)
    }

    async fn check_session_ids_exist(&self, session_ids: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        for id in session_ids {
            if self
                .exists(
                    "SELECT 1 FROM communication_sessions WHERE session_id = ?",
                    id,
                )
                .await?
            {
                found.insert(id.clone());
            }
        }
        Ok(found)
    }

    async fn check_message_ids_exist(&self, message_ids: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        for id in message_ids {
            if self
                .exists(
                    "SELECT 1 FROM communication_messages WHERE message_id = ?",
                    id,
                )
                .await?
            {
                found.insert(id.clone());
            }
        }
        Ok(found)
    }

    #[instrument(skip(self, update), level = "debug")]
    async fn update_communication_session(
        &self,
        session_id: &str,
        update: SessionUpdate,
    ) -> Result<bool> {
        let Some(mut session) = self.get_communication_session(session_id).await? else {
            return Ok(false);
        };
        update.apply(&mut session);

        self.conn
            .execute(
                "UPDATE communication_sessions SET closed = ?, end_time = ?, participants = ? WHERE session_id = ?",
                libsql::params![
                    session.closed as i64,
                    session.end_time.map(format_datetime),
                    serde_json::to_string(&session.participants)?,
                    session_id.to_string()
                ],
            )
            .await?;
        Ok(true)
    }

    async fn get_class_latest_behaviors(&self, classroom_id: u64) -> Result<Vec<StudentBehavior>> {
        let all = self.get_class_all_behaviors(classroom_id).await?;
        let mut latest: BTreeMap<u64, StudentBehavior> = BTreeMap::new();
        for row in all {
            latest.insert(row.actor_id(), row);
        }
        Ok(latest.into_values().collect())
    }

    async fn get_class_all_behaviors(&self, classroom_id: u64) -> Result<Vec<StudentBehavior>> {
        self.query_students(
            &format!(
                "SELECT {STUDENT_COLUMNS} FROM student_behaviors WHERE classroom_id = ? ORDER BY created_at, id"
            ),
            [classroom_id as i64],
        )
        .await
    }

    async fn get_students_behaviors(&self, student_ids: &[u64]) -> Result<Vec<StudentBehavior>> {
        let mut rows = Vec::new();
        for id in student_ids {
            rows.extend(
                self.query_students(
                    &format!(
                        "SELECT {STUDENT_COLUMNS} FROM student_behaviors WHERE student_id = ? ORDER BY created_at, id"
                    ),
                    [*id as i64],
                )
                .await?,
            );
        }
        rows.sort_by_key(|r| r.created_at);
        Ok(rows)
    }
}

fn parse_user_type(s: &str) -> Result<UserType> {
    UserType::parse(s).ok_or_else(|| StoreError::InvalidData(format!("invalid user type: {s}")))
}

/// Format a datetime for storage.
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse a datetime from storage.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidData(format!("invalid datetime: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn create_test_store() -> TursoBehaviorStore {
        TursoBehaviorStore::new_memory().await.unwrap()
    }

    fn answer(student_id: u64, created_at: i64, correct: bool) -> StudentBehavior {
        StudentBehavior {
            school_id: 1,
            class_id: 2,
            classroom_id: Some(30),
            student_id,
            behavior_type: BehaviorType::Answer,
            communication_session_id: None,
            context: json!({"is_correct": correct, "question_id": format!("q-{created_at}")}),
            created_at,
        }
    }

    fn session(id: &str) -> CommunicationSession {
        CommunicationSession {
            session_id: id.to_string(),
            user_id: 7,
            user_type: UserType::Student,
            school_id: 1,
            course_id: Some(3),
            classroom_id: Some(30),
            session_type: SessionType::Question,
            target_id: None,
            closed: false,
            participants: Participants::new(),
            start_time: Utc::now(),
            end_time: None,
        }
    }

    fn message(id: &str, session_id: &str) -> CommunicationMessage {
        CommunicationMessage {
            message_id: id.to_string(),
            session_id: session_id.to_string(),
            user_id: 7,
            user_type: UserType::Student,
            content: "what is a prime?".to_string(),
            message_type: "text".to_string(),
            answer_to: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn student_behaviors_round_trip_in_time_order() {
        let store = create_test_store().await;
        store
            .save_student_behaviors(vec![answer(1, 200, false), answer(1, 100, true), answer(2, 150, true)])
            .await
            .unwrap();

        let all = store.get_class_all_behaviors(30).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].created_at, 100);
        assert_eq!(all[0].context["is_correct"], true);

        let latest = store.get_class_latest_behaviors(30).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].created_at, 200);

        let students = store.get_students_behaviors(&[2]).await.unwrap();
        assert_eq!(students.len(), 1);
        assert_eq!(students[0].student_id, 2);
    }

    #[tokio::test]
    async fn teacher_behaviors_accept_opaque_context() {
        let store = create_test_store().await;
        let record = TeacherBehavior {
            school_id: 1,
            class_id: 2,
            classroom_id: None,
            teacher_id: 5,
            behavior_type: BehaviorType::Other("lecture".to_string()),
            communication_session_id: None,
            context: json!({"slides": [1, 2, 3]}),
            created_at: 10,
        };
        store.save_teacher_behaviors(vec![record]).await.unwrap();
    }

    #[tokio::test]
    async fn sessions_and_messages_round_trip() {
        let store = create_test_store().await;
        store
            .save_communication(
                vec![session("s-1")],
                vec![message("m-1", "s-1"), message("m-2", "s-1")],
            )
            .await
            .unwrap();

        let loaded = store.get_communication_session("s-1").await.unwrap().unwrap();
        assert_eq!(loaded.user_type, UserType::Student);
        assert_eq!(loaded.course_id, Some(3));
        assert!(!loaded.closed);

        let page = store
            .get_communication_session_messages("s-1", Page::first(1).next())
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].message_id, "m-2");

        let exists = store
            .check_message_ids_exist(&["m-1".to_string(), "m-3".to_string()])
            .await
            .unwrap();
        assert_eq!(exists, HashSet::from(["m-1".to_string()]));
        assert!(store.get_communication_session("s-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_closes_session() {
        let store = create_test_store().await;
        store.save_communication(vec![session("s-1")], vec![]).await.unwrap();

        let mut participants = Participants::new();
        participants.insert(UserType::Student, vec![7]);
        let updated = store
            .update_communication_session("s-1", SessionUpdate::close(Utc::now(), participants.clone()))
            .await
            .unwrap();
        assert!(updated);

        let loaded = store.get_communication_session("s-1").await.unwrap().unwrap();
        assert!(loaded.closed);
        assert!(loaded.end_time.is_some());
        assert_eq!(loaded.participants, participants);

        assert!(
            !store
                .update_communication_session("nope", SessionUpdate::default())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn local_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classpulse.db");

        {
            let store = TursoBehaviorStore::new_local(&path).await.unwrap();
            store.save_student_behaviors(vec![answer(9, 1, true)]).await.unwrap();
        }

        let reopened = TursoBehaviorStore::new_local(&path).await.unwrap();
        let rows = reopened.get_students_behaviors(&[9]).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
