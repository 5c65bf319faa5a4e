//! Communication sessions and messages.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who posted or opened something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Student,
    Teacher,
    Ai,
    Assistant,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Student => "student",
            UserType::Teacher => "teacher",
            UserType::Ai => "ai",
            UserType::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(UserType::Student),
            "teacher" => Some(UserType::Teacher),
            "ai" => Some(UserType::Ai),
            "assistant" => Some(UserType::Assistant),
            _ => None,
        }
    }

    /// Only people open sessions or post ingested messages.
    pub fn is_human(&self) -> bool {
        matches!(self, UserType::Student | UserType::Teacher)
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a session is about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Question,
    Answer,
    Chat,
    #[default]
    #[serde(other)]
    Other,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Question => "question",
            SessionType::Answer => "answer",
            SessionType::Chat => "chat",
            SessionType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "question" => SessionType::Question,
            "answer" => SessionType::Answer,
            "chat" => SessionType::Chat,
            _ => SessionType::Other,
        }
    }
}

/// User ids grouped by user type.
pub type Participants = BTreeMap<UserType, Vec<u64>>;

/// A conversation thread. Terminal once `closed` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationSession {
    pub session_id: String,
    pub user_id: u64,
    pub user_type: UserType,
    pub school_id: u64,
    #[serde(default)]
    pub course_id: Option<u64>,
    #[serde(default)]
    pub classroom_id: Option<u64>,
    #[serde(default)]
    pub session_type: SessionType,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub participants: Participants,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

/// A single message posted to a session. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationMessage {
    pub message_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub user_id: u64,
    pub user_type: UserType,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub message_type: String,
    /// Weak reference to another message in the same conversation.
    #[serde(default)]
    pub answer_to: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Request to open a new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenSession {
    /// Producer-assigned id; generated when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: u64,
    pub user_type: UserType,
    #[serde(default)]
    pub school_id: u64,
    #[serde(default)]
    pub course_id: Option<u64>,
    #[serde(default)]
    pub classroom_id: Option<u64>,
    #[serde(default)]
    pub session_type: SessionType,
    #[serde(default)]
    pub target_id: Option<String>,
}

/// Payload of a `communication` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CommunicationEvent {
    OpenSession(OpenSession),
    CloseSession { session_id: String },
    Message(CommunicationMessage),
}

impl CommunicationEvent {
    pub fn session_id(&self) -> Option<&str> {
        match self {
            CommunicationEvent::OpenSession(open) => open.session_id.as_deref(),
            CommunicationEvent::CloseSession { session_id } => Some(session_id),
            CommunicationEvent::Message(message) => Some(&message.session_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn communication_event_is_tagged_by_action() {
        let event: CommunicationEvent = serde_json::from_value(json!({
            "action": "message",
            "message_id": "m-1",
            "session_id": "s-1",
            "user_id": 4,
            "user_type": "student",
            "content": "why?",
            "message_type": "text"
        }))
        .unwrap();

        assert_eq!(event.session_id(), Some("s-1"));
        assert!(matches!(event, CommunicationEvent::Message(m) if m.content == "why?"));
    }

    #[test]
    fn participants_serialize_with_user_type_keys() {
        let mut participants = Participants::new();
        participants.insert(UserType::Teacher, vec![9]);
        participants.insert(UserType::Student, vec![1, 2]);

        let value = serde_json::to_value(&participants).unwrap();
        assert_eq!(value, json!({"student": [1, 2], "teacher": [9]}));
    }

    #[test]
    fn only_students_and_teachers_are_human() {
        assert!(UserType::Student.is_human());
        assert!(UserType::Teacher.is_human());
        assert!(!UserType::Ai.is_human());
        assert!(!UserType::Assistant.is_human());
    }
}
