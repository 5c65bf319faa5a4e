//! Teacher and student behavior records.
//!
//! Records are append-only: created once by ingestion, never mutated.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{AnswerContext, BrowseContext, LearningContext};

/// Kind of logged action. Open-ended: unknown names are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BehaviorType {
    Browse,
    Answer,
    Question,
    Learning,
    Praise,
    Attention,
    Communication,
    TaskPraise,
    TaskAttention,
    Other(String),
}

impl BehaviorType {
    pub fn as_str(&self) -> &str {
        match self {
            BehaviorType::Browse => "browse",
            BehaviorType::Answer => "answer",
            BehaviorType::Question => "question",
            BehaviorType::Learning => "learning",
            BehaviorType::Praise => "praise",
            BehaviorType::Attention => "attention",
            BehaviorType::Communication => "communication",
            BehaviorType::TaskPraise => "task_praise",
            BehaviorType::TaskAttention => "task_attention",
            BehaviorType::Other(name) => name,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "browse" => BehaviorType::Browse,
            "answer" => BehaviorType::Answer,
            "question" => BehaviorType::Question,
            "learning" => BehaviorType::Learning,
            "praise" => BehaviorType::Praise,
            "attention" => BehaviorType::Attention,
            "communication" => BehaviorType::Communication,
            "task_praise" => BehaviorType::TaskPraise,
            "task_attention" => BehaviorType::TaskAttention,
            other => BehaviorType::Other(other.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl Default for BehaviorType {
    fn default() -> Self {
        BehaviorType::Other(String::new())
    }
}

impl From<String> for BehaviorType {
    fn from(s: String) -> Self {
        BehaviorType::parse(&s)
    }
}

impl From<BehaviorType> for String {
    fn from(t: BehaviorType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for BehaviorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by teacher and student behavior rows.
pub trait BehaviorRecord {
    fn school_id(&self) -> u64;
    fn class_id(&self) -> u64;
    fn classroom_id(&self) -> Option<u64>;
    /// The teacher or student who acted.
    fn actor_id(&self) -> u64;
    fn behavior_type(&self) -> &BehaviorType;
    fn context(&self) -> &Value;
    /// Unix seconds.
    fn created_at(&self) -> i64;

    /// Name of the actor id field, for validation messages.
    fn actor_field(&self) -> &'static str;

    fn answer_context(&self) -> Option<AnswerContext> {
        if *self.behavior_type() != BehaviorType::Answer {
            return None;
        }
        AnswerContext::from_context(self.context())
    }

    fn learning_context(&self) -> LearningContext {
        LearningContext::from_context(self.context())
    }

    fn browse_context(&self) -> BrowseContext {
        BrowseContext::from_context(self.context())
    }
}

/// One logged teacher action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeacherBehavior {
    #[serde(default)]
    pub school_id: u64,
    #[serde(default)]
    pub class_id: u64,
    #[serde(default)]
    pub classroom_id: Option<u64>,
    #[serde(default)]
    pub teacher_id: u64,
    #[serde(default)]
    pub behavior_type: BehaviorType,
    #[serde(default)]
    pub communication_session_id: Option<String>,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub created_at: i64,
}

/// One logged student action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentBehavior {
    #[serde(default)]
    pub school_id: u64,
    #[serde(default)]
    pub class_id: u64,
    #[serde(default)]
    pub classroom_id: Option<u64>,
    #[serde(default)]
    pub student_id: u64,
    #[serde(default)]
    pub behavior_type: BehaviorType,
    #[serde(default)]
    pub communication_session_id: Option<String>,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub created_at: i64,
}

macro_rules! impl_behavior_record {
    ($ty:ty, $actor:ident) => {
        impl BehaviorRecord for $ty {
            fn school_id(&self) -> u64 {
                self.school_id
            }
            fn class_id(&self) -> u64 {
                self.class_id
            }
            fn classroom_id(&self) -> Option<u64> {
                self.classroom_id
            }
            fn actor_id(&self) -> u64 {
                self.$actor
            }
            fn behavior_type(&self) -> &BehaviorType {
                &self.behavior_type
            }
            fn context(&self) -> &Value {
                &self.context
            }
            fn created_at(&self) -> i64 {
                self.created_at
            }
            fn actor_field(&self) -> &'static str {
                stringify!($actor)
            }
        }
    };
}

impl_behavior_record!(TeacherBehavior, teacher_id);
impl_behavior_record!(StudentBehavior, student_id);
