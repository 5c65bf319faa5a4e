//! Typed views over the free-form behavior `context` blob.
//!
//! The blob's schema depends on the behavior type. Views are decoded on
//! demand; absent fields fall back to zero values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the student is studying.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningType {
    SelfStudy,
    Class,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Playback state of the lesson video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Play,
    Pause,
    Stop,
    #[default]
    #[serde(other)]
    Unknown,
}

/// What a browse event did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrowseAction {
    PageSwitch,
    OtherContent,
    #[default]
    #[serde(other)]
    View,
}

/// Context of an `answer` behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerContext {
    pub is_correct: bool,
    #[serde(default)]
    pub chapter_id: Option<String>,
    #[serde(default)]
    pub question_id: Option<String>,
}

impl AnswerContext {
    /// Decode from a context blob. Malformed context yields `None`.
    pub fn from_context(context: &Value) -> Option<Self> {
        serde_json::from_value(context.clone()).ok()
    }
}

/// Context of a `learning` behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningContext {
    pub learning_type: LearningType,
    pub video_status: VideoStatus,
    /// Seconds spent on the current material.
    pub stay_duration: u64,
    /// Seconds the video has been paused.
    pub pause_duration: u64,
    /// Student started before the lesson did.
    pub early: bool,
    pub subject: Option<String>,
    pub page: Option<String>,
}

impl LearningContext {
    pub fn from_context(context: &Value) -> Self {
        serde_json::from_value(context.clone()).unwrap_or_default()
    }
}

/// Context of a `browse` behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowseContext {
    pub action: BrowseAction,
    pub page: Option<String>,
    pub subject: Option<String>,
}

impl BrowseContext {
    pub fn from_context(context: &Value) -> Self {
        serde_json::from_value(context.clone()).unwrap_or_default()
    }
}

/// Context of a teacher `praise` / `attention` behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionContext {
    pub student_id: u64,
    pub sub_type: String,
    pub message: String,
}

impl ActionContext {
    pub fn from_context(context: &Value) -> Self {
        serde_json::from_value(context.clone()).unwrap_or_default()
    }

    pub fn to_context(&self) -> Value {
        serde_json::json!({
            "student_id": self.student_id,
            "sub_type": self.sub_type,
            "message": self.message,
        })
    }
}
