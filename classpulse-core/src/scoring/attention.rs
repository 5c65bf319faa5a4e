//! Attention eligibility and sub-type selection.
//!
//! Attention is a recurring nudge, so selection never gates on sub-types
//! already used today.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::best_above;
use crate::aggregate::StudentAggregate;
use crate::behavior::BehaviorType;
use crate::context::{BrowseAction, VideoStatus};

const MIN_ANSWERS: u32 = 3;
const LOW_ACCURACY: f64 = 0.5;
const LONG_PAUSE_SECS: u64 = 300;

/// Reason cited for an attention reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionType {
    PageSwitch,
    OtherContent,
    Pause,
}

impl AttentionType {
    /// Canonical order. Also the tie-break order.
    pub const ALL: [AttentionType; 3] = [
        AttentionType::PageSwitch,
        AttentionType::OtherContent,
        AttentionType::Pause,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttentionType::PageSwitch => "page_switch",
            AttentionType::OtherContent => "other_content",
            AttentionType::Pause => "pause",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn message(&self, agg: &StudentAggregate) -> String {
        match self {
            AttentionType::PageSwitch => {
                format!("Switched pages {} times", agg.page_switch_count)
            }
            AttentionType::OtherContent => {
                format!("Opened unrelated content {} times", agg.other_content_count)
            }
            AttentionType::Pause => format!(
                "Video paused for {} minutes",
                agg.pause_duration / 60
            ),
        }
    }
}

impl fmt::Display for AttentionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn paused_too_long(agg: &StudentAggregate) -> bool {
    agg.latest_is(&BehaviorType::Learning)
        && agg.video_status == VideoStatus::Pause
        && agg.pause_duration >= LONG_PAUSE_SECS
}

/// Whether a student currently needs the teacher's attention.
pub fn needs_attention(agg: &StudentAggregate) -> bool {
    let struggling = agg.total_questions >= MIN_ANSWERS && agg.accuracy() < LOW_ACCURACY;
    struggling || paused_too_long(agg)
}

/// Score of one attention sub-type for a student.
pub fn attention_score(attention_type: AttentionType, agg: &StudentAggregate) -> i64 {
    match attention_type {
        AttentionType::PageSwitch => {
            let mut score = i64::from(agg.page_switch_count) * 5;
            if agg.latest_browse_action == Some(BrowseAction::PageSwitch) {
                score += 10;
            }
            score
        }
        AttentionType::OtherContent => {
            let mut score = i64::from(agg.other_content_count) * 8;
            if agg.latest_browse_action == Some(BrowseAction::OtherContent) {
                score += 10;
            }
            score
        }
        AttentionType::Pause => {
            let mut score = i64::from(agg.pause_count) * 5 + (agg.pause_duration / 60) as i64;
            if agg.latest_is(&BehaviorType::Learning) && agg.video_status == VideoStatus::Pause {
                score += 15;
            }
            score
        }
    }
}

/// Choose the attention sub-type to cite.
///
/// Falls back to [`AttentionType::PageSwitch`] when there is no behavior
/// data or every score is non-positive.
pub fn select_attention_type(agg: Option<&StudentAggregate>) -> AttentionType {
    agg.and_then(|agg| best_above(AttentionType::ALL, 0, |t| attention_score(t, agg)))
        .unwrap_or(AttentionType::PageSwitch)
}
