//! Praise eligibility and sub-type selection.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::best_above;
use crate::aggregate::StudentAggregate;
use crate::behavior::BehaviorType;
use crate::context::{LearningType, VideoStatus};

/// Starting score of every praise sub-type.
pub const BASE_SCORE: i64 = 5;

const STREAK_THRESHOLD: u32 = 3;
const CORRECT_ANSWERS_THRESHOLD: u32 = 3;
const HIGH_ACCURACY: f64 = 0.8;
const LONG_STAY_SECS: u64 = 1800;
const STAY_BONUS_FROM_SECS: u64 = 900;
const STAY_BONUS_STEP_SECS: u64 = 300;

/// Reason cited for a praise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PraiseType {
    CorrectStreak,
    EarlyLearn,
    Question,
}

impl PraiseType {
    /// Canonical order. Also the tie-break order.
    pub const ALL: [PraiseType; 3] = [
        PraiseType::CorrectStreak,
        PraiseType::EarlyLearn,
        PraiseType::Question,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PraiseType::CorrectStreak => "correct_streak",
            PraiseType::EarlyLearn => "early_learn",
            PraiseType::Question => "question",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Teacher-facing message for this praise.
    pub fn message(&self, agg: &StudentAggregate) -> String {
        match self {
            PraiseType::CorrectStreak => format!(
                "Answered {} questions correctly in a row",
                agg.correct_streak
            ),
            PraiseType::EarlyLearn if agg.learning_type == LearningType::SelfStudy => {
                "Studying on their own initiative".to_string()
            }
            PraiseType::EarlyLearn => "Started learning before class".to_string(),
            PraiseType::Question => format!("Asked {} questions in class", agg.question_count),
        }
    }
}

impl fmt::Display for PraiseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a student currently deserves praise.
pub fn is_praise_worthy(agg: &StudentAggregate) -> bool {
    let streak = agg.correct_streak >= STREAK_THRESHOLD;
    let early = agg.early_learn_count >= 1 || agg.learning_type == LearningType::SelfStudy;
    let asked = agg.question_count >= 1;
    let accurate = agg.correct_answers >= CORRECT_ANSWERS_THRESHOLD
        && (agg.total_questions == 0 || agg.accuracy() >= HIGH_ACCURACY);
    let focused = agg.stay_duration >= LONG_STAY_SECS && agg.video_status != VideoStatus::Pause;

    streak || early || asked || accurate || focused
}

fn stay_bonus(stay_duration: u64) -> i64 {
    if stay_duration < STAY_BONUS_FROM_SECS {
        return 0;
    }
    10 + ((stay_duration - STAY_BONUS_FROM_SECS) / STAY_BONUS_STEP_SECS) as i64
}

/// Score of one praise sub-type for a student.
pub fn praise_score(praise_type: PraiseType, agg: &StudentAggregate) -> i64 {
    let mut score = BASE_SCORE;
    match praise_type {
        PraiseType::CorrectStreak => {
            score += i64::from(agg.correct_streak) * 5;
            if agg.accuracy() >= HIGH_ACCURACY {
                score += 10;
            }
            if agg.latest_is(&BehaviorType::Answer) {
                score += 10;
            }
        }
        PraiseType::Question => {
            score += i64::from(agg.question_count) * 10;
            if agg.latest_is(&BehaviorType::Question) {
                score += 15;
            }
        }
        PraiseType::EarlyLearn => {
            score += i64::from(agg.early_learn_count) * 10;
            score += stay_bonus(agg.stay_duration);
            if agg.learning_type == LearningType::SelfStudy {
                score += 15;
            }
            if agg.latest_is(&BehaviorType::Learning) {
                score += 10;
            }
        }
    }
    score
}

/// Choose the praise sub-type to cite among `available`.
///
/// Returns `None` only when nothing is available. When no sub-type beats
/// [`BASE_SCORE`] the first available one in canonical order is chosen.
pub fn select_praise_type(agg: &StudentAggregate, available: &[PraiseType]) -> Option<PraiseType> {
    let candidates = PraiseType::ALL.into_iter().filter(|t| available.contains(t));
    best_above(candidates.clone(), BASE_SCORE, |t| praise_score(t, agg))
        .or_else(|| candidates.into_iter().next())
}
