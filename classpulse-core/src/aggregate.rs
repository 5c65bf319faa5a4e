//! Per-student rollup of classroom behavior rows.
//!
//! Built fresh on every query from the behavior log and never persisted.

use std::collections::BTreeMap;

use crate::behavior::{BehaviorRecord, BehaviorType, StudentBehavior};
use crate::context::{BrowseAction, LearningType, VideoStatus};

/// Counts and latest state of one student's behavior.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentAggregate {
    pub student_id: u64,
    /// Answer events with a parseable answer context.
    pub total_questions: u32,
    pub correct_answers: u32,
    /// Current run of consecutive correct answers.
    pub correct_streak: u32,
    pub early_learn_count: u32,
    pub question_count: u32,
    pub page_switch_count: u32,
    pub other_content_count: u32,
    pub pause_count: u32,

    pub latest_page: Option<String>,
    pub latest_subject: Option<String>,
    pub learning_type: LearningType,
    pub video_status: VideoStatus,
    pub stay_duration: u64,
    pub pause_duration: u64,

    /// Type of the most recent row: the behavior that triggered the query.
    pub latest_behavior: Option<BehaviorType>,
    /// Browse action of the most recent row, when it was a browse.
    pub latest_browse_action: Option<BrowseAction>,
}

impl StudentAggregate {
    /// Fold a student's rows, oldest first.
    pub fn from_behaviors<'a, I>(student_id: u64, rows: I) -> Self
    where
        I: IntoIterator<Item = &'a StudentBehavior>,
    {
        let mut agg = Self {
            student_id,
            ..Default::default()
        };
        for row in rows {
            agg.push(row);
        }
        agg
    }

    fn push(&mut self, row: &StudentBehavior) {
        self.latest_browse_action = None;

        match row.behavior_type {
            BehaviorType::Answer => {
                if let Some(answer) = row.answer_context() {
                    self.total_questions += 1;
                    if answer.is_correct {
                        self.correct_answers += 1;
                        self.correct_streak += 1;
                    } else {
                        self.correct_streak = 0;
                    }
                }
            }
            BehaviorType::Question => self.question_count += 1,
            BehaviorType::Learning => {
                let learning = row.learning_context();
                if learning.early {
                    self.early_learn_count += 1;
                }
                if learning.video_status == VideoStatus::Pause {
                    self.pause_count += 1;
                }
                self.learning_type = learning.learning_type;
                self.video_status = learning.video_status;
                self.stay_duration = learning.stay_duration;
                self.pause_duration = learning.pause_duration;
                if learning.page.is_some() {
                    self.latest_page = learning.page;
                }
                if learning.subject.is_some() {
                    self.latest_subject = learning.subject;
                }
            }
            BehaviorType::Browse => {
                let browse = row.browse_context();
                match browse.action {
                    BrowseAction::PageSwitch => self.page_switch_count += 1,
                    BrowseAction::OtherContent => self.other_content_count += 1,
                    BrowseAction::View => {}
                }
                self.latest_browse_action = Some(browse.action);
                if browse.page.is_some() {
                    self.latest_page = browse.page;
                }
                if browse.subject.is_some() {
                    self.latest_subject = browse.subject;
                }
            }
            _ => {}
        }

        self.latest_behavior = Some(row.behavior_type.clone());
    }

    /// Correct answers over total answers, 0 when nothing was answered.
    pub fn accuracy(&self) -> f64 {
        if self.total_questions == 0 {
            0.0
        } else {
            f64::from(self.correct_answers) / f64::from(self.total_questions)
        }
    }

    pub fn latest_is(&self, behavior_type: &BehaviorType) -> bool {
        self.latest_behavior.as_ref() == Some(behavior_type)
    }
}

/// Group rows by student and fold each group. Rows must be oldest first.
pub fn aggregate_by_student(rows: &[StudentBehavior]) -> BTreeMap<u64, StudentAggregate> {
    let mut grouped: BTreeMap<u64, Vec<&StudentBehavior>> = BTreeMap::new();
    for row in rows {
        grouped.entry(row.student_id).or_default().push(row);
    }

    grouped
        .into_iter()
        .map(|(student_id, rows)| (student_id, StudentAggregate::from_behaviors(student_id, rows)))
        .collect()
}
