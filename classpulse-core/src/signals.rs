//! Classroom-wide praise and attention suggestions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::aggregate::aggregate_by_student;
use crate::guard::ActionGuard;
use crate::scoring::{
    AttentionType, PraiseType, attention_score, is_praise_worthy, needs_attention, praise_score,
    select_attention_type, select_praise_type,
};
use crate::store::{BehaviorStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PraiseCandidate {
    pub student_id: u64,
    pub praise_type: PraiseType,
    pub score: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionCandidate {
    pub student_id: u64,
    pub attention_type: AttentionType,
    pub score: i64,
    pub message: String,
}

/// Students worth a praise or a nudge right now.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassroomReport {
    pub classroom_id: u64,
    pub praise_worthy: Vec<PraiseCandidate>,
    pub need_attention: Vec<AttentionCandidate>,
}

/// Scans a classroom's behavior log for praise and attention candidates.
pub struct ClassroomSignals {
    store: Arc<dyn BehaviorStore>,
    guard: Arc<ActionGuard>,
}

impl ClassroomSignals {
    pub fn new(store: Arc<dyn BehaviorStore>, guard: Arc<ActionGuard>) -> Self {
        Self { store, guard }
    }

    /// Build the report for one classroom.
    ///
    /// Students whose praise sub-types are all used are left out. Attention
    /// candidates claim the attention window, so a student is suggested at
    /// most once per window.
    #[instrument(skip(self))]
    pub async fn scan(&self, classroom_id: u64) -> Result<ClassroomReport, StoreError> {
        let rows = self.store.get_class_all_behaviors(classroom_id).await?;
        let latest = self.store.get_class_latest_behaviors(classroom_id).await?;
        let aggregates = aggregate_by_student(&rows);

        let mut report = ClassroomReport {
            classroom_id,
            ..Default::default()
        };

        for row in &latest {
            let Some(agg) = aggregates.get(&row.student_id) else {
                continue;
            };

            if is_praise_worthy(agg) {
                let available = self
                    .guard
                    .available_praise_types(classroom_id, agg.student_id)
                    .await?;
                if let Some(praise_type) = select_praise_type(agg, &available) {
                    report.praise_worthy.push(PraiseCandidate {
                        student_id: agg.student_id,
                        praise_type,
                        score: praise_score(praise_type, agg),
                        message: praise_type.message(agg),
                    });
                }
            }

            if needs_attention(agg) {
                if self
                    .guard
                    .try_open_attention_window(classroom_id, agg.student_id)
                    .await?
                {
                    let attention_type = select_attention_type(Some(agg));
                    report.need_attention.push(AttentionCandidate {
                        student_id: agg.student_id,
                        attention_type,
                        score: attention_score(attention_type, agg),
                        message: attention_type.message(agg),
                    });
                } else {
                    debug!(student_id = agg.student_id, "attention already suggested in window");
                }
            }
        }

        debug!(
            praise = report.praise_worthy.len(),
            attention = report.need_attention.len(),
            "classroom scanned"
        );
        Ok(report)
    }
}
