//! Rate limits and dedup markers for teacher praise/attention actions.
//!
//! Markers live in the [`TtlStore`] and are scoped to a classroom and a
//! student:
//!
//! - one marker per praise sub-type, so a student collects at most three
//!   distinct praises per classroom per marker window
//! - an aggregate "praised" marker kept alongside the per-type markers
//! - a reminder counter bumped by every attention action
//! - the classroom's "handled" hash, student id to unix timestamp
//! - a short attention window used to suppress repeated automated reminders
//!
//! Every successful action also appends a [`TeacherBehavior`] row. That row is
//! the durable record; the markers only expire.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregate::{StudentAggregate, aggregate_by_student};
use crate::behavior::{BehaviorType, TeacherBehavior};
use crate::context::ActionContext;
use crate::error::{GuardError, ValidationError};
use crate::scoring::{
    PraiseType, is_praise_worthy, select_attention_type, select_praise_type,
};
use crate::store::{BehaviorStore, StoreError, TtlStore};
use crate::validate::Validate;

/// Lifetime of praise, handled and reminder markers.
pub const MARKER_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifetime of the automated attention suppression window.
pub const ATTENTION_WINDOW: Duration = Duration::from_secs(60);

/// Marker lifetimes used by the guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default = "default_marker_ttl", with = "humantime_serde")]
    pub marker_ttl: Duration,

    #[serde(default = "default_attention_window", with = "humantime_serde")]
    pub attention_window: Duration,
}

fn default_marker_ttl() -> Duration {
    MARKER_TTL
}

fn default_attention_window() -> Duration {
    ATTENTION_WINDOW
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            marker_ttl: default_marker_ttl(),
            attention_window: default_attention_window(),
        }
    }
}

impl GuardConfig {
    #[must_use]
    pub fn with_marker_ttl(mut self, ttl: Duration) -> Self {
        self.marker_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_attention_window(mut self, window: Duration) -> Self {
        self.attention_window = window;
        self
    }
}

/// TTL store key layout.
pub mod keys {
    use crate::scoring::PraiseType;

    const PREFIX: &str = "classpulse";

    pub fn handled(classroom_id: u64) -> String {
        format!("{PREFIX}:classroom:{classroom_id}:handled")
    }

    pub fn praised(classroom_id: u64, student_id: u64) -> String {
        format!("{PREFIX}:classroom:{classroom_id}:student:{student_id}:praised")
    }

    pub fn praise_type(classroom_id: u64, student_id: u64, praise_type: PraiseType) -> String {
        format!(
            "{PREFIX}:classroom:{classroom_id}:student:{student_id}:praise:{}",
            praise_type.as_str()
        )
    }

    pub fn reminder(classroom_id: u64, student_id: u64) -> String {
        format!("{PREFIX}:classroom:{classroom_id}:student:{student_id}:reminder")
    }

    pub fn attention_window(classroom_id: u64, student_id: u64) -> String {
        format!("{PREFIX}:classroom:{classroom_id}:student:{student_id}:attention_window")
    }

    pub fn session(session_id: &str) -> String {
        format!("{PREFIX}:session:{session_id}")
    }
}

/// Which teacher action a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Praise,
    Attention,
}

impl ActionKind {
    pub fn behavior_type(&self) -> BehaviorType {
        match self {
            ActionKind::Praise => BehaviorType::Praise,
            ActionKind::Attention => BehaviorType::Attention,
        }
    }
}

/// A teacher action aimed at several students of one classroom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub school_id: u64,
    pub class_id: u64,
    pub classroom_id: u64,
    pub teacher_id: u64,
    pub student_ids: Vec<u64>,
}

impl ActionRequest {
    /// Refuse requests whose audit record would not pass ingestion validation.
    fn check(&self, kind: ActionKind) -> Result<(), GuardError> {
        if self.student_ids.is_empty() {
            return Err(GuardError::NoStudents);
        }
        if self.classroom_id == 0 {
            return Err(ValidationError::MissingField("classroom_id").into());
        }
        self.record(kind, &ActionContext::default()).validate()?;
        Ok(())
    }

    fn record(&self, kind: ActionKind, context: &ActionContext) -> TeacherBehavior {
        TeacherBehavior {
            school_id: self.school_id,
            class_id: self.class_id,
            classroom_id: Some(self.classroom_id),
            teacher_id: self.teacher_id,
            behavior_type: kind.behavior_type(),
            communication_session_id: None,
            context: context.to_context(),
            created_at: Utc::now().timestamp(),
        }
    }
}

/// Why a student was not acted on.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("max praise reached")]
    MaxPraiseReached,

    #[error("not praise-worthy")]
    NotPraiseWorthy,

    #[error("store failure: {0}")]
    StoreFailure(String),
}

impl From<StoreError> for Rejection {
    fn from(e: StoreError) -> Self {
        Rejection::StoreFailure(e.to_string())
    }
}

/// Outcome for one student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StudentOutcome {
    Recorded { sub_type: String, message: String },
    Rejected { reason: Rejection },
}

impl StudentOutcome {
    pub fn is_recorded(&self) -> bool {
        matches!(self, StudentOutcome::Recorded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentResult {
    pub student_id: u64,
    #[serde(flatten)]
    pub outcome: StudentOutcome,
}

/// Per-student results of one action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchActionResult {
    pub kind: ActionKind,
    /// False only when every student was rejected.
    pub success: bool,
    pub results: Vec<StudentResult>,
}

impl BatchActionResult {
    fn new(kind: ActionKind, results: Vec<StudentResult>) -> Self {
        Self {
            kind,
            success: results.iter().any(|r| r.outcome.is_recorded()),
            results,
        }
    }

    pub fn recorded(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_recorded()).count()
    }
}

/// Enforces praise/attention limits and records accepted actions.
pub struct ActionGuard {
    store: Arc<dyn BehaviorStore>,
    ttl: Arc<dyn TtlStore>,
    config: GuardConfig,
}

impl ActionGuard {
    pub fn new(store: Arc<dyn BehaviorStore>, ttl: Arc<dyn TtlStore>) -> Self {
        Self::with_config(store, ttl, GuardConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn BehaviorStore>,
        ttl: Arc<dyn TtlStore>,
        config: GuardConfig,
    ) -> Self {
        Self { store, ttl, config }
    }

    async fn aggregates(&self, classroom_id: u64) -> Result<BTreeMap<u64, StudentAggregate>, StoreError> {
        let rows = self.store.get_class_all_behaviors(classroom_id).await?;
        Ok(aggregate_by_student(&rows))
    }

    /// Praise each requested student, at most once per sub-type per window.
    #[instrument(skip(self, request), fields(classroom_id = request.classroom_id, students = request.student_ids.len()))]
    pub async fn praise(&self, request: &ActionRequest) -> Result<BatchActionResult, GuardError> {
        request.check(ActionKind::Praise)?;
        let aggregates = self.aggregates(request.classroom_id).await?;

        let mut results = Vec::with_capacity(request.student_ids.len());
        for &student_id in &request.student_ids {
            let agg = aggregates.get(&student_id).cloned().unwrap_or_else(|| StudentAggregate {
                student_id,
                ..Default::default()
            });
            let outcome = match self.praise_one(request, &agg).await {
                Ok(recorded) => recorded,
                Err(reason) => {
                    debug!(student_id, %reason, "praise rejected");
                    StudentOutcome::Rejected { reason }
                }
            };
            results.push(StudentResult { student_id, outcome });
        }

        let result = BatchActionResult::new(ActionKind::Praise, results);
        info!(recorded = result.recorded(), success = result.success, "praise request handled");
        Ok(result)
    }

    async fn praise_one(
        &self,
        request: &ActionRequest,
        agg: &StudentAggregate,
    ) -> Result<StudentOutcome, Rejection> {
        let classroom_id = request.classroom_id;
        let student_id = agg.student_id;

        let available = self.available_praise_types(classroom_id, student_id).await?;
        if available.is_empty() {
            return Err(Rejection::MaxPraiseReached);
        }
        if !is_praise_worthy(agg) {
            return Err(Rejection::NotPraiseWorthy);
        }
        let praise_type =
            select_praise_type(agg, &available).ok_or(Rejection::MaxPraiseReached)?;

        let context = ActionContext {
            student_id,
            sub_type: praise_type.as_str().to_string(),
            message: praise_type.message(agg),
        };
        self.store
            .save_teacher_behaviors(vec![request.record(ActionKind::Praise, &context)])
            .await?;

        if let Err(e) = self.mark_praised(classroom_id, student_id, praise_type).await {
            error!(student_id, error = %e, "praise recorded but markers not written");
        }

        Ok(StudentOutcome::Recorded {
            sub_type: context.sub_type,
            message: context.message,
        })
    }

    async fn mark_praised(
        &self,
        classroom_id: u64,
        student_id: u64,
        praise_type: PraiseType,
    ) -> Result<(), StoreError> {
        let now = Utc::now().timestamp().to_string();
        let ttl = self.config.marker_ttl;
        self.ttl
            .set(&keys::praise_type(classroom_id, student_id, praise_type), &now, ttl)
            .await?;
        self.ttl.set(&keys::praised(classroom_id, student_id), &now, ttl).await?;
        self.mark_handled(classroom_id, student_id, &now).await
    }

    async fn mark_handled(&self, classroom_id: u64, student_id: u64, now: &str) -> Result<(), StoreError> {
        self.ttl
            .hset(
                &keys::handled(classroom_id),
                &student_id.to_string(),
                now,
                self.config.marker_ttl,
            )
            .await
    }

    /// Send an attention reminder to each requested student. Never capped.
    #[instrument(skip(self, request), fields(classroom_id = request.classroom_id, students = request.student_ids.len()))]
    pub async fn attention(&self, request: &ActionRequest) -> Result<BatchActionResult, GuardError> {
        request.check(ActionKind::Attention)?;
        let aggregates = self.aggregates(request.classroom_id).await?;

        let mut results = Vec::with_capacity(request.student_ids.len());
        for &student_id in &request.student_ids {
            let outcome = match self
                .attention_one(request, student_id, aggregates.get(&student_id))
                .await
            {
                Ok(recorded) => recorded,
                Err(reason) => {
                    warn!(student_id, %reason, "attention not recorded");
                    StudentOutcome::Rejected { reason }
                }
            };
            results.push(StudentResult { student_id, outcome });
        }

        let result = BatchActionResult::new(ActionKind::Attention, results);
        info!(recorded = result.recorded(), success = result.success, "attention request handled");
        Ok(result)
    }

    async fn attention_one(
        &self,
        request: &ActionRequest,
        student_id: u64,
        agg: Option<&StudentAggregate>,
    ) -> Result<StudentOutcome, Rejection> {
        let attention_type = select_attention_type(agg);
        let context = ActionContext {
            student_id,
            sub_type: attention_type.as_str().to_string(),
            message: attention_type.message(agg.unwrap_or(&StudentAggregate::default())),
        };
        self.store
            .save_teacher_behaviors(vec![request.record(ActionKind::Attention, &context)])
            .await?;

        if let Err(e) = self.mark_reminded(request.classroom_id, student_id).await {
            error!(student_id, error = %e, "attention recorded but markers not written");
        }

        Ok(StudentOutcome::Recorded {
            sub_type: context.sub_type,
            message: context.message,
        })
    }

    async fn mark_reminded(&self, classroom_id: u64, student_id: u64) -> Result<(), StoreError> {
        let now = Utc::now().timestamp().to_string();
        self.ttl
            .incr(&keys::reminder(classroom_id, student_id), self.config.marker_ttl)
            .await?;
        self.mark_handled(classroom_id, student_id, &now).await
    }

    /// Praise sub-types not yet used for a student in the current window.
    pub async fn available_praise_types(
        &self,
        classroom_id: u64,
        student_id: u64,
    ) -> Result<Vec<PraiseType>, StoreError> {
        let mut available = Vec::with_capacity(PraiseType::ALL.len());
        for praise_type in PraiseType::ALL {
            let key = keys::praise_type(classroom_id, student_id, praise_type);
            if !self.ttl.key_exists(&key).await? {
                available.push(praise_type);
            }
        }
        Ok(available)
    }

    /// Claim the automated attention window for a student.
    ///
    /// Returns false when a reminder was already suggested inside the window.
    pub async fn try_open_attention_window(
        &self,
        classroom_id: u64,
        student_id: u64,
    ) -> Result<bool, StoreError> {
        self.ttl
            .set_if_absent(
                &keys::attention_window(classroom_id, student_id),
                &Utc::now().timestamp().to_string(),
                self.config.attention_window,
            )
            .await
    }

    /// Attention reminders sent to a student in the current window.
    pub async fn reminder_count(&self, classroom_id: u64, student_id: u64) -> Result<i64, StoreError> {
        match self.ttl.get(&keys::reminder(classroom_id, student_id)).await? {
            Some(value) => value
                .parse()
                .map_err(|_| StoreError::InvalidData(format!("reminder count is not an integer: {value}"))),
            None => Ok(0),
        }
    }

    /// Students acted on in a classroom, with the unix time of the last action.
    pub async fn handled_students(&self, classroom_id: u64) -> Result<BTreeMap<u64, i64>, StoreError> {
        let raw = self.ttl.hget_all(&keys::handled(classroom_id)).await?;
        let mut handled = BTreeMap::new();
        for (student, at) in raw {
            match (student.parse(), at.parse()) {
                (Ok(student_id), Ok(timestamp)) => {
                    handled.insert(student_id, timestamp);
                }
                _ => warn!(classroom_id, %student, "skipping malformed handled entry"),
            }
        }
        Ok(handled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::StudentBehavior;
    use crate::store::{InMemoryBehaviorStore, InMemoryTtlStore};
    use serde_json::json;

    const CLASSROOM: u64 = 30;

    fn request(student_ids: Vec<u64>) -> ActionRequest {
        ActionRequest {
            school_id: 1,
            class_id: 2,
            classroom_id: CLASSROOM,
            teacher_id: 99,
            student_ids,
        }
    }

    fn answer(student_id: u64, created_at: i64, correct: bool) -> StudentBehavior {
        StudentBehavior {
            school_id: 1,
            class_id: 2,
            classroom_id: Some(CLASSROOM),
            student_id,
            behavior_type: BehaviorType::Answer,
            context: json!({"is_correct": correct}),
            created_at,
            ..Default::default()
        }
    }

    fn question(student_id: u64, created_at: i64) -> StudentBehavior {
        StudentBehavior {
            behavior_type: BehaviorType::Question,
            context: json!({}),
            ..answer(student_id, created_at, true)
        }
    }

    async fn setup(rows: Vec<StudentBehavior>) -> (ActionGuard, Arc<InMemoryBehaviorStore>, Arc<InMemoryTtlStore>) {
        let store = Arc::new(InMemoryBehaviorStore::new());
        store.save_student_behaviors(rows).await.unwrap();
        let ttl = Arc::new(InMemoryTtlStore::new());
        let guard = ActionGuard::new(store.clone(), ttl.clone());
        (guard, store, ttl)
    }

    fn streak_rows(student_id: u64) -> Vec<StudentBehavior> {
        (1..=5).map(|t| answer(student_id, t, true)).collect()
    }

    #[tokio::test]
    async fn praise_records_behavior_and_markers() {
        let (guard, store, ttl) = setup(streak_rows(7)).await;

        let result = guard.praise(&request(vec![7])).await.unwrap();

        assert!(result.success);
        assert_eq!(
            result.results[0].outcome,
            StudentOutcome::Recorded {
                sub_type: "correct_streak".to_string(),
                message: "Answered 5 questions correctly in a row".to_string(),
            }
        );

        let rows = store.teacher_behaviors().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].behavior_type, BehaviorType::Praise);
        let context = ActionContext::from_context(&rows[0].context);
        assert_eq!(context.student_id, 7);
        assert_eq!(context.sub_type, "correct_streak");

        assert!(ttl.key_exists(&keys::praised(CLASSROOM, 7)).await.unwrap());
        assert!(
            ttl.key_exists(&keys::praise_type(CLASSROOM, 7, PraiseType::CorrectStreak))
                .await
                .unwrap()
        );
        assert!(guard.handled_students(CLASSROOM).await.unwrap().contains_key(&7));
    }

    #[tokio::test]
    async fn repeated_praise_moves_to_next_sub_type_then_caps() {
        let (guard, _store, _ttl) = setup(streak_rows(7)).await;

        let mut sub_types = Vec::new();
        for _ in 0..3 {
            let result = guard.praise(&request(vec![7])).await.unwrap();
            match &result.results[0].outcome {
                StudentOutcome::Recorded { sub_type, .. } => sub_types.push(sub_type.clone()),
                other => panic!("expected praise, got {other:?}"),
            }
        }
        assert_eq!(sub_types, vec!["correct_streak", "early_learn", "question"]);

        let fourth = guard.praise(&request(vec![7])).await.unwrap();
        assert!(!fourth.success);
        assert_eq!(
            fourth.results[0].outcome,
            StudentOutcome::Rejected {
                reason: Rejection::MaxPraiseReached
            }
        );
    }

    #[tokio::test]
    async fn exhausted_student_is_rejected_regardless_of_behavior() {
        let (guard, store, ttl) = setup(vec![]).await;
        for praise_type in PraiseType::ALL {
            ttl.set(&keys::praise_type(CLASSROOM, 3, praise_type), "1", MARKER_TTL)
                .await
                .unwrap();
        }

        let result = guard.praise(&request(vec![3])).await.unwrap();
        assert_eq!(
            result.results[0].outcome,
            StudentOutcome::Rejected {
                reason: Rejection::MaxPraiseReached
            }
        );
        assert!(store.teacher_behaviors().await.is_empty());
    }

    #[tokio::test]
    async fn unworthy_student_is_rejected() {
        let (guard, store, _ttl) = setup(vec![answer(4, 1, false)]).await;

        let result = guard.praise(&request(vec![4])).await.unwrap();

        assert!(!result.success);
        assert_eq!(
            result.results[0].outcome,
            StudentOutcome::Rejected {
                reason: Rejection::NotPraiseWorthy
            }
        );
        assert!(store.teacher_behaviors().await.is_empty());
    }

    #[tokio::test]
    async fn partial_success_reports_each_student() {
        let mut rows = streak_rows(1);
        rows.push(question(2, 10));
        let (guard, _store, _ttl) = setup(rows).await;

        let result = guard.praise(&request(vec![1, 2, 3])).await.unwrap();

        assert!(result.success);
        assert_eq!(result.recorded(), 2);
        assert_eq!(result.results[2].student_id, 3);
        assert!(!result.results[2].outcome.is_recorded());
    }

    #[tokio::test(start_paused = true)]
    async fn praise_markers_expire_with_the_window() {
        let (guard, _store, _ttl) = setup(streak_rows(7)).await;
        for _ in 0..3 {
            guard.praise(&request(vec![7])).await.unwrap();
        }
        assert!(guard.available_praise_types(CLASSROOM, 7).await.unwrap().is_empty());

        tokio::time::advance(MARKER_TTL).await;

        assert_eq!(
            guard.available_praise_types(CLASSROOM, 7).await.unwrap(),
            PraiseType::ALL.to_vec()
        );
    }

    #[tokio::test]
    async fn attention_is_never_capped() {
        let (guard, store, _ttl) = setup(vec![]).await;

        for _ in 0..4 {
            let result = guard.attention(&request(vec![5])).await.unwrap();
            assert!(result.success);
        }

        assert_eq!(guard.reminder_count(CLASSROOM, 5).await.unwrap(), 4);
        let rows = store.teacher_behaviors().await;
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.behavior_type == BehaviorType::Attention));
        assert_eq!(ActionContext::from_context(&rows[0].context).sub_type, "page_switch");
    }

    #[tokio::test(start_paused = true)]
    async fn attention_window_suppresses_bursts() {
        let (guard, _store, _ttl) = setup(vec![]).await;

        assert!(guard.try_open_attention_window(CLASSROOM, 5).await.unwrap());
        assert!(!guard.try_open_attention_window(CLASSROOM, 5).await.unwrap());

        tokio::time::advance(ATTENTION_WINDOW).await;
        assert!(guard.try_open_attention_window(CLASSROOM, 5).await.unwrap());
    }

    #[tokio::test]
    async fn empty_requests_are_refused() {
        let (guard, _store, _ttl) = setup(vec![]).await;
        assert!(matches!(
            guard.praise(&request(vec![])).await,
            Err(GuardError::NoStudents)
        ));

        let mut missing_teacher = request(vec![1]);
        missing_teacher.teacher_id = 0;
        assert!(matches!(
            guard.attention(&missing_teacher).await,
            Err(GuardError::Invalid(ValidationError::MissingField("teacher_id")))
        ));
    }

    #[tokio::test]
    async fn requests_without_school_or_class_write_nothing() {
        let (guard, store, ttl) = setup(vec![]).await;

        let mut no_school = request(vec![1]);
        no_school.school_id = 0;
        assert!(matches!(
            guard.attention(&no_school).await,
            Err(GuardError::Invalid(ValidationError::MissingField("school_id")))
        ));

        let mut no_class = request(vec![1]);
        no_class.class_id = 0;
        assert!(matches!(
            guard.praise(&no_class).await,
            Err(GuardError::Invalid(ValidationError::MissingField("class_id")))
        ));

        assert!(store.teacher_behaviors().await.is_empty());
        assert_eq!(guard.reminder_count(CLASSROOM, 1).await.unwrap(), 0);
        assert!(ttl.hget_all(&keys::handled(CLASSROOM)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recorded_actions_pass_ingestion_validation() {
        let (guard, store, _ttl) = setup(vec![]).await;

        let result = guard.attention(&request(vec![1, 2])).await.unwrap();
        assert!(result.success);

        let rows = store.teacher_behaviors().await;
        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert!(row.validate().is_ok(), "{row:?}");
        }
    }

    #[test]
    fn keys_are_scoped_by_classroom_and_student() {
        assert_eq!(keys::handled(3), "classpulse:classroom:3:handled");
        assert_eq!(
            keys::praise_type(3, 4, PraiseType::EarlyLearn),
            "classpulse:classroom:3:student:4:praise:early_learn"
        );
        assert_ne!(keys::reminder(3, 4), keys::reminder(4, 3));
    }
}
