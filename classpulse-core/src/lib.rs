//! classpulse-core: classroom behavior telemetry and pedagogical signals
//!
//! This crate provides the domain half of classpulse:
//!
//! - **Event envelopes** - [`EventEnvelope`] wraps every queue payload with its kind and schema version
//! - **Records** - [`TeacherBehavior`], [`StudentBehavior`], [`CommunicationSession`] and
//!   [`CommunicationMessage`], with lazily decoded context views
//! - **Storage** - [`BehaviorStore`] and [`TtlStore`] traits with in-memory and libSQL backends
//! - **Validation** - [`Validate`] for per-record required-field checks
//! - **Scoring** - praise and attention eligibility plus sub-type selection over a
//!   [`StudentAggregate`]
//! - **Action guard** - [`ActionGuard`] enforces per-student rate limits and dedup markers
//! - **Sessions** - [`SessionManager`] drives the open/close lifecycle of communication sessions
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────────┐
//! │ EventEnvelope│──►│    Validate     │──►│  BehaviorStore   │
//! └──────────────┘   └─────────────────┘   └────────┬─────────┘
//!                                                   │ rows
//!                    ┌─────────────────┐   ┌────────▼─────────┐
//!                    │   ActionGuard   │◄──│ StudentAggregate │
//!                    │  (TtlStore)     │   │   + scoring      │
//!                    └─────────────────┘   └──────────────────┘
//! ```

pub mod aggregate;
pub mod behavior;
pub mod communication;
pub mod context;
pub mod envelope;
pub mod error;
pub mod guard;
pub mod scoring;
pub mod session;
pub mod signals;
pub mod store;
pub mod validate;

// Re-export key types for convenience
pub use aggregate::{StudentAggregate, aggregate_by_student};
pub use behavior::{BehaviorRecord, BehaviorType, StudentBehavior, TeacherBehavior};
pub use communication::{
    CommunicationEvent, CommunicationMessage, CommunicationSession, OpenSession, Participants,
    SessionType, UserType,
};
pub use context::{
    ActionContext, AnswerContext, BrowseAction, BrowseContext, LearningContext, LearningType,
    VideoStatus,
};
pub use envelope::{EventEnvelope, EventKind, SCHEMA_VERSION};
pub use error::{ClasspulseError, EnvelopeError, GuardError, SessionError, ValidationError};
pub use guard::{
    ActionGuard, ActionKind, ActionRequest, BatchActionResult, GuardConfig, Rejection,
    StudentOutcome, StudentResult,
};
pub use scoring::{AttentionType, PraiseType};
pub use session::{SessionConfig, SessionManager};
pub use signals::{AttentionCandidate, ClassroomReport, ClassroomSignals, PraiseCandidate};
pub use store::{
    BehaviorStore, InMemoryBehaviorStore, InMemoryTtlStore, TursoBehaviorStore, Page,
    SessionUpdate, StoreError, TtlStore,
};
pub use validate::Validate;
