//! Required-field checks run before persistence.

use tracing::warn;

use crate::behavior::{BehaviorRecord, StudentBehavior, TeacherBehavior};
use crate::communication::{CommunicationMessage, OpenSession, UserType};
use crate::error::ValidationError;

/// A record that can be checked before it is stored.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

fn require(present: bool, field: &'static str) -> Result<(), ValidationError> {
    if present {
        Ok(())
    } else {
        Err(ValidationError::MissingField(field))
    }
}

fn require_human(user_type: UserType) -> Result<(), ValidationError> {
    if user_type.is_human() {
        Ok(())
    } else {
        Err(ValidationError::ForbiddenUserType(user_type))
    }
}

fn validate_behavior<R: BehaviorRecord>(record: &R) -> Result<(), ValidationError> {
    require(record.school_id() != 0, "school_id")?;
    require(record.class_id() != 0, "class_id")?;
    require(record.actor_id() != 0, record.actor_field())?;
    require(!record.behavior_type().is_empty(), "behavior_type")?;
    require(record.created_at() != 0, "created_at")
}

impl Validate for TeacherBehavior {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_behavior(self)
    }
}

impl Validate for StudentBehavior {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_behavior(self)
    }
}

impl Validate for CommunicationMessage {
    fn validate(&self) -> Result<(), ValidationError> {
        require(!self.session_id.is_empty(), "session_id")?;
        require_human(self.user_type)?;
        require(self.user_id != 0, "user_id")?;
        require(!self.content.is_empty(), "content")?;
        require(!self.message_type.is_empty(), "message_type")
    }
}

impl Validate for OpenSession {
    fn validate(&self) -> Result<(), ValidationError> {
        require_human(self.user_type)?;
        require(self.user_id != 0, "user_id")
    }
}

/// Keep the records that pass validation, logging and dropping the rest.
pub fn retain_valid<T: Validate>(records: Vec<T>, kind: &str) -> Vec<T> {
    let total = records.len();
    let valid: Vec<T> = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match record.validate() {
            Ok(()) => Some(record),
            Err(e) => {
                warn!(kind, index, error = %e, "dropping invalid record");
                None
            }
        })
        .collect();

    if valid.len() < total {
        warn!(kind, dropped = total - valid.len(), kept = valid.len(), "validation dropped records");
    }
    valid
}
