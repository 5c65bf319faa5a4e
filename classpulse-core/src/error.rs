//! Error types for classpulse-core

use thiserror::Error;

use crate::communication::UserType;
use crate::store::StoreError;

/// Top-level error type for classpulse-core
#[derive(Error, Debug)]
pub enum ClasspulseError {
    #[error("Envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Guard error: {0}")]
    Guard(#[from] GuardError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors decoding or encoding an event envelope
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unknown event kind: {0}")]
    UnknownKind(String),

    #[error("Payload is not valid UTF-8 JSON")]
    InvalidPayload,
}

/// A record failed its required-field checks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("User type {0} is not allowed here")]
    ForbiddenUserType(UserType),
}

/// Errors related to communication session lifecycle
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session closed: {0}")]
    Closed(String),

    #[error("User type {0} cannot open a session")]
    ForbiddenOpener(UserType),

    #[error("Invalid session: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that stop an action request before any student is evaluated
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("Action request names no students")]
    NoStudents,

    #[error("Invalid action request: {0}")]
    Invalid(#[from] ValidationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_unknown_kind_displays_correctly() {
        let error = EnvelopeError::UnknownKind("grades".to_string());
        assert!(error.to_string().contains("Unknown event kind"));
        assert!(error.to_string().contains("grades"));
    }

    #[test]
    fn validation_missing_field_displays_correctly() {
        let error = ValidationError::MissingField("school_id");
        assert_eq!(error.to_string(), "Missing required field: school_id");
    }

    #[test]
    fn session_forbidden_opener_displays_correctly() {
        let error = SessionError::ForbiddenOpener(UserType::Ai);
        assert_eq!(error.to_string(), "User type ai cannot open a session");
    }

    #[test]
    fn classpulse_error_converts_from_session_error() {
        let error: ClasspulseError = SessionError::NotFound("s-1".to_string()).into();
        assert!(matches!(error, ClasspulseError::Session(_)));
        assert!(error.to_string().contains("Session error"));
    }

    #[test]
    fn guard_error_wraps_store_failures() {
        let error: GuardError = StoreError::Unavailable("ttl".to_string()).into();
        assert_eq!(error.to_string(), "Store error: store unavailable: ttl");
    }

    #[test]
    fn session_error_converts_from_validation_error() {
        let error: SessionError = ValidationError::MissingField("user_id").into();
        assert!(matches!(error, SessionError::Invalid(_)));
    }
}
