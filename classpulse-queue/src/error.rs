//! Error types for queue operations.

/// Error type for queue operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested topic is not registered.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Seek target is past the end of the log.
    #[error("offset {offset} out of range (high water mark {high_water_mark})")]
    OffsetOutOfRange { offset: u64, high_water_mark: u64 },

    /// Message could not be serialized for the log.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;
