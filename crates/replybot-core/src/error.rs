use thiserror::Error;

/// Application-wide error types for reply-bot.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed (probing a link or polling a feed).
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Missing or malformed configuration. Fatal at startup.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A normalized record could not be built from the event.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A producer failed (stream disconnect, bad payload, ...).
    #[error("Source error: {0}")]
    SourceError(String),

    /// The sink rejected an append.
    #[error("Sink error: {0}")]
    SinkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true for errors that only make sense at startup.
    ///
    /// The CLI aborts on these; every other kind is logged and the
    /// pipeline keeps running.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::ConfigError(_))
    }
}
