//! Error types for the messaging core.

use courier_database::DatabaseError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for messaging operations
pub type MessagingResult<T> = Result<T, MessagingError>;

/// Main error type for the messaging core
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MessagingError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Unknown participant: {id}")]
    UnknownParticipant { id: String },

    #[error("Forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("Reply target {reply_to_id} is not a message of this conversation")]
    InvalidReply { reply_to_id: String },

    #[error("A participant cannot message themselves")]
    SelfMessage,

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Stable, serialisable classification of a [`MessagingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnknownParticipant,
    Forbidden,
    InvalidReply,
    SelfMessage,
    StoreUnavailable,
    Timeout,
    Conflict,
    Validation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::UnknownParticipant => "unknown_participant",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidReply => "invalid_reply",
            ErrorKind::SelfMessage => "self_message",
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Validation => "validation",
            ErrorKind::Internal => "internal",
        }
    }
}

impl MessagingError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    pub fn unknown_participant(id: impl Into<String>) -> Self {
        Self::UnknownParticipant { id: id.into() }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden { reason: reason.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout { operation: operation.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MessagingError::NotFound { .. } => ErrorKind::NotFound,
            MessagingError::UnknownParticipant { .. } => ErrorKind::UnknownParticipant,
            MessagingError::Forbidden { .. } => ErrorKind::Forbidden,
            MessagingError::InvalidReply { .. } => ErrorKind::InvalidReply,
            MessagingError::SelfMessage => ErrorKind::SelfMessage,
            MessagingError::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            MessagingError::Timeout { .. } => ErrorKind::Timeout,
            MessagingError::Conflict { .. } => ErrorKind::Conflict,
            MessagingError::Validation { .. } => ErrorKind::Validation,
            MessagingError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Only transient store failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MessagingError::Timeout { .. } | MessagingError::StoreUnavailable { .. }
        )
    }
}

impl From<DatabaseError> for MessagingError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::ConnectionError(message) | DatabaseError::Unavailable(message) => {
                MessagingError::StoreUnavailable { message }
            }
            DatabaseError::Timeout(message) => MessagingError::Timeout { operation: message },
            DatabaseError::NotFound(id) => MessagingError::NotFound { entity: "record", id },
            DatabaseError::Duplicate(message) => MessagingError::Conflict { message },
            DatabaseError::ValidationError(message) => MessagingError::Validation { message },
            DatabaseError::QueryError(message)
            | DatabaseError::MigrationError(message)
            | DatabaseError::SerializationError(message) => MessagingError::Internal { message },
        }
    }
}
