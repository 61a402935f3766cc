//! Error types for the database layer

use thiserror::Error;

/// SQLite primary result codes that mean "try again later".
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
/// SQLite primary result codes for a store that cannot be reached.
const SQLITE_IOERR: i32 = 10;
const SQLITE_CANTOPEN: i32 = 14;

/// General database error
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error("Database timed out: {0}")]
    Timeout(String),

    #[error("Database query error: {0}")]
    QueryError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Duplicate entity: {0}")]
    Duplicate(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DatabaseError {
    /// Whether the failure is transient and the operation may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DatabaseError::Unavailable(_) | DatabaseError::Timeout(_) | DatabaseError::ConnectionError(_)
        )
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::PoolTimedOut => DatabaseError::Timeout(error.to_string()),
            sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_) => DatabaseError::Unavailable(error.to_string()),
            sqlx::Error::RowNotFound => DatabaseError::NotFound(error.to_string()),
            sqlx::Error::Database(db_error) => {
                // sqlite reports extended codes; the low byte is the primary code
                let primary = db_error
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);

                if db_error.is_unique_violation() {
                    DatabaseError::Duplicate(error.to_string())
                } else if matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED)) {
                    DatabaseError::Timeout(error.to_string())
                } else if matches!(primary, Some(SQLITE_IOERR) | Some(SQLITE_CANTOPEN)) {
                    DatabaseError::Unavailable(error.to_string())
                } else {
                    DatabaseError::QueryError(error.to_string())
                }
            }
            _ => DatabaseError::QueryError(error.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationError(error.to_string())
    }
}

impl From<serde_json::Error> for DatabaseError {
    fn from(error: serde_json::Error) -> Self {
        DatabaseError::SerializationError(error.to_string())
    }
}
