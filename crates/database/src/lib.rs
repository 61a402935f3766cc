//! Courier Database Crate
//!
//! Storage for the messaging core: connection management, embedded
//! migrations, entities and repositories over SQLite.

use courier_config::DatabaseConfig;
use sqlx::SqlitePool;

pub mod connection;
pub mod entities;
pub mod migrations;
pub mod repos;
pub mod types;

pub use connection::{prepare_database, DatabaseConnection, StoreMode};
pub use migrations::run_migrations;

pub use repos::{
    AppendOutcome, ConversationRepository, MessageRepository, NotificationRepository,
    ParticipantRepository, ReadMark, UnreadCounters,
};

pub use entities::{
    format_timestamp, Attachment, Conversation, ConversationFilter, ConversationFlags,
    EventPriority, LastSeen, Message, MessageType, NewMessage, NewNotification, Notification,
    NotificationStatus, Participant, ParticipantRole, Priority, Side, Urgency,
};

pub use types::{DatabaseError, DatabaseResult};

pub use sqlx::Pool;

/// Open the store in the requested mode and apply migrations.
pub async fn initialize_database(config: &DatabaseConfig, mode: StoreMode) -> DatabaseResult<SqlitePool> {
    let pool = prepare_database(config, mode).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
