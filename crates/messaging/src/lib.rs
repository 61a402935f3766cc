//! # Courier Messaging Crate
//!
//! The conversational messaging and notification core: two-party
//! conversations, ordered messages, unread counters, notifications derived
//! from domain events, realtime fan-out and broadcast sends.
//!
//! ## Architecture
//!
//! - **Services**: directory adapters, conversation registry, message store,
//!   notification dispatcher, broadcast coordinator
//! - **Realtime**: fan-out hub, subscriptions, client cache, notification poller
//! - **Types**: errors and deltas
//!
//! ## Usage
//!
//! ```rust,no_run
//! use courier_config::MessagingConfig;
//! use courier_messaging::{MessagingCore, OutgoingMessage, SqlDirectory};
//!
//! # async fn run(pool: sqlx::SqlitePool) -> courier_messaging::MessagingResult<()> {
//! let core = MessagingCore::new(pool.clone(), SqlDirectory::new(pool), &MessagingConfig::default());
//! let conversation = core.registry().get_or_create("alice", "bob").await?;
//! core.messages()
//!     .append(OutgoingMessage::text(&conversation.id, "alice", "bob", "Hello"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod core;
pub mod realtime;
pub mod services;
pub mod types;
pub mod utils;

pub use clock::{Clock, ManualClock, SystemClock};
pub use core::MessagingCore;
pub use realtime::{ClientCache, FanoutHub, NotificationPoller, Subscription, SubscriptionState, Topic};
pub use services::{
    BroadcastCoordinator, BroadcastRequest, BroadcastSettings, BroadcastSummary, ConversationRegistry,
    Delivery, DomainEvent, FailedDelivery, MessageStore, NotificationDispatcher, OutgoingMessage,
    ParticipantDirectory, SqlDirectory, StaticDirectory,
};
pub use types::{Delta, ErrorKind, MessagingError, MessagingResult, NotificationSnapshot, ResyncBatch};
