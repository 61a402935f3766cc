//! Business logic layer of the messaging core.

pub mod broadcast;
pub mod conversation_registry;
pub mod deadline;
pub mod directory;
pub mod message_store;
pub mod notification_dispatcher;

pub use broadcast::{
    BroadcastCoordinator, BroadcastRequest, BroadcastSettings, BroadcastSummary, Delivery,
    FailedDelivery,
};
pub use conversation_registry::ConversationRegistry;
pub use deadline::with_deadline;
pub use directory::{ParticipantDirectory, SqlDirectory, StaticDirectory};
pub use message_store::{MessageStore, OutgoingMessage};
pub use notification_dispatcher::{DomainEvent, NotificationDispatcher};
