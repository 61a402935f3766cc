//! Database repository implementations

pub mod conversation_repository;
pub mod counters;
pub mod message_repository;
pub mod notification_repository;
pub mod participant_repository;

pub use conversation_repository::ConversationRepository;
pub use counters::UnreadCounters;
pub use message_repository::{AppendOutcome, MessageRepository, ReadMark};
pub use notification_repository::NotificationRepository;
pub use participant_repository::ParticipantRepository;
