//! Shared types for the messaging core.

pub mod errors;
pub mod events;

pub use errors::{ErrorKind, MessagingError, MessagingResult};
pub use events::{Delta, NotificationSnapshot, ResyncBatch};
