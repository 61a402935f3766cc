//! Domain entities for the database layer
//!
//! Entity definitions shared by the repositories and the messaging services.

pub mod conversation;
pub mod message;
pub mod notification;
pub mod participant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use conversation::{Conversation, ConversationFilter, ConversationFlags, Side};
pub use message::{Attachment, Message, MessageType, NewMessage};
pub use notification::{
    EventPriority, NewNotification, Notification, NotificationStatus, Urgency,
};
pub use participant::{LastSeen, Participant, ParticipantRole};

/// Render a timestamp the way every table stores it.
///
/// Fixed microsecond precision keeps lexical and chronological order identical,
/// which the `(created_at, seq)` orderings depend on.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Priority shared by conversations and messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl From<&str> for Priority {
    fn from(s: &str) -> Self {
        match s {
            "low" => Priority::Low,
            "high" => Priority::High,
            "urgent" => Priority::Urgent,
            _ => Priority::Normal,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_have_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::microseconds(1_500);

        assert_eq!(format_timestamp(whole), "2024-05-01T10:00:00.000000Z");
        assert_eq!(format_timestamp(fractional), "2024-05-01T10:00:00.001500Z");
        assert!(format_timestamp(whole) < format_timestamp(fractional));
    }

    #[test]
    fn priority_round_trips_through_strings() {
        assert_eq!(Priority::from("urgent"), Priority::Urgent);
        assert_eq!(Priority::from("bogus"), Priority::Normal);
        assert_eq!(Priority::High.to_string(), "high");
        assert!(Priority::Urgent > Priority::Low);
    }
}
