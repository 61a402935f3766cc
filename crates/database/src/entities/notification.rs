//! Notification entity definitions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// Event kind, e.g. `report_submitted`.
    pub kind: String,
    pub title: String,
    pub message: String,
    pub subject_ref: Option<String>,
    pub priority: EventPriority,
    pub urgency: Urgency,
    pub status: NotificationStatus,
    pub created_at: String,
    pub read_at: Option<String>,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        self.status == NotificationStatus::Unread
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
    Critical,
}

impl EventPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventPriority::Low => "low",
            EventPriority::Normal => "normal",
            EventPriority::High => "high",
            EventPriority::Urgent => "urgent",
            EventPriority::Critical => "critical",
        }
    }

    pub fn urgency(&self) -> Urgency {
        match self {
            EventPriority::High | EventPriority::Urgent | EventPriority::Critical => Urgency::High,
            EventPriority::Low | EventPriority::Normal => Urgency::Normal,
        }
    }
}

impl From<&str> for EventPriority {
    fn from(s: &str) -> Self {
        match s {
            "low" => EventPriority::Low,
            "high" => EventPriority::High,
            "urgent" => EventPriority::Urgent,
            "critical" => EventPriority::Critical,
            _ => EventPriority::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    #[default]
    Normal,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Normal => "normal",
            Urgency::High => "high",
        }
    }
}

impl From<&str> for Urgency {
    fn from(s: &str) -> Self {
        match s {
            "high" => Urgency::High,
            _ => Urgency::Normal,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
        }
    }
}

impl From<&str> for NotificationStatus {
    fn from(s: &str) -> Self {
        match s {
            "read" => NotificationStatus::Read,
            _ => NotificationStatus::Unread,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub subject_ref: Option<String>,
    pub priority: EventPriority,
}
