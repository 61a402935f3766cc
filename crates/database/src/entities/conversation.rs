//! Conversation entity definitions

use super::Priority;
use serde::{Deserialize, Serialize};

/// A durable channel between exactly two participants.
///
/// The pair is stored canonically: `participant_a` is always the
/// lexicographically smaller id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<String>,
    pub unread_count_a: i64,
    pub unread_count_b: i64,
    pub is_starred: bool,
    pub is_archived: bool,
    pub is_active: bool,
    pub priority: Priority,
    pub created_at: String,
    pub updated_at: String,
}

impl Conversation {
    pub fn involves(&self, participant_id: &str) -> bool {
        self.side_of(participant_id).is_some()
    }

    pub fn side_of(&self, participant_id: &str) -> Option<Side> {
        if self.participant_a == participant_id {
            Some(Side::A)
        } else if self.participant_b == participant_id {
            Some(Side::B)
        } else {
            None
        }
    }

    /// The other member of the pair, if `participant_id` is a member.
    pub fn counterpart(&self, participant_id: &str) -> Option<&str> {
        match self.side_of(participant_id)? {
            Side::A => Some(&self.participant_b),
            Side::B => Some(&self.participant_a),
        }
    }

    pub fn unread_for(&self, participant_id: &str) -> Option<i64> {
        match self.side_of(participant_id)? {
            Side::A => Some(self.unread_count_a),
            Side::B => Some(self.unread_count_b),
        }
    }

    /// Whether `{first, second}` is exactly this conversation's pair.
    pub fn has_pair(&self, first: &str, second: &str) -> bool {
        let (a, b) = canonical_pair(first, second);
        self.participant_a == a && self.participant_b == b
    }

    pub fn participants(&self) -> [&str; 2] {
        [&self.participant_a, &self.participant_b]
    }
}

/// Sort a participant pair into storage order.
pub fn canonical_pair<'a>(first: &'a str, second: &'a str) -> (&'a str, &'a str) {
    if first <= second {
        (first, second)
    } else {
        (second, first)
    }
}

/// Which half of a conversation row a participant occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn unread_column(&self) -> &'static str {
        match self {
            Side::A => "unread_count_a",
            Side::B => "unread_count_b",
        }
    }

    pub fn participant_column(&self) -> &'static str {
        match self {
            Side::A => "participant_a",
            Side::B => "participant_b",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationFilter {
    #[default]
    All,
    Unread,
    Starred,
    Archived,
    Urgent,
}

impl ConversationFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationFilter::All => "all",
            ConversationFilter::Unread => "unread",
            ConversationFilter::Starred => "starred",
            ConversationFilter::Archived => "archived",
            ConversationFilter::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for ConversationFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ConversationFilter::All),
            "unread" => Ok(ConversationFilter::Unread),
            "starred" => Ok(ConversationFilter::Starred),
            "archived" => Ok(ConversationFilter::Archived),
            "urgent" => Ok(ConversationFilter::Urgent),
            other => Err(format!("unknown conversation filter '{other}'")),
        }
    }
}

/// Partial flag update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationFlags {
    #[serde(default)]
    pub starred: Option<bool>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl ConversationFlags {
    pub fn is_empty(&self) -> bool {
        self.starred.is_none() && self.archived.is_none() && self.priority.is_none()
    }
}
