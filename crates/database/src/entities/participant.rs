//! Participant entity definitions

use serde::{Deserialize, Serialize};

/// A directory entry. The messaging core reads these and never writes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub role: ParticipantRole,
    pub online: bool,
    pub last_seen: LastSeen,
}

impl Participant {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
            online: false,
            last_seen: LastSeen::Never,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, ParticipantRole::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    Operator,
    User,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Admin => "admin",
            ParticipantRole::Operator => "operator",
            ParticipantRole::User => "user",
        }
    }
}

impl From<&str> for ParticipantRole {
    fn from(s: &str) -> Self {
        match s {
            "admin" => ParticipantRole::Admin,
            "operator" => ParticipantRole::Operator,
            _ => ParticipantRole::User,
        }
    }
}

/// Best-effort presence: either the `"online"` sentinel or the last time seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum LastSeen {
    Online,
    At(String),
    Never,
}

impl LastSeen {
    pub const ONLINE_SENTINEL: &'static str = "online";

    pub fn from_row(online: bool, last_seen_at: Option<String>) -> Self {
        match (online, last_seen_at) {
            (true, _) => LastSeen::Online,
            (false, Some(at)) => LastSeen::At(at),
            (false, None) => LastSeen::Never,
        }
    }
}

impl From<Option<String>> for LastSeen {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(value) if value == Self::ONLINE_SENTINEL => LastSeen::Online,
            Some(at) => LastSeen::At(at),
            None => LastSeen::Never,
        }
    }
}

impl From<LastSeen> for Option<String> {
    fn from(value: LastSeen) -> Self {
        match value {
            LastSeen::Online => Some(LastSeen::ONLINE_SENTINEL.to_string()),
            LastSeen::At(at) => Some(at),
            LastSeen::Never => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_seen_serializes_online_sentinel() {
        let json = serde_json::to_string(&LastSeen::Online).unwrap();
        assert_eq!(json, "\"online\"");

        let parsed: LastSeen = serde_json::from_str("\"2024-05-01T10:00:00.000000Z\"").unwrap();
        assert_eq!(parsed, LastSeen::At("2024-05-01T10:00:00.000000Z".to_string()));

        let never: LastSeen = serde_json::from_str("null").unwrap();
        assert_eq!(never, LastSeen::Never);
    }

    #[test]
    fn online_flag_wins_over_stored_timestamp() {
        let seen = LastSeen::from_row(true, Some("2024-05-01T10:00:00.000000Z".to_string()));
        assert_eq!(seen, LastSeen::Online);
    }

    #[test]
    fn unknown_roles_fall_back_to_user() {
        assert_eq!(ParticipantRole::from("admin"), ParticipantRole::Admin);
        assert_eq!(ParticipantRole::from("farmer"), ParticipantRole::User);
    }
}
