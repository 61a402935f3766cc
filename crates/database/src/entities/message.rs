//! Message entity definitions

use super::Priority;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Characters of message text carried into a conversation preview.
pub const PREVIEW_CHARS: usize = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    /// Store-assigned sequence, the tie-breaker after `created_at`.
    pub seq: i64,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub message_type: MessageType,
    pub priority: Priority,
    pub is_read: bool,
    pub is_admin_origin: bool,
    pub reply_to_id: Option<String>,
    pub reactions: BTreeMap<String, i64>,
    pub star_count: i64,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
}

impl Message {
    /// Position of the message within its conversation.
    pub fn order_key(&self) -> (String, i64) {
        (self.created_at.clone(), self.seq)
    }
}

/// Opaque attachment reference; the store never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub url: String,
    pub size_bytes: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
    Urgent,
    Scheduled,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::System => "system",
            MessageType::Urgent => "urgent",
            MessageType::Scheduled => "scheduled",
        }
    }
}

impl From<&str> for MessageType {
    fn from(s: &str) -> Self {
        match s {
            "image" => MessageType::Image,
            "file" => MessageType::File,
            "system" => MessageType::System,
            "urgent" => MessageType::Urgent,
            "scheduled" => MessageType::Scheduled,
            _ => MessageType::Text,
        }
    }
}

/// A validated message ready to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub message_type: MessageType,
    pub priority: Priority,
    pub is_admin_origin: bool,
    pub reply_to_id: Option<String>,
}

impl NewMessage {
    /// Conversation preview: the start of the text, or the first attachment's name.
    pub fn preview(&self) -> String {
        preview_of(&self.content, &self.attachments)
    }
}

/// The start of the text, or the first attachment's name for attachment-only messages.
pub fn preview_of(content: &str, attachments: &[Attachment]) -> String {
    let text = content.trim();
    if text.is_empty() {
        if let Some(attachment) = attachments.first() {
            return format!("📎 {}", attachment.name);
        }
    }
    text.chars().take(PREVIEW_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(content: &str, attachments: Vec<Attachment>) -> NewMessage {
        NewMessage {
            conversation_id: "c1".into(),
            sender_id: "alice".into(),
            receiver_id: "bob".into(),
            content: content.into(),
            attachments,
            message_type: MessageType::Text,
            priority: Priority::Normal,
            is_admin_origin: false,
            reply_to_id: None,
        }
    }

    #[test]
    fn preview_truncates_on_character_boundaries() {
        let long = "é".repeat(200);
        let preview = draft(&long, vec![]).preview();
        assert_eq!(preview.chars().count(), PREVIEW_CHARS);
    }

    #[test]
    fn attachment_only_preview_names_the_file() {
        let attachment = Attachment {
            id: "a1".into(),
            name: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            url: "files/report.pdf".into(),
            size_bytes: 1024,
        };
        assert_eq!(draft("", vec![attachment]).preview(), "📎 report.pdf");
    }

    #[test]
    fn message_types_parse_with_text_fallback() {
        assert_eq!(MessageType::from("scheduled"), MessageType::Scheduled);
        assert_eq!(MessageType::from("sticker"), MessageType::Text);
    }
}
