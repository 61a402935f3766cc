//! Input validation helpers.

use crate::types::{MessagingError, MessagingResult};
use courier_database::Attachment;

/// Longest accepted message text, in characters.
pub const MAX_CONTENT_CHARS: usize = 10_000;
/// Longest accepted reaction, in characters.
pub const MAX_EMOJI_CHARS: usize = 16;

/// A message needs text or at least one attachment.
pub fn validate_content(content: &str, attachments: &[Attachment]) -> MessagingResult<()> {
    if content.trim().is_empty() && attachments.is_empty() {
        return Err(MessagingError::validation(
            "message needs text or at least one attachment",
        ));
    }

    let length = content.chars().count();
    if length > MAX_CONTENT_CHARS {
        return Err(MessagingError::validation(format!(
            "message text is {length} characters, the limit is {MAX_CONTENT_CHARS}"
        )));
    }

    for attachment in attachments {
        validate_attachment(attachment)?;
    }

    Ok(())
}

fn validate_attachment(attachment: &Attachment) -> MessagingResult<()> {
    for (field, value) in [
        ("id", &attachment.id),
        ("name", &attachment.name),
        ("mime_type", &attachment.mime_type),
        ("url", &attachment.url),
    ] {
        if value.trim().is_empty() {
            return Err(MessagingError::validation(format!(
                "attachment {field} must not be empty"
            )));
        }
    }

    if attachment.size_bytes < 0 {
        return Err(MessagingError::validation("attachment size must not be negative"));
    }

    Ok(())
}

pub fn require_non_empty(field: &str, value: &str) -> MessagingResult<()> {
    if value.trim().is_empty() {
        return Err(MessagingError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

pub fn validate_emoji(emoji: &str) -> MessagingResult<()> {
    require_non_empty("emoji", emoji)?;
    if emoji.chars().count() > MAX_EMOJI_CHARS {
        return Err(MessagingError::validation("emoji is too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str, size_bytes: i64) -> Attachment {
        Attachment {
            id: "a1".into(),
            name: name.into(),
            mime_type: "image/png".into(),
            url: "files/a1".into(),
            size_bytes,
        }
    }

    #[test]
    fn empty_messages_are_rejected() {
        assert!(validate_content("   ", &[]).is_err());
        assert!(validate_content("", &[attachment("photo.png", 10)]).is_ok());
        assert!(validate_content("hello", &[]).is_ok());
    }

    #[test]
    fn content_limit_counts_characters() {
        let at_limit = "ü".repeat(MAX_CONTENT_CHARS);
        assert!(validate_content(&at_limit, &[]).is_ok());

        let over = "a".repeat(MAX_CONTENT_CHARS + 1);
        assert!(matches!(
            validate_content(&over, &[]),
            Err(MessagingError::Validation { .. })
        ));
    }

    #[test]
    fn attachments_need_names_and_sizes() {
        assert!(validate_content("", &[attachment("", 10)]).is_err());
        assert!(validate_content("", &[attachment("photo.png", -1)]).is_err());
    }

    #[test]
    fn emoji_must_be_short_and_present() {
        assert!(validate_emoji("👍").is_ok());
        assert!(validate_emoji("").is_err());
        assert!(validate_emoji(&"x".repeat(40)).is_err());
    }
}
