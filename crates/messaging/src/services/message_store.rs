//! Message store: the ordered, append-only log of each conversation.

use super::deadline::with_deadline;
use super::directory::ParticipantDirectory;
use crate::clock::Clock;
use crate::realtime::FanoutHub;
use crate::types::{Delta, MessagingError, MessagingResult};
use crate::utils::{validate_content, validate_emoji};
use courier_database::{
    AppendOutcome, Attachment, Conversation, ConversationRepository, DatabaseError, Message,
    MessageRepository, MessageType, NewMessage, Priority,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_PAGE_SIZE: i64 = 200;
pub const MAX_PAGE_SIZE: i64 = 1000;

/// A message as submitted by a sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub message_type: MessageType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub reply_to_id: Option<String>,
}

impl OutgoingMessage {
    pub fn text(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            content: content.into(),
            attachments: Vec::new(),
            message_type: MessageType::Text,
            priority: Priority::Normal,
            reply_to_id: None,
        }
    }

    pub fn with_type(mut self, message_type: MessageType) -> Self {
        self.message_type = message_type;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn replying_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to_id = Some(message_id.into());
        self
    }
}

pub struct MessageStore<D> {
    directory: Arc<D>,
    conversations: ConversationRepository,
    messages: MessageRepository,
    hub: FanoutHub,
    clock: Arc<dyn Clock>,
    operation_timeout: Duration,
}

impl<D: ParticipantDirectory> MessageStore<D> {
    pub fn new(
        pool: SqlitePool,
        directory: Arc<D>,
        hub: FanoutHub,
        clock: Arc<dyn Clock>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            conversations: ConversationRepository::new(pool.clone()),
            messages: MessageRepository::new(pool),
            hub,
            clock,
            operation_timeout,
        }
    }

    /// Validate and append a message.
    ///
    /// The counter increment, conversation touch and insert commit as one
    /// unit. Fan-out happens after commit and never affects the result.
    pub async fn append(&self, outgoing: OutgoingMessage) -> MessagingResult<Message> {
        let outcome = self.commit(&cuid2::create_id(), &outgoing).await?;
        self.announce(&outcome.message).await;
        Ok(outcome.message)
    }

    /// The transactional half of [`append`](Self::append), under a caller-chosen id.
    ///
    /// Committing the same id again is a no-op that returns the stored message,
    /// so a caller may retry after a timeout without duplicating it.
    pub async fn commit(&self, message_id: &str, outgoing: &OutgoingMessage) -> MessagingResult<AppendOutcome> {
        if outgoing.sender_id == outgoing.receiver_id {
            return Err(MessagingError::SelfMessage);
        }
        validate_content(&outgoing.content, &outgoing.attachments)?;

        with_deadline("append_message", self.operation_timeout, async {
            let conversation = self.load_conversation(&outgoing.conversation_id).await?;
            if !conversation.has_pair(&outgoing.sender_id, &outgoing.receiver_id) {
                return Err(MessagingError::forbidden(format!(
                    "{} and {} are not the participants of conversation {}",
                    outgoing.sender_id, outgoing.receiver_id, conversation.id
                )));
            }

            let sender = self.directory.resolve_participant(&outgoing.sender_id).await?;

            if let Some(reply_to_id) = &outgoing.reply_to_id {
                let target = self.messages.find_by_id(reply_to_id).await?;
                if target.map_or(true, |target| target.conversation_id != conversation.id) {
                    return Err(MessagingError::InvalidReply {
                        reply_to_id: reply_to_id.clone(),
                    });
                }
            }

            let receiver_side = conversation
                .side_of(&outgoing.receiver_id)
                .ok_or_else(|| MessagingError::forbidden("receiver is not in this conversation"))?;

            let draft = NewMessage {
                conversation_id: outgoing.conversation_id.clone(),
                sender_id: outgoing.sender_id.clone(),
                receiver_id: outgoing.receiver_id.clone(),
                content: outgoing.content.clone(),
                attachments: outgoing.attachments.clone(),
                message_type: outgoing.message_type,
                priority: outgoing.priority,
                is_admin_origin: sender.is_admin(),
                reply_to_id: outgoing.reply_to_id.clone(),
            };

            let now = self.clock.timestamp();
            self.messages
                .append_with_id(message_id, &draft, receiver_side, &now)
                .await
                .map_err(|error| conversation_gone(error, &draft.conversation_id))
        })
        .await
    }

    /// Publish a committed message and its conversation snapshot.
    pub async fn announce(&self, message: &Message) {
        self.hub
            .publish_to_participants(
                &[message.sender_id.as_str(), message.receiver_id.as_str()],
                Delta::MessageCreated {
                    message: message.clone(),
                },
            )
            .await;
        self.publish_conversation(&message.conversation_id).await;
    }

    /// Messages in `(created_at, seq)` order, optionally only those after
    /// `since_id`.
    pub async fn list_by_conversation(
        &self,
        conversation_id: &str,
        since_id: Option<&str>,
        limit: Option<i64>,
    ) -> MessagingResult<Vec<Message>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        with_deadline("list_messages", self.operation_timeout, async {
            self.load_conversation(conversation_id).await?;

            let anchor = match since_id {
                Some(since_id) => {
                    let anchor = self
                        .messages
                        .find_by_id(since_id)
                        .await?
                        .filter(|message| message.conversation_id == conversation_id)
                        .ok_or_else(|| MessagingError::not_found("message", since_id))?;
                    Some(anchor)
                }
                None => None,
            };

            let after = anchor.as_ref().map(|m| (m.created_at.as_str(), m.seq));
            self.messages
                .list_by_conversation(conversation_id, after, limit)
                .await
                .map_err(MessagingError::from)
        })
        .await
    }

    pub async fn get(&self, message_id: &str) -> MessagingResult<Message> {
        with_deadline("get_message", self.operation_timeout, async {
            self.messages
                .find_by_id(message_id)
                .await?
                .ok_or_else(|| MessagingError::not_found("message", message_id))
        })
        .await
    }

    /// Reset the reader's counter and mark their messages read.
    pub async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> MessagingResult<u64> {
        let now = self.clock.timestamp();
        let (conversation, mark) = with_deadline("mark_read", self.operation_timeout, async {
            let conversation = self.load_conversation(conversation_id).await?;
            let side = conversation.side_of(reader_id).ok_or_else(|| {
                MessagingError::forbidden(format!(
                    "{reader_id} is not a participant of conversation {conversation_id}"
                ))
            })?;

            let mark = self
                .messages
                .mark_read(conversation_id, reader_id, side, &now)
                .await
                .map_err(|error| conversation_gone(error, conversation_id))?;
            Ok::<_, MessagingError>((conversation, mark))
        })
        .await?;

        let count = mark.changed;
        info!(conversation_id, reader_id, count, "marked conversation read");
        self.hub
            .publish_to_participants(
                &conversation.participants(),
                Delta::MessagesRead {
                    conversation_id: conversation_id.to_string(),
                    reader_id: reader_id.to_string(),
                    read_at: now,
                    count,
                    through_seq: mark.through_seq,
                },
            )
            .await;
        self.publish_conversation(conversation_id).await;

        Ok(count)
    }

    /// Tombstone a message. Only its sender may do so; repeating is a no-op.
    pub async fn soft_delete(&self, message_id: &str, requester_id: &str) -> MessagingResult<Message> {
        let (message, deleted) = with_deadline("soft_delete_message", self.operation_timeout, async {
            let message = self
                .messages
                .find_by_id(message_id)
                .await?
                .ok_or_else(|| MessagingError::not_found("message", message_id))?;

            if message.sender_id != requester_id {
                return Err(MessagingError::forbidden("only the sender can delete a message"));
            }
            if message.is_deleted {
                return Ok((message, false));
            }

            let conversation = self.load_conversation(&message.conversation_id).await?;
            let receiver_side = conversation
                .side_of(&message.receiver_id)
                .ok_or_else(|| MessagingError::Internal {
                    message: format!("message {message_id} has a receiver outside its conversation"),
                })?;

            let now = self.clock.timestamp();
            let deleted = self
                .messages
                .soft_delete(message_id, receiver_side, &now)
                .await
                .map_err(|error| conversation_gone(error, &message.conversation_id))?;

            let message = self
                .messages
                .find_by_id(message_id)
                .await?
                .ok_or_else(|| MessagingError::not_found("message", message_id))?;
            Ok((message, deleted))
        })
        .await?;

        if deleted {
            self.hub
                .publish_to_participants(
                    &[message.sender_id.as_str(), message.receiver_id.as_str()],
                    Delta::MessageUpdated {
                        message: message.clone(),
                    },
                )
                .await;
            self.publish_conversation(&message.conversation_id).await;
        }

        Ok(message)
    }

    /// Add an emoji reaction from a participant of the conversation.
    pub async fn react(&self, message_id: &str, participant_id: &str, emoji: &str) -> MessagingResult<Message> {
        validate_emoji(emoji)?;

        let message = with_deadline("react_to_message", self.operation_timeout, async {
            self.ensure_annotatable(message_id, participant_id).await?;
            let now = self.clock.timestamp();
            self.messages
                .add_reaction(message_id, participant_id, emoji, &now)
                .await?;
            self.messages
                .find_by_id(message_id)
                .await?
                .ok_or_else(|| MessagingError::not_found("message", message_id))
        })
        .await?;

        self.publish_message_update(&message).await;
        Ok(message)
    }

    /// Star a message for a participant of the conversation.
    pub async fn star(&self, message_id: &str, participant_id: &str) -> MessagingResult<Message> {
        let message = with_deadline("star_message", self.operation_timeout, async {
            self.ensure_annotatable(message_id, participant_id).await?;
            let now = self.clock.timestamp();
            self.messages.add_star(message_id, participant_id, &now).await?;
            self.messages
                .find_by_id(message_id)
                .await?
                .ok_or_else(|| MessagingError::not_found("message", message_id))
        })
        .await?;

        self.publish_message_update(&message).await;
        Ok(message)
    }

    /// The stored unread counter of one side of a conversation.
    pub async fn unread_count(&self, conversation_id: &str, participant_id: &str) -> MessagingResult<i64> {
        let conversation = with_deadline("unread_count", self.operation_timeout, async {
            self.load_conversation(conversation_id).await
        })
        .await?;

        conversation.unread_for(participant_id).ok_or_else(|| {
            MessagingError::forbidden(format!(
                "{participant_id} is not a participant of conversation {conversation_id}"
            ))
        })
    }

    async fn ensure_annotatable(&self, message_id: &str, participant_id: &str) -> MessagingResult<()> {
        let message = self
            .messages
            .find_by_id(message_id)
            .await?
            .ok_or_else(|| MessagingError::not_found("message", message_id))?;
        let conversation = self.load_conversation(&message.conversation_id).await?;

        if !conversation.involves(participant_id) {
            return Err(MessagingError::forbidden(format!(
                "{participant_id} is not a participant of conversation {}",
                conversation.id
            )));
        }
        if message.is_deleted {
            return Err(MessagingError::validation("deleted messages cannot be annotated"));
        }
        Ok(())
    }

    async fn load_conversation(&self, conversation_id: &str) -> MessagingResult<Conversation> {
        self.conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| MessagingError::not_found("conversation", conversation_id))
    }

    async fn publish_message_update(&self, message: &Message) {
        self.hub
            .publish_to_participants(
                &[message.sender_id.as_str(), message.receiver_id.as_str()],
                Delta::MessageUpdated {
                    message: message.clone(),
                },
            )
            .await;
    }

    async fn publish_conversation(&self, conversation_id: &str) {
        match self.conversations.find_by_id(conversation_id).await {
            Ok(Some(conversation)) => {
                self.hub
                    .publish_to_participants(
                        &conversation.participants(),
                        Delta::ConversationUpdated {
                            conversation: conversation.clone(),
                        },
                    )
                    .await;
            }
            Ok(None) => {}
            Err(error) => {
                warn!(conversation_id, error = %error, "could not load conversation for fan-out");
            }
        }
    }
}

/// A counter update that matched no row means the conversation was deleted
/// between validation and the write.
fn conversation_gone(error: DatabaseError, conversation_id: &str) -> MessagingError {
    match error {
        DatabaseError::NotFound(_) => MessagingError::not_found("conversation", conversation_id),
        other => MessagingError::from(other),
    }
}
