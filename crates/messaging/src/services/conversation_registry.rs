//! Conversation registry: one conversation per unordered participant pair.

use super::deadline::with_deadline;
use super::directory::ParticipantDirectory;
use crate::clock::Clock;
use crate::realtime::FanoutHub;
use crate::types::{Delta, MessagingError, MessagingResult};
use crate::utils::require_non_empty;
use courier_database::{Conversation, ConversationFilter, ConversationFlags, ConversationRepository};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct ConversationRegistry<D> {
    directory: Arc<D>,
    conversations: ConversationRepository,
    hub: FanoutHub,
    clock: Arc<dyn Clock>,
    operation_timeout: Duration,
}

impl<D: ParticipantDirectory> ConversationRegistry<D> {
    pub fn new(
        pool: SqlitePool,
        directory: Arc<D>,
        hub: FanoutHub,
        clock: Arc<dyn Clock>,
        operation_timeout: Duration,
    ) -> Self {
        Self {
            directory,
            conversations: ConversationRepository::new(pool),
            hub,
            clock,
            operation_timeout,
        }
    }

    /// Return the pair's conversation, creating it on first contact.
    ///
    /// `(a, b)` and `(b, a)` resolve to the same conversation, also when
    /// callers race: the pair key decides and every caller reads back the
    /// surviving row.
    pub async fn get_or_create(&self, first: &str, second: &str) -> MessagingResult<Conversation> {
        require_non_empty("participant id", first)?;
        require_non_empty("participant id", second)?;
        if first == second {
            return Err(MessagingError::SelfMessage);
        }

        let now = self.clock.timestamp();
        let (conversation, created) = with_deadline("get_or_create_conversation", self.operation_timeout, async {
            self.directory.resolve_participant(first).await?;
            self.directory.resolve_participant(second).await?;
            self.conversations
                .create_if_absent(first, second, &now)
                .await
                .map_err(MessagingError::from)
        })
        .await?;

        if created {
            self.hub
                .publish_to_participants(
                    &conversation.participants(),
                    Delta::ConversationCreated {
                        conversation: conversation.clone(),
                    },
                )
                .await;
        }

        Ok(conversation)
    }

    pub async fn get(&self, id: &str) -> MessagingResult<Conversation> {
        with_deadline("get_conversation", self.operation_timeout, async {
            self.conversations
                .find_by_id(id)
                .await?
                .ok_or_else(|| MessagingError::not_found("conversation", id))
        })
        .await
    }

    /// Like [`get`](Self::get), but only for one of the two participants.
    pub async fn get_for_participant(&self, id: &str, participant_id: &str) -> MessagingResult<Conversation> {
        let conversation = self.get(id).await?;
        if !conversation.involves(participant_id) {
            return Err(MessagingError::forbidden(format!(
                "{participant_id} is not a participant of conversation {id}"
            )));
        }
        Ok(conversation)
    }

    pub async fn list(&self, participant_id: &str, filter: ConversationFilter) -> MessagingResult<Vec<Conversation>> {
        with_deadline("list_conversations", self.operation_timeout, async {
            self.conversations
                .list_for_participant(participant_id, filter)
                .await
                .map_err(MessagingError::from)
        })
        .await
    }

    /// Partial update of starred/archived/priority. Archiving keeps messages
    /// and counters as they are.
    pub async fn set_flags(&self, id: &str, flags: ConversationFlags) -> MessagingResult<Conversation> {
        if flags.is_empty() {
            return self.get(id).await;
        }

        let now = self.clock.timestamp();
        let conversation = with_deadline("set_conversation_flags", self.operation_timeout, async {
            self.conversations
                .update_flags(id, &flags, &now)
                .await?
                .ok_or_else(|| MessagingError::not_found("conversation", id))
        })
        .await?;

        info!(
            conversation_id = %id,
            starred = conversation.is_starred,
            archived = conversation.is_archived,
            priority = conversation.priority.as_str(),
            "updated conversation flags"
        );
        self.hub
            .publish_to_participants(
                &conversation.participants(),
                Delta::ConversationUpdated {
                    conversation: conversation.clone(),
                },
            )
            .await;

        Ok(conversation)
    }

    /// Hard delete with messages, reactions and stars. Terminal.
    pub async fn delete(&self, id: &str) -> MessagingResult<()> {
        let conversation = self.get(id).await?;
        let deleted = with_deadline("delete_conversation", self.operation_timeout, async {
            self.conversations.delete(id).await.map_err(MessagingError::from)
        })
        .await?;

        if !deleted {
            return Err(MessagingError::not_found("conversation", id));
        }

        self.hub
            .publish_to_participants(
                &conversation.participants(),
                Delta::ConversationDeleted {
                    conversation_id: id.to_string(),
                },
            )
            .await;
        Ok(())
    }
}
