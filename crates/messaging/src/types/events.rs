//! Realtime change records pushed to subscribers.

use courier_database::{Conversation, Message, Notification};
use serde::{Deserialize, Serialize};

/// A single state change, delivered on a participant or notification topic.
///
/// Every variant carries enough to be applied idempotently by a
/// [`ClientCache`](crate::realtime::ClientCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    ConversationCreated {
        conversation: Conversation,
    },
    ConversationUpdated {
        conversation: Conversation,
    },
    ConversationDeleted {
        conversation_id: String,
    },
    MessageCreated {
        message: Message,
    },
    MessageUpdated {
        message: Message,
    },
    MessagesRead {
        conversation_id: String,
        reader_id: String,
        read_at: String,
        count: u64,
        /// Every message to `reader_id` with `seq` up to this value is read.
        through_seq: i64,
    },
    NotificationCreated {
        notification: Notification,
    },
    NotificationUpdated {
        notification: Notification,
    },
    NotificationDeleted {
        notification_id: String,
    },
    NotificationsRead {
        read_at: String,
        count: u64,
    },
}

impl Delta {
    pub fn name(&self) -> &'static str {
        match self {
            Delta::ConversationCreated { .. } => "conversation_created",
            Delta::ConversationUpdated { .. } => "conversation_updated",
            Delta::ConversationDeleted { .. } => "conversation_deleted",
            Delta::MessageCreated { .. } => "message_created",
            Delta::MessageUpdated { .. } => "message_updated",
            Delta::MessagesRead { .. } => "messages_read",
            Delta::NotificationCreated { .. } => "notification_created",
            Delta::NotificationUpdated { .. } => "notification_updated",
            Delta::NotificationDeleted { .. } => "notification_deleted",
            Delta::NotificationsRead { .. } => "notifications_read",
        }
    }

    /// The conversation this delta belongs to, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        match self {
            Delta::ConversationCreated { conversation } | Delta::ConversationUpdated { conversation } => {
                Some(&conversation.id)
            }
            Delta::ConversationDeleted { conversation_id } | Delta::MessagesRead { conversation_id, .. } => {
                Some(conversation_id)
            }
            Delta::MessageCreated { message } | Delta::MessageUpdated { message } => {
                Some(&message.conversation_id)
            }
            _ => None,
        }
    }
}

/// Snapshot handed to a subscriber that fell behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResyncBatch {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

impl ResyncBatch {
    /// Replay the snapshot as ordinary deltas.
    pub fn into_deltas(self) -> Vec<Delta> {
        let mut deltas = Vec::with_capacity(self.messages.len() + 1);
        deltas.push(Delta::ConversationUpdated { conversation: self.conversation });
        deltas.extend(self.messages.into_iter().map(|message| Delta::MessageUpdated { message }));
        deltas
    }
}

/// Snapshot emitted by the notification poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSnapshot {
    pub unread_count: i64,
    pub notifications: Vec<Notification>,
}

impl NotificationSnapshot {
    pub fn into_deltas(self) -> Vec<Delta> {
        self.notifications
            .into_iter()
            .map(|notification| Delta::NotificationUpdated { notification })
            .collect()
    }
}
