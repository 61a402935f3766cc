//! Receiving-side cache that applies deltas idempotently.

use crate::types::Delta;
use courier_database::{Conversation, Message, Notification, NotificationStatus};
use std::collections::{BTreeMap, HashMap, HashSet};

type OrderKey = (String, i64);

/// Read-through view of conversations, messages and notifications built from
/// deltas.
///
/// Applying the same delta twice leaves the cache unchanged. Read and delete
/// flags only move forward, older conversation snapshots are ignored, and
/// deleted conversations or notifications are tombstoned so late duplicates
/// cannot bring them back.
#[derive(Debug, Default, Clone)]
pub struct ClientCache {
    conversations: HashMap<String, Conversation>,
    deleted_conversations: HashSet<String>,
    messages: HashMap<String, BTreeMap<OrderKey, Message>>,
    message_keys: HashMap<String, (String, OrderKey)>,
    read_marks: HashMap<(String, String), i64>,
    notifications: HashMap<String, Notification>,
    deleted_notifications: HashSet<String>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one delta. Returns whether anything changed.
    pub fn apply(&mut self, delta: &Delta) -> bool {
        match delta {
            Delta::ConversationCreated { conversation } | Delta::ConversationUpdated { conversation } => {
                self.apply_conversation(conversation)
            }
            Delta::ConversationDeleted { conversation_id } => self.delete_conversation(conversation_id),
            Delta::MessageCreated { message } | Delta::MessageUpdated { message } => {
                self.apply_message(message)
            }
            Delta::MessagesRead {
                conversation_id,
                reader_id,
                through_seq,
                ..
            } => self.apply_read_mark(conversation_id, reader_id, *through_seq),
            Delta::NotificationCreated { notification } | Delta::NotificationUpdated { notification } => {
                self.apply_notification(notification)
            }
            Delta::NotificationDeleted { notification_id } => self.delete_notification(notification_id),
            Delta::NotificationsRead { read_at, .. } => self.read_all_notifications(read_at),
        }
    }

    pub fn apply_all<'a>(&mut self, deltas: impl IntoIterator<Item = &'a Delta>) -> usize {
        deltas.into_iter().filter(|delta| self.apply(delta)).count()
    }

    pub fn conversation(&self, id: &str) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    /// Cached conversations, most recent activity first.
    pub fn conversations(&self) -> Vec<&Conversation> {
        let mut conversations: Vec<&Conversation> = self.conversations.values().collect();
        conversations.sort_by(|a, b| {
            b.last_message_at
                .is_some()
                .cmp(&a.last_message_at.is_some())
                .then_with(|| b.last_message_at.cmp(&a.last_message_at))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        conversations
    }

    /// Messages of a conversation in `(created_at, seq)` order.
    pub fn messages(&self, conversation_id: &str) -> Vec<&Message> {
        self.messages
            .get(conversation_id)
            .map(|log| log.values().collect())
            .unwrap_or_default()
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        let (conversation_id, key) = self.message_keys.get(id)?;
        self.messages.get(conversation_id)?.get(key)
    }

    /// The newest cached message id, the natural `since_id` for a resync.
    pub fn last_message_id(&self, conversation_id: &str) -> Option<&str> {
        self.messages
            .get(conversation_id)?
            .values()
            .next_back()
            .map(|message| message.id.as_str())
    }

    pub fn notification(&self, id: &str) -> Option<&Notification> {
        self.notifications.get(id)
    }

    /// Cached notifications, newest first.
    pub fn notifications(&self) -> Vec<&Notification> {
        let mut notifications: Vec<&Notification> = self.notifications.values().collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        notifications
    }

    pub fn unread_notifications(&self) -> usize {
        self.notifications.values().filter(|n| n.is_unread()).count()
    }

    fn apply_conversation(&mut self, incoming: &Conversation) -> bool {
        if self.deleted_conversations.contains(&incoming.id) {
            return false;
        }

        match self.conversations.get(&incoming.id) {
            Some(current) if current.updated_at > incoming.updated_at => false,
            Some(current) if current == incoming => false,
            _ => {
                self.conversations.insert(incoming.id.clone(), incoming.clone());
                true
            }
        }
    }

    fn delete_conversation(&mut self, conversation_id: &str) -> bool {
        let newly_deleted = self.deleted_conversations.insert(conversation_id.to_string());
        self.conversations.remove(conversation_id);
        if let Some(log) = self.messages.remove(conversation_id) {
            for message in log.values() {
                self.message_keys.remove(&message.id);
            }
        }
        newly_deleted
    }

    fn apply_message(&mut self, incoming: &Message) -> bool {
        if self.deleted_conversations.contains(&incoming.conversation_id) {
            return false;
        }

        let mut merged = incoming.clone();
        if self.read_before(&merged) {
            merged.is_read = true;
        }

        let key = merged.order_key();
        let existing = self
            .message_keys
            .get(&merged.id)
            .and_then(|(conversation_id, key)| self.messages.get(conversation_id)?.get(key))
            .cloned();

        if let Some(current) = existing {
            merge_message(&mut merged, &current);
            if merged == current {
                return false;
            }
        }

        self.message_keys
            .insert(merged.id.clone(), (merged.conversation_id.clone(), key.clone()));
        self.messages
            .entry(merged.conversation_id.clone())
            .or_default()
            .insert(key, merged);
        true
    }

    fn read_before(&self, message: &Message) -> bool {
        self.read_marks
            .get(&(message.conversation_id.clone(), message.receiver_id.clone()))
            .is_some_and(|through_seq| message.seq <= *through_seq)
    }

    fn apply_read_mark(&mut self, conversation_id: &str, reader_id: &str, through_seq: i64) -> bool {
        let mark = (conversation_id.to_string(), reader_id.to_string());
        let advanced = match self.read_marks.get(&mark) {
            Some(current) if *current >= through_seq => false,
            _ => {
                self.read_marks.insert(mark, through_seq);
                true
            }
        };

        let mut flipped = false;
        if let Some(log) = self.messages.get_mut(conversation_id) {
            for message in log.values_mut() {
                if message.receiver_id == reader_id
                    && !message.is_read
                    && message.seq <= through_seq
                {
                    message.is_read = true;
                    flipped = true;
                }
            }
        }

        advanced || flipped
    }

    fn apply_notification(&mut self, incoming: &Notification) -> bool {
        if self.deleted_notifications.contains(&incoming.id) {
            return false;
        }

        let mut merged = incoming.clone();
        if let Some(current) = self.notifications.get(&incoming.id) {
            if current.status == NotificationStatus::Read {
                merged.status = NotificationStatus::Read;
                merged.read_at = current.read_at.clone().or(merged.read_at);
            }
            if *current == merged {
                return false;
            }
        }

        self.notifications.insert(merged.id.clone(), merged);
        true
    }

    fn delete_notification(&mut self, notification_id: &str) -> bool {
        let newly_deleted = self.deleted_notifications.insert(notification_id.to_string());
        self.notifications.remove(notification_id);
        newly_deleted
    }

    fn read_all_notifications(&mut self, read_at: &str) -> bool {
        let mut changed = false;
        for notification in self.notifications.values_mut() {
            if notification.is_unread() && notification.created_at.as_str() <= read_at {
                notification.status = NotificationStatus::Read;
                notification.read_at = Some(read_at.to_string());
                changed = true;
            }
        }
        changed
    }
}

/// Keep forward-only state from `current` when a delta carries older facts.
fn merge_message(merged: &mut Message, current: &Message) {
    merged.is_read |= current.is_read;

    if current.is_deleted {
        merged.is_deleted = true;
        merged.content.clear();
        merged.attachments.clear();
        merged.deleted_at = merged.deleted_at.take().or_else(|| current.deleted_at.clone());
    }

    for (emoji, count) in &current.reactions {
        let entry = merged.reactions.entry(emoji.clone()).or_insert(0);
        *entry = (*entry).max(*count);
    }
    merged.star_count = merged.star_count.max(current.star_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_database::{EventPriority, MessageType, Priority, Urgency};

    fn message(id: &str, seq: i64, created_at: &str) -> Message {
        Message {
            id: id.into(),
            seq,
            conversation_id: "c1".into(),
            sender_id: "alice".into(),
            receiver_id: "bob".into(),
            content: format!("message {id}"),
            attachments: vec![],
            message_type: MessageType::Text,
            priority: Priority::Normal,
            is_read: false,
            is_admin_origin: false,
            reply_to_id: None,
            reactions: BTreeMap::new(),
            star_count: 0,
            is_deleted: false,
            deleted_at: None,
            created_at: created_at.into(),
        }
    }

    fn conversation(updated_at: &str, unread_b: i64) -> Conversation {
        Conversation {
            id: "c1".into(),
            participant_a: "alice".into(),
            participant_b: "bob".into(),
            last_message_preview: Some("hi".into()),
            last_message_at: Some(updated_at.into()),
            unread_count_a: 0,
            unread_count_b: unread_b,
            is_starred: false,
            is_archived: false,
            is_active: true,
            priority: Priority::Normal,
            created_at: "2024-05-01T09:00:00.000000Z".into(),
            updated_at: updated_at.into(),
        }
    }

    fn notification(id: &str) -> Notification {
        Notification {
            id: id.into(),
            kind: "report_submitted".into(),
            title: "Report".into(),
            message: "Batch 7".into(),
            subject_ref: None,
            priority: EventPriority::High,
            urgency: Urgency::High,
            status: NotificationStatus::Unread,
            created_at: "2024-05-01T10:00:00.000000Z".into(),
            read_at: None,
        }
    }

    #[test]
    fn duplicate_message_deltas_are_cached_once() {
        let mut cache = ClientCache::new();
        let delta = Delta::MessageCreated {
            message: message("m1", 1, "2024-05-01T10:00:00.000000Z"),
        };

        assert!(cache.apply(&delta));
        assert!(!cache.apply(&delta));
        assert_eq!(cache.messages("c1").len(), 1);
    }

    #[test]
    fn out_of_order_deltas_are_stored_in_commit_order() {
        let mut cache = ClientCache::new();
        let later = message("m2", 2, "2024-05-01T10:00:00.000000Z");
        let earlier = message("m1", 1, "2024-05-01T10:00:00.000000Z");

        cache.apply(&Delta::MessageCreated { message: later });
        cache.apply(&Delta::MessageCreated { message: earlier });

        let ids: Vec<&str> = cache.messages("c1").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["m1", "m2"]);
        assert_eq!(cache.last_message_id("c1"), Some("m2"));
    }

    #[test]
    fn read_and_deleted_flags_never_regress() {
        let mut cache = ClientCache::new();
        let original = message("m1", 1, "2024-05-01T10:00:00.000000Z");

        let mut tombstone = original.clone();
        tombstone.is_deleted = true;
        tombstone.is_read = true;
        tombstone.content.clear();

        cache.apply(&Delta::MessageUpdated { message: tombstone });
        assert!(!cache.apply(&Delta::MessageCreated { message: original }));

        let cached = cache.message("m1").unwrap();
        assert!(cached.is_deleted);
        assert!(cached.is_read);
        assert!(cached.content.is_empty());
    }

    #[test]
    fn read_marks_cover_late_message_deltas() {
        let mut cache = ClientCache::new();
        cache.apply(&Delta::MessagesRead {
            conversation_id: "c1".into(),
            reader_id: "bob".into(),
            read_at: "2024-05-01T10:00:05.000000Z".into(),
            count: 1,
            through_seq: 1,
        });

        cache.apply(&Delta::MessageCreated {
            message: message("m1", 1, "2024-05-01T10:00:00.000000Z"),
        });
        cache.apply(&Delta::MessageCreated {
            message: message("m2", 2, "2024-05-01T10:00:09.000000Z"),
        });

        assert!(cache.message("m1").unwrap().is_read);
        assert!(!cache.message("m2").unwrap().is_read);
    }

    #[test]
    fn read_marks_follow_seq_not_timestamps() {
        let mut cache = ClientCache::new();
        cache.apply(&Delta::MessageCreated {
            message: message("m1", 1, "2024-05-01T10:00:00.000000Z"),
        });
        // committed after the read, stamped no later than the read time
        cache.apply(&Delta::MessageCreated {
            message: message("m2", 2, "2024-05-01T10:00:01.000000Z"),
        });

        assert!(cache.apply(&Delta::MessagesRead {
            conversation_id: "c1".into(),
            reader_id: "bob".into(),
            read_at: "2024-05-01T10:00:05.000000Z".into(),
            count: 1,
            through_seq: 1,
        }));

        assert!(cache.message("m1").unwrap().is_read);
        assert!(!cache.message("m2").unwrap().is_read);
    }

    #[test]
    fn stale_conversation_snapshots_are_ignored() {
        let mut cache = ClientCache::new();
        assert!(cache.apply(&Delta::ConversationUpdated {
            conversation: conversation("2024-05-01T10:00:05.000000Z", 0),
        }));
        assert!(!cache.apply(&Delta::ConversationUpdated {
            conversation: conversation("2024-05-01T10:00:01.000000Z", 3),
        }));

        assert_eq!(cache.conversation("c1").unwrap().unread_count_b, 0);
    }

    #[test]
    fn deleted_conversations_stay_deleted() {
        let mut cache = ClientCache::new();
        cache.apply(&Delta::ConversationCreated {
            conversation: conversation("2024-05-01T10:00:00.000000Z", 0),
        });
        cache.apply(&Delta::MessageCreated {
            message: message("m1", 1, "2024-05-01T10:00:00.000000Z"),
        });

        assert!(cache.apply(&Delta::ConversationDeleted { conversation_id: "c1".into() }));
        assert!(!cache.apply(&Delta::ConversationUpdated {
            conversation: conversation("2024-05-01T11:00:00.000000Z", 1),
        }));
        assert!(!cache.apply(&Delta::MessageCreated {
            message: message("m2", 2, "2024-05-01T11:00:00.000000Z"),
        }));
        assert!(cache.conversation("c1").is_none());
        assert!(cache.messages("c1").is_empty());
        assert!(cache.message("m1").is_none());
    }

    #[test]
    fn notifications_dedupe_and_stay_read() {
        let mut cache = ClientCache::new();
        let created = Delta::NotificationCreated {
            notification: notification("n1"),
        };

        assert!(cache.apply(&created));
        assert!(!cache.apply(&created));
        assert_eq!(cache.unread_notifications(), 1);

        assert!(cache.apply(&Delta::NotificationsRead {
            read_at: "2024-05-01T10:05:00.000000Z".into(),
            count: 1,
        }));
        assert!(!cache.apply(&created));
        assert_eq!(cache.unread_notifications(), 0);

        assert!(cache.apply(&Delta::NotificationDeleted { notification_id: "n1".into() }));
        assert!(!cache.apply(&created));
        assert!(cache.notifications().is_empty());
    }
}
