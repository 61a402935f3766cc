//! Repository for message data access operations.

use crate::entities::message::preview_of;
use crate::entities::{Attachment, Message, MessageType, NewMessage, Priority, Side};
use crate::repos::{ConversationRepository, UnreadCounters};
use crate::types::{DatabaseError, DatabaseResult};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

const MESSAGE_COLUMNS: &str = "m.seq, m.id, m.conversation_id, m.sender_id, m.receiver_id, m.content,
     m.attachments, m.message_type, m.priority, m.is_read, m.is_admin_origin, m.is_deleted,
     m.reply_to_id, m.created_at, m.deleted_at,
     (SELECT COUNT(*) FROM message_stars s WHERE s.message_id = m.id) AS star_count";

/// Result of [`MessageRepository::append_with_id`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppendOutcome {
    pub message: Message,
    /// `false` when the id was already stored and nothing changed.
    pub inserted: bool,
}

/// Result of [`MessageRepository::mark_read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMark {
    /// Messages flipped from unread to read.
    pub changed: u64,
    /// Highest `seq` addressed to the reader when the mark was taken; 0 if none.
    pub through_seq: i64,
}

/// Repository for message database operations
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a message under a fresh id.
    pub async fn append(
        &self,
        message: &NewMessage,
        receiver_side: Side,
        now: &str,
    ) -> DatabaseResult<Message> {
        let outcome = self
            .append_with_id(&cuid2::create_id(), message, receiver_side, now)
            .await?;
        Ok(outcome.message)
    }

    /// Append a message and apply its side effects in one transaction.
    ///
    /// The counter increment runs first so the transaction holds the write
    /// lock from its first statement. `created_at` is stamped after that, and
    /// never earlier than the newest message of the conversation, so timestamp
    /// order matches commit order within a conversation.
    ///
    /// Re-appending an id that is already stored changes nothing and returns
    /// the stored message with `inserted == false`.
    pub async fn append_with_id(
        &self,
        id: &str,
        message: &NewMessage,
        receiver_side: Side,
        now: &str,
    ) -> DatabaseResult<AppendOutcome> {
        let attachments = serde_json::to_string(&message.attachments)?;
        let preview = message.preview();

        let mut tx = self.pool.begin().await?;

        UnreadCounters::increment(&mut tx, &message.conversation_id, receiver_side, now).await?;

        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            tx.rollback().await?;
            debug!(message_id = %id, "message already appended");
            let message = self
                .find_by_id(id)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(format!("message {id}")))?;
            return Ok(AppendOutcome {
                message,
                inserted: false,
            });
        }

        let created_at = commit_stamp(&mut tx, &message.conversation_id, now).await?;
        ConversationRepository::touch_last_message(&mut tx, &message.conversation_id, &preview, &created_at)
            .await?;

        let (seq,): (i64,) = sqlx::query_as(
            "INSERT INTO messages (
                id, conversation_id, sender_id, receiver_id, content, attachments,
                message_type, priority, is_admin_origin, reply_to_id, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING seq",
        )
        .bind(id)
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.receiver_id)
        .bind(&message.content)
        .bind(&attachments)
        .bind(message.message_type.as_str())
        .bind(message.priority.as_str())
        .bind(message.is_admin_origin)
        .bind(&message.reply_to_id)
        .bind(&created_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            message_id = %id,
            seq,
            conversation_id = %message.conversation_id,
            sender_id = %message.sender_id,
            "appended message"
        );

        Ok(AppendOutcome {
            message: Message {
                id: id.to_string(),
                seq,
                conversation_id: message.conversation_id.clone(),
                sender_id: message.sender_id.clone(),
                receiver_id: message.receiver_id.clone(),
                content: message.content.clone(),
                attachments: message.attachments.clone(),
                message_type: message.message_type,
                priority: message.priority,
                is_read: false,
                is_admin_origin: message.is_admin_origin,
                reply_to_id: message.reply_to_id.clone(),
                reactions: BTreeMap::new(),
                star_count: 0,
                is_deleted: false,
                deleted_at: None,
                created_at,
            },
            inserted: true,
        })
    }

    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = ?");
        let Some(row) = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await? else {
            return Ok(None);
        };

        let mut message = map_message(&row)?;
        message.reactions = self.reactions_for(&message.id).await?;
        Ok(Some(message))
    }

    /// Messages of a conversation in `(created_at, seq)` order.
    ///
    /// With `after`, only messages strictly later than that position are returned.
    pub async fn list_by_conversation(
        &self,
        conversation_id: &str,
        after: Option<(&str, i64)>,
        limit: i64,
    ) -> DatabaseResult<Vec<Message>> {
        let rows = match after {
            Some((created_at, seq)) => {
                let sql = format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     WHERE m.conversation_id = ?
                       AND (m.created_at > ? OR (m.created_at = ? AND m.seq > ?))
                     ORDER BY m.created_at, m.seq
                     LIMIT ?"
                );
                sqlx::query(&sql)
                    .bind(conversation_id)
                    .bind(created_at)
                    .bind(created_at)
                    .bind(seq)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages m
                     WHERE m.conversation_id = ?
                     ORDER BY m.created_at, m.seq
                     LIMIT ?"
                );
                sqlx::query(&sql)
                    .bind(conversation_id)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut messages = rows.iter().map(map_message).collect::<DatabaseResult<Vec<_>>>()?;
        if messages.is_empty() {
            return Ok(messages);
        }

        let mut reactions = self.reactions_for_conversation(conversation_id).await?;
        for message in &mut messages {
            if let Some(counts) = reactions.remove(&message.id) {
                message.reactions = counts;
            }
        }

        Ok(messages)
    }

    /// Reset the reader's counter and flip their unread messages to read.
    ///
    /// The returned mark covers every message addressed to the reader up to
    /// `through_seq`, the newest one committed before this call.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
        reader_side: Side,
        now: &str,
    ) -> DatabaseResult<ReadMark> {
        let mut tx = self.pool.begin().await?;

        UnreadCounters::reset(&mut tx, conversation_id, reader_side, now).await?;

        let result = sqlx::query(
            "UPDATE messages SET is_read = true
             WHERE conversation_id = ? AND receiver_id = ? AND is_read = false AND is_deleted = false",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .execute(&mut *tx)
        .await?;

        let (through_seq,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(seq), 0) FROM messages WHERE conversation_id = ? AND receiver_id = ?",
        )
        .bind(conversation_id)
        .bind(reader_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let changed = result.rows_affected();
        debug!(conversation_id, reader_id, changed, through_seq, "marked messages read");
        Ok(ReadMark { changed, through_seq })
    }

    /// Tombstone a message. Returns `false` when it was already deleted.
    ///
    /// If the message was still unread, the receiver's counter gives back one
    /// unit in the same transaction.
    pub async fn soft_delete(&self, id: &str, receiver_side: Side, now: &str) -> DatabaseResult<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "UPDATE messages
             SET is_deleted = true, content = '', attachments = '[]', deleted_at = ?
             WHERE id = ? AND is_deleted = false
             RETURNING conversation_id, is_read",
        )
        .bind(now)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let conversation_id: String = row.try_get("conversation_id")?;
        let was_read: bool = row.try_get("is_read")?;
        if !was_read {
            UnreadCounters::release(&mut tx, &conversation_id, receiver_side, now).await?;
        }

        let latest = sqlx::query(
            "SELECT content, attachments FROM messages
             WHERE conversation_id = ? AND is_deleted = false
             ORDER BY created_at DESC, seq DESC
             LIMIT 1",
        )
        .bind(&conversation_id)
        .fetch_optional(&mut *tx)
        .await?;
        let preview = match latest {
            Some(latest) => {
                let content: String = latest.try_get("content")?;
                let attachments: String = latest.try_get("attachments")?;
                let attachments: Vec<Attachment> = serde_json::from_str(&attachments)?;
                Some(preview_of(&content, &attachments))
            }
            None => None,
        };
        ConversationRepository::refresh_preview(&mut tx, &conversation_id, preview.as_deref(), now).await?;

        tx.commit().await?;
        info!(message_id = %id, conversation_id = %conversation_id, released = !was_read, "soft deleted message");
        Ok(true)
    }

    /// Add a reaction. Repeating the same reaction is a no-op.
    pub async fn add_reaction(
        &self,
        message_id: &str,
        participant_id: &str,
        emoji: &str,
        now: &str,
    ) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO message_reactions (message_id, emoji, participant_id, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(message_id, emoji, participant_id) DO NOTHING",
        )
        .bind(message_id)
        .bind(emoji)
        .bind(participant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Star a message for a participant. Repeating it is a no-op.
    pub async fn add_star(&self, message_id: &str, participant_id: &str, now: &str) -> DatabaseResult<()> {
        sqlx::query(
            "INSERT INTO message_stars (message_id, participant_id, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(message_id, participant_id) DO NOTHING",
        )
        .bind(message_id)
        .bind(participant_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn reactions_for(&self, message_id: &str) -> DatabaseResult<BTreeMap<String, i64>> {
        let rows = sqlx::query(
            "SELECT emoji, COUNT(*) AS count FROM message_reactions
             WHERE message_id = ? GROUP BY emoji",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        let mut reactions = BTreeMap::new();
        for row in rows {
            let emoji: String = row.try_get("emoji")?;
            let count: i64 = row.try_get("count")?;
            reactions.insert(emoji, count);
        }

        Ok(reactions)
    }

    async fn reactions_for_conversation(
        &self,
        conversation_id: &str,
    ) -> DatabaseResult<HashMap<String, BTreeMap<String, i64>>> {
        let rows = sqlx::query(
            "SELECT r.message_id, r.emoji, COUNT(*) AS count
             FROM message_reactions r
             JOIN messages m ON m.id = r.message_id
             WHERE m.conversation_id = ?
             GROUP BY r.message_id, r.emoji",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        let mut reactions: HashMap<String, BTreeMap<String, i64>> = HashMap::new();
        for row in rows {
            let message_id: String = row.try_get("message_id")?;
            let emoji: String = row.try_get("emoji")?;
            let count: i64 = row.try_get("count")?;
            reactions.entry(message_id).or_default().insert(emoji, count);
        }

        Ok(reactions)
    }
}

/// `now`, or the newest `created_at` of the conversation if that is later.
///
/// Must run inside the write transaction so no other append can interleave.
async fn commit_stamp(conn: &mut SqliteConnection, conversation_id: &str, now: &str) -> DatabaseResult<String> {
    let (latest,): (Option<String>,) =
        sqlx::query_as("SELECT MAX(created_at) FROM messages WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_one(&mut *conn)
            .await?;

    Ok(match latest {
        Some(latest) if latest.as_str() > now => latest,
        _ => now.to_string(),
    })
}

fn map_message(row: &SqliteRow) -> DatabaseResult<Message> {
    let attachments: String = row.try_get("attachments")?;
    let attachments: Vec<Attachment> = serde_json::from_str(&attachments)?;
    let message_type: String = row.try_get("message_type")?;
    let priority: String = row.try_get("priority")?;

    Ok(Message {
        id: row.try_get("id")?,
        seq: row.try_get("seq")?,
        conversation_id: row.try_get("conversation_id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        content: row.try_get("content")?,
        attachments,
        message_type: MessageType::from(message_type.as_str()),
        priority: Priority::from(priority.as_str()),
        is_read: row.try_get("is_read")?,
        is_admin_origin: row.try_get("is_admin_origin")?,
        reply_to_id: row.try_get("reply_to_id")?,
        reactions: BTreeMap::new(),
        star_count: row.try_get("star_count")?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
    })
}
