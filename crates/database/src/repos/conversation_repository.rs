//! Repository for conversation data access operations.

use crate::entities::conversation::canonical_pair;
use crate::entities::{Conversation, ConversationFilter, ConversationFlags, Priority};
use crate::types::DatabaseResult;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

const CONVERSATION_COLUMNS: &str = "id, participant_a, participant_b, last_message_preview, last_message_at,
     unread_count_a, unread_count_b, is_starred, is_archived, is_active, priority, created_at, updated_at";

/// Repository for conversation database operations
#[derive(Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the conversation for an unordered pair unless it already exists.
    ///
    /// Returns the stored row and whether this call inserted it. Concurrent
    /// callers race on the `(participant_a, participant_b)` key and all read
    /// back the same row.
    pub async fn create_if_absent(
        &self,
        first: &str,
        second: &str,
        now: &str,
    ) -> DatabaseResult<(Conversation, bool)> {
        let (participant_a, participant_b) = canonical_pair(first, second);
        let id = cuid2::create_id();

        let result = sqlx::query(
            "INSERT INTO conversations (id, participant_a, participant_b, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(participant_a, participant_b) DO NOTHING",
        )
        .bind(&id)
        .bind(participant_a)
        .bind(participant_b)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() == 1;
        let conversation = self
            .find_by_pair(participant_a, participant_b)
            .await?
            .ok_or_else(|| {
                crate::types::DatabaseError::NotFound(format!(
                    "conversation {participant_a}/{participant_b}"
                ))
            })?;

        if created {
            info!(
                conversation_id = %conversation.id,
                participant_a,
                participant_b,
                "created conversation"
            );
        } else {
            debug!(conversation_id = %conversation.id, "conversation already existed");
        }

        Ok((conversation, created))
    }

    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<Conversation>> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(map_conversation).transpose()
    }

    /// Look up a pair in either order.
    pub async fn find_by_pair(&self, first: &str, second: &str) -> DatabaseResult<Option<Conversation>> {
        let (participant_a, participant_b) = canonical_pair(first, second);
        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE participant_a = ? AND participant_b = ?"
        );
        let row = sqlx::query(&sql)
            .bind(participant_a)
            .bind(participant_b)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_conversation).transpose()
    }

    /// Conversations of one participant, most recent activity first.
    ///
    /// Every filter except `Archived` hides archived conversations.
    /// Conversations without messages sort last, newest first among them.
    pub async fn list_for_participant(
        &self,
        participant_id: &str,
        filter: ConversationFilter,
    ) -> DatabaseResult<Vec<Conversation>> {
        let predicate = match filter {
            ConversationFilter::All => "is_archived = false",
            ConversationFilter::Unread => {
                "is_archived = false
                 AND (CASE WHEN participant_a = ? THEN unread_count_a ELSE unread_count_b END) > 0"
            }
            ConversationFilter::Starred => "is_archived = false AND is_starred = true",
            ConversationFilter::Urgent => "is_archived = false AND priority = 'urgent'",
            ConversationFilter::Archived => "is_archived = true",
        };

        let sql = format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE (participant_a = ? OR participant_b = ?) AND {predicate}
             ORDER BY last_message_at IS NULL, last_message_at DESC, created_at DESC, seq DESC"
        );

        let mut query = sqlx::query(&sql).bind(participant_id).bind(participant_id);
        if filter == ConversationFilter::Unread {
            query = query.bind(participant_id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(map_conversation).collect()
    }

    /// Apply a partial flag update. Returns `None` when the id is unknown.
    pub async fn update_flags(
        &self,
        id: &str,
        flags: &ConversationFlags,
        now: &str,
    ) -> DatabaseResult<Option<Conversation>> {
        let sql = format!(
            "UPDATE conversations SET
                is_starred = COALESCE(?, is_starred),
                is_archived = COALESCE(?, is_archived),
                priority = COALESCE(?, priority),
                updated_at = ?
             WHERE id = ?
             RETURNING {CONVERSATION_COLUMNS}"
        );

        let row = sqlx::query(&sql)
            .bind(flags.starred)
            .bind(flags.archived)
            .bind(flags.priority.map(|priority| priority.as_str()))
            .bind(now)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(map_conversation).transpose()
    }

    /// Hard delete a conversation with its messages, reactions and stars.
    ///
    /// Returns `false` when nothing was deleted.
    pub async fn delete(&self, id: &str) -> DatabaseResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM message_reactions
             WHERE message_id IN (SELECT id FROM messages WHERE conversation_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "DELETE FROM message_stars
             WHERE message_id IN (SELECT id FROM messages WHERE conversation_id = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        info!(conversation_id = %id, "deleted conversation");
        Ok(true)
    }

    /// Record the latest message on the conversation row.
    pub async fn touch_last_message(
        conn: &mut SqliteConnection,
        id: &str,
        preview: &str,
        at: &str,
    ) -> DatabaseResult<()> {
        sqlx::query(
            "UPDATE conversations
             SET last_message_preview = ?, last_message_at = ?, updated_at = MAX(updated_at, ?), is_active = true
             WHERE id = ?",
        )
        .bind(preview)
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Replace the preview without moving `last_message_at`.
    pub async fn refresh_preview(
        conn: &mut SqliteConnection,
        id: &str,
        preview: Option<&str>,
        at: &str,
    ) -> DatabaseResult<()> {
        sqlx::query(
            "UPDATE conversations
             SET last_message_preview = ?, updated_at = MAX(updated_at, ?)
             WHERE id = ?",
        )
        .bind(preview)
        .bind(at)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// All conversations, for operator tooling.
    pub async fn list_all(&self) -> DatabaseResult<Vec<Conversation>> {
        let sql = format!("SELECT {CONVERSATION_COLUMNS} FROM conversations ORDER BY created_at, seq");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(map_conversation).collect()
    }
}

pub(crate) fn map_conversation(row: &SqliteRow) -> DatabaseResult<Conversation> {
    let priority: String = row.try_get("priority")?;

    Ok(Conversation {
        id: row.try_get("id")?,
        participant_a: row.try_get("participant_a")?,
        participant_b: row.try_get("participant_b")?,
        last_message_preview: row.try_get("last_message_preview")?,
        last_message_at: row.try_get("last_message_at")?,
        unread_count_a: row.try_get("unread_count_a")?,
        unread_count_b: row.try_get("unread_count_b")?,
        is_starred: row.try_get("is_starred")?,
        is_archived: row.try_get("is_archived")?,
        is_active: row.try_get("is_active")?,
        priority: Priority::from(priority.as_str()),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
