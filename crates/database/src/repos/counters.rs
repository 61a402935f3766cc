//! Unread counter primitives.
//!
//! These are the only statements that write the `unread_count_*` columns.
//! Each one is a single `UPDATE` executed on the caller's connection, so it
//! commits or rolls back together with the message write that triggered it.

use crate::entities::Side;
use crate::types::{DatabaseError, DatabaseResult};
use sqlx::{Executor, Sqlite, SqliteConnection};

pub struct UnreadCounters;

impl UnreadCounters {
    /// Add one unread message for `side`.
    pub async fn increment(
        conn: &mut SqliteConnection,
        conversation_id: &str,
        side: Side,
        now: &str,
    ) -> DatabaseResult<()> {
        let column = side.unread_column();
        let sql = format!(
            "UPDATE conversations SET {column} = {column} + 1, updated_at = MAX(updated_at, ?) WHERE id = ?"
        );
        Self::apply(conn, &sql, conversation_id, now).await
    }

    /// Zero the counter for `side`. Never decrements by a computed amount.
    pub async fn reset(
        conn: &mut SqliteConnection,
        conversation_id: &str,
        side: Side,
        now: &str,
    ) -> DatabaseResult<()> {
        let column = side.unread_column();
        let sql = format!("UPDATE conversations SET {column} = 0, updated_at = MAX(updated_at, ?) WHERE id = ?");
        Self::apply(conn, &sql, conversation_id, now).await
    }

    /// Give back one unit when an unread message is retracted.
    pub async fn release(
        conn: &mut SqliteConnection,
        conversation_id: &str,
        side: Side,
        now: &str,
    ) -> DatabaseResult<()> {
        let column = side.unread_column();
        let sql = format!(
            "UPDATE conversations SET {column} = MAX({column} - 1, 0), updated_at = MAX(updated_at, ?) WHERE id = ?"
        );
        Self::apply(conn, &sql, conversation_id, now).await
    }

    /// Count the messages that are actually unread for `participant_id`.
    ///
    /// Read-only; used to audit the stored counters.
    pub async fn recount<'e, E>(
        executor: E,
        conversation_id: &str,
        participant_id: &str,
    ) -> DatabaseResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages
             WHERE conversation_id = ? AND receiver_id = ? AND is_read = false AND is_deleted = false",
        )
        .bind(conversation_id)
        .bind(participant_id)
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    async fn apply(
        conn: &mut SqliteConnection,
        sql: &str,
        conversation_id: &str,
        now: &str,
    ) -> DatabaseResult<()> {
        let result = sqlx::query(sql)
            .bind(now)
            .bind(conversation_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }

        Ok(())
    }
}
