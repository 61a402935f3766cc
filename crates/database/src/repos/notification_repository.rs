//! Repository for notification data access operations.

use crate::entities::{EventPriority, NewNotification, Notification, NotificationStatus, Urgency};
use crate::types::DatabaseResult;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use tracing::{debug, info};

const NOTIFICATION_COLUMNS: &str =
    "id, kind, title, message, subject_ref, priority, urgency, status, created_at, read_at";

/// Repository for notification database operations
#[derive(Clone)]
pub struct NotificationRepository {
    pool: SqlitePool,
}

impl NotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a notification keyed by its id. An existing row with the same id
    /// is returned untouched and `false` reports that nothing was inserted.
    pub async fn insert_if_absent(
        &self,
        notification: &NewNotification,
        now: &str,
    ) -> DatabaseResult<(Notification, bool)> {
        let result = sqlx::query(
            "INSERT INTO notifications (id, kind, title, message, subject_ref, priority, urgency, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(&notification.id)
        .bind(&notification.kind)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.subject_ref)
        .bind(notification.priority.as_str())
        .bind(notification.priority.urgency().as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() == 1;
        let stored = self.find_by_id(&notification.id).await?.ok_or_else(|| {
            crate::types::DatabaseError::NotFound(format!("notification {}", notification.id))
        })?;

        if created {
            info!(
                notification_id = %stored.id,
                kind = %stored.kind,
                urgency = stored.urgency.as_str(),
                "stored notification"
            );
        }

        Ok((stored, created))
    }

    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<Notification>> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(map_notification).transpose()
    }

    /// Newest first, optionally restricted to one status.
    pub async fn list(
        &self,
        status: Option<NotificationStatus>,
        limit: i64,
    ) -> DatabaseResult<Vec<Notification>> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                     WHERE status = ? ORDER BY created_at DESC, seq DESC LIMIT ?"
                );
                sqlx::query(&sql)
                    .bind(status.as_str())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {NOTIFICATION_COLUMNS} FROM notifications
                     ORDER BY created_at DESC, seq DESC LIMIT ?"
                );
                sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?
            }
        };

        rows.iter().map(map_notification).collect()
    }

    /// Mark one notification read. The first `read_at` is kept on repeats.
    pub async fn mark_read(&self, id: &str, now: &str) -> DatabaseResult<Option<Notification>> {
        let sql = format!(
            "UPDATE notifications SET status = 'read', read_at = COALESCE(read_at, ?)
             WHERE id = ?
             RETURNING {NOTIFICATION_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(now)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_notification).transpose()
    }

    pub async fn mark_all_read(&self, now: &str) -> DatabaseResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'read', read_at = ? WHERE status = 'unread'",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!(changed = result.rows_affected(), "marked all notifications read");
        Ok(result.rows_affected())
    }

    pub async fn delete(&self, id: &str) -> DatabaseResult<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn unread_count(&self) -> DatabaseResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE status = 'unread'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}

fn map_notification(row: &SqliteRow) -> DatabaseResult<Notification> {
    let priority: String = row.try_get("priority")?;
    let urgency: String = row.try_get("urgency")?;
    let status: String = row.try_get("status")?;

    Ok(Notification {
        id: row.try_get("id")?,
        kind: row.try_get("kind")?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        subject_ref: row.try_get("subject_ref")?,
        priority: EventPriority::from(priority.as_str()),
        urgency: Urgency::from(urgency.as_str()),
        status: NotificationStatus::from(status.as_str()),
        created_at: row.try_get("created_at")?,
        read_at: row.try_get("read_at")?,
    })
}
