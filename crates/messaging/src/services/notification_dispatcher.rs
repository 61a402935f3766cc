//! Notification dispatcher: domain events in, notification records out.

use super::deadline::with_deadline;
use crate::clock::Clock;
use crate::realtime::FanoutHub;
use crate::types::{Delta, MessagingError, MessagingResult};
use crate::utils::require_non_empty;
use courier_database::{
    EventPriority, NewNotification, Notification, NotificationRepository, NotificationStatus,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 1000;

/// An event from the domain feed, e.g. a report being filed for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Idempotency key. Becomes the notification id when present.
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub subject_ref: Option<String>,
    #[serde(default)]
    pub priority: EventPriority,
}

impl DomainEvent {
    pub fn new(kind: impl Into<String>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_id: None,
            kind: kind.into(),
            title: title.into(),
            message: message.into(),
            subject_ref: None,
            priority: EventPriority::Normal,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    pub fn with_subject(mut self, subject_ref: impl Into<String>) -> Self {
        self.subject_ref = Some(subject_ref.into());
        self
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }
}

pub struct NotificationDispatcher {
    notifications: NotificationRepository,
    hub: FanoutHub,
    clock: Arc<dyn Clock>,
    operation_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(pool: SqlitePool, hub: FanoutHub, clock: Arc<dyn Clock>, operation_timeout: Duration) -> Self {
        Self {
            notifications: NotificationRepository::new(pool),
            hub,
            clock,
            operation_timeout,
        }
    }

    /// Turn an event into a notification. Urgency is derived from priority.
    ///
    /// Re-dispatching an event with a known `event_id` returns the stored
    /// record and publishes nothing.
    pub async fn dispatch(&self, event: DomainEvent) -> MessagingResult<Notification> {
        require_non_empty("type", &event.kind)?;
        require_non_empty("title", &event.title)?;
        if let Some(event_id) = &event.event_id {
            require_non_empty("event_id", event_id)?;
        }

        let record = NewNotification {
            id: event.event_id.unwrap_or_else(cuid2::create_id),
            kind: event.kind,
            title: event.title,
            message: event.message,
            subject_ref: event.subject_ref,
            priority: event.priority,
        };

        let now = self.clock.timestamp();
        let (notification, created) = with_deadline("dispatch_notification", self.operation_timeout, async {
            self.notifications.insert_if_absent(&record, &now).await.map_err(MessagingError::from)
        })
        .await?;

        if created {
            info!(
                notification_id = %notification.id,
                kind = %notification.kind,
                urgency = notification.urgency.as_str(),
                "dispatched notification"
            );
            self.hub
                .publish_notification(Delta::NotificationCreated {
                    notification: notification.clone(),
                })
                .await;
        }

        Ok(notification)
    }

    /// Newest first.
    pub async fn list(
        &self,
        status: Option<NotificationStatus>,
        limit: Option<i64>,
    ) -> MessagingResult<Vec<Notification>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        with_deadline("list_notifications", self.operation_timeout, async {
            self.notifications.list(status, limit).await.map_err(MessagingError::from)
        })
        .await
    }

    pub async fn get(&self, id: &str) -> MessagingResult<Notification> {
        with_deadline("get_notification", self.operation_timeout, async {
            self.notifications
                .find_by_id(id)
                .await?
                .ok_or_else(|| MessagingError::not_found("notification", id))
        })
        .await
    }

    /// Idempotent: an already-read notification keeps its first `read_at`.
    pub async fn mark_read(&self, id: &str) -> MessagingResult<Notification> {
        let current = self.get(id).await?;
        if current.status == NotificationStatus::Read {
            return Ok(current);
        }

        let now = self.clock.timestamp();
        let notification = with_deadline("mark_notification_read", self.operation_timeout, async {
            self.notifications
                .mark_read(id, &now)
                .await?
                .ok_or_else(|| MessagingError::not_found("notification", id))
        })
        .await?;

        self.hub
            .publish_notification(Delta::NotificationUpdated {
                notification: notification.clone(),
            })
            .await;
        Ok(notification)
    }

    pub async fn mark_all_read(&self) -> MessagingResult<u64> {
        let now = self.clock.timestamp();
        let count = with_deadline("mark_all_notifications_read", self.operation_timeout, async {
            self.notifications.mark_all_read(&now).await.map_err(MessagingError::from)
        })
        .await?;

        if count > 0 {
            info!(count, "marked all notifications read");
            self.hub
                .publish_notification(Delta::NotificationsRead { read_at: now, count })
                .await;
        }
        Ok(count)
    }

    pub async fn delete(&self, id: &str) -> MessagingResult<()> {
        let deleted = with_deadline("delete_notification", self.operation_timeout, async {
            self.notifications.delete(id).await.map_err(MessagingError::from)
        })
        .await?;

        if !deleted {
            return Err(MessagingError::not_found("notification", id));
        }

        info!(notification_id = %id, "deleted notification");
        self.hub
            .publish_notification(Delta::NotificationDeleted {
                notification_id: id.to_string(),
            })
            .await;
        Ok(())
    }

    pub async fn unread_count(&self) -> MessagingResult<i64> {
        with_deadline("notification_unread_count", self.operation_timeout, async {
            self.notifications.unread_count().await.map_err(MessagingError::from)
        })
        .await
    }
}
