//! Notification REST endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use courier_database::{EventPriority, Notification, NotificationStatus};
use courier_messaging::DomainEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::error::{ErrorResponse, GatewayResult};
use crate::state::GatewayState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct NotificationResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    pub subject_ref: Option<String>,
    pub priority: String,
    /// `normal` or `high`, derived from the priority.
    pub urgency: String,
    pub status: String,
    pub created_at: String,
    pub read_at: Option<String>,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            subject_ref: notification.subject_ref,
            priority: notification.priority.as_str().to_string(),
            urgency: notification.urgency.as_str().to_string(),
            status: notification.status.as_str().to_string(),
            created_at: notification.created_at,
            read_at: notification.read_at,
        }
    }
}

/// A domain event from the inbound feed, e.g. a report filed for a batch.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DomainEventRequest {
    /// Idempotency key; re-posting the same id returns the stored record.
    pub event_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    pub subject_ref: Option<String>,
    #[serde(default)]
    #[schema(value_type = String, example = "high")]
    pub priority: EventPriority,
}

impl From<DomainEventRequest> for DomainEvent {
    fn from(request: DomainEventRequest) -> Self {
        Self {
            event_id: request.event_id,
            kind: request.kind,
            title: request.title,
            message: request.message,
            subject_ref: request.subject_ref,
            priority: request.priority,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListNotificationsQuery {
    /// `unread` or `read`.
    #[param(value_type = Option<String>)]
    #[schema(value_type = Option<String>)]
    pub status: Option<NotificationStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnreadCountResponse {
    pub unread_count: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub marked_read: u64,
}

/// Create notification routes
pub fn create_notification_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/events", post(dispatch_event))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", post(mark_all_notifications_read))
        .route("/notifications/:notification_id/read", post(mark_notification_read))
        .route("/notifications/:notification_id", delete(delete_notification))
}

#[utoipa::path(
    post,
    path = "/api/notifications/events",
    tag = "notifications",
    request_body = DomainEventRequest,
    responses(
        (status = 200, description = "Notification derived from the event", body = NotificationResponse),
        (status = 400, description = "Missing type or title", body = ErrorResponse)
    )
)]
pub async fn dispatch_event(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<DomainEventRequest>,
) -> GatewayResult<Json<NotificationResponse>> {
    let notification = state.core.notifications().dispatch(request.into()).await?;
    Ok(Json(NotificationResponse::from(notification)))
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "notifications",
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "Notifications, newest first", body = Vec<NotificationResponse>)
    )
)]
pub async fn list_notifications(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<ListNotificationsQuery>,
) -> GatewayResult<Json<Vec<NotificationResponse>>> {
    let notifications = state
        .core
        .notifications()
        .list(params.status, params.limit)
        .await?;

    Ok(Json(notifications.into_iter().map(NotificationResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    tag = "notifications",
    responses(
        (status = 200, description = "Number of unread notifications", body = UnreadCountResponse)
    )
)]
pub async fn unread_count(State(state): State<Arc<GatewayState>>) -> GatewayResult<Json<UnreadCountResponse>> {
    let unread_count = state.core.notifications().unread_count().await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

#[utoipa::path(
    post,
    path = "/api/notifications/{notification_id}/read",
    tag = "notifications",
    params(("notification_id" = String, Path, description = "Notification id")),
    responses(
        (status = 200, description = "Notification marked read", body = NotificationResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    )
)]
pub async fn mark_notification_read(
    State(state): State<Arc<GatewayState>>,
    Path(notification_id): Path<String>,
) -> GatewayResult<Json<NotificationResponse>> {
    let notification = state.core.notifications().mark_read(&notification_id).await?;
    Ok(Json(NotificationResponse::from(notification)))
}

#[utoipa::path(
    post,
    path = "/api/notifications/read-all",
    tag = "notifications",
    responses(
        (status = 200, description = "Unread notifications marked read", body = MarkAllReadResponse)
    )
)]
pub async fn mark_all_notifications_read(
    State(state): State<Arc<GatewayState>>,
) -> GatewayResult<Json<MarkAllReadResponse>> {
    let marked_read = state.core.notifications().mark_all_read().await?;
    Ok(Json(MarkAllReadResponse { marked_read }))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{notification_id}",
    tag = "notifications",
    params(("notification_id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    )
)]
pub async fn delete_notification(
    State(state): State<Arc<GatewayState>>,
    Path(notification_id): Path<String>,
) -> GatewayResult<StatusCode> {
    state.core.notifications().delete(&notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
