//! Message REST endpoints

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use courier_database::{Attachment, Message, MessageType, Priority};
use courier_messaging::{MessagingError, OutgoingMessage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::error::{ErrorResponse, GatewayResult};
use crate::middleware::Caller;
use crate::state::GatewayState;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttachmentPayload {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub url: String,
    #[serde(default)]
    pub size_bytes: i64,
}

impl From<Attachment> for AttachmentPayload {
    fn from(attachment: Attachment) -> Self {
        Self {
            id: attachment.id,
            name: attachment.name,
            mime_type: attachment.mime_type,
            url: attachment.url,
            size_bytes: attachment.size_bytes,
        }
    }
}

impl From<AttachmentPayload> for Attachment {
    fn from(payload: AttachmentPayload) -> Self {
        Self {
            id: payload.id,
            name: payload.name,
            mime_type: payload.mime_type,
            url: payload.url,
            size_bytes: payload.size_bytes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub seq: i64,
    pub conversation_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub attachments: Vec<AttachmentPayload>,
    pub message_type: String,
    pub priority: String,
    pub is_read: bool,
    pub is_admin_origin: bool,
    pub reply_to_id: Option<String>,
    pub reactions: BTreeMap<String, i64>,
    pub star_count: i64,
    pub is_deleted: bool,
    pub deleted_at: Option<String>,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            seq: message.seq,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            attachments: message.attachments.into_iter().map(Into::into).collect(),
            message_type: message.message_type.as_str().to_string(),
            priority: message.priority.as_str().to_string(),
            is_read: message.is_read,
            is_admin_origin: message.is_admin_origin,
            reply_to_id: message.reply_to_id,
            reactions: message.reactions,
            star_count: message.star_count,
            is_deleted: message.is_deleted,
            deleted_at: message.deleted_at,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[schema(value_type = Option<String>, example = "text")]
    pub message_type: Option<MessageType>,
    #[schema(value_type = Option<String>, example = "normal")]
    pub priority: Option<Priority>,
    pub reply_to_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListMessagesQuery {
    /// Only messages after this one.
    pub since_id: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadReceiptResponse {
    pub conversation_id: String,
    /// Messages flipped to read by this call.
    pub marked_read: u64,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReactionRequest {
    pub emoji: String,
}

/// Create message routes
pub fn create_message_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route(
            "/conversations/:conversation_id/messages",
            get(list_messages).post(send_message),
        )
        .route("/conversations/:conversation_id/read", post(mark_conversation_read))
        .route("/messages/:message_id", delete(delete_message))
        .route("/messages/:message_id/reactions", post(react_to_message))
        .route("/messages/:message_id/star", post(star_message))
}

#[utoipa::path(
    get,
    path = "/api/conversations/{conversation_id}/messages",
    tag = "messages",
    params(
        ("conversation_id" = String, Path, description = "Conversation id"),
        ListMessagesQuery
    ),
    responses(
        (status = 200, description = "Messages in (created_at, seq) order", body = Vec<MessageResponse>),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation or since message not found", body = ErrorResponse)
    )
)]
pub async fn list_messages(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Path(conversation_id): Path<String>,
    Query(params): Query<ListMessagesQuery>,
) -> GatewayResult<Json<Vec<MessageResponse>>> {
    state
        .core
        .registry()
        .get_for_participant(&conversation_id, caller.id())
        .await?;

    let messages = state
        .core
        .messages()
        .list_by_conversation(&conversation_id, params.since_id.as_deref(), params.limit)
        .await?;

    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{conversation_id}/messages",
    tag = "messages",
    params(("conversation_id" = String, Path, description = "Conversation id")),
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Stored message", body = MessageResponse),
        (status = 400, description = "Empty or oversized message", body = ErrorResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 422, description = "Reply target outside this conversation", body = ErrorResponse),
        (status = 503, description = "Store unavailable, message not sent", body = ErrorResponse),
        (status = 504, description = "Deadline expired", body = ErrorResponse)
    )
)]
pub async fn send_message(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Path(conversation_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> GatewayResult<Json<MessageResponse>> {
    let conversation = state
        .core
        .registry()
        .get_for_participant(&conversation_id, caller.id())
        .await?;
    let receiver_id = conversation
        .counterpart(caller.id())
        .ok_or_else(|| MessagingError::forbidden("caller is not a participant"))?;

    let mut outgoing = OutgoingMessage::text(&conversation.id, caller.id(), receiver_id, request.content)
        .with_attachments(request.attachments.into_iter().map(Into::into).collect());
    if let Some(message_type) = request.message_type {
        outgoing = outgoing.with_type(message_type);
    }
    if let Some(priority) = request.priority {
        outgoing = outgoing.with_priority(priority);
    }
    if let Some(reply_to_id) = request.reply_to_id {
        outgoing = outgoing.replying_to(reply_to_id);
    }

    let message = state.core.messages().append(outgoing).await?;
    Ok(Json(MessageResponse::from(message)))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{conversation_id}/read",
    tag = "messages",
    params(("conversation_id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Caller's side marked read", body = ReadReceiptResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    )
)]
pub async fn mark_conversation_read(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Path(conversation_id): Path<String>,
) -> GatewayResult<Json<ReadReceiptResponse>> {
    let messages = state.core.messages();
    let marked_read = messages.mark_read(&conversation_id, caller.id()).await?;
    let unread_count = messages.unread_count(&conversation_id, caller.id()).await?;

    Ok(Json(ReadReceiptResponse {
        conversation_id,
        marked_read,
        unread_count,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/messages/{message_id}",
    tag = "messages",
    params(("message_id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Tombstoned message", body = MessageResponse),
        (status = 403, description = "Only the sender may delete", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn delete_message(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Path(message_id): Path<String>,
) -> GatewayResult<Json<MessageResponse>> {
    let message = state.core.messages().soft_delete(&message_id, caller.id()).await?;
    Ok(Json(MessageResponse::from(message)))
}

#[utoipa::path(
    post,
    path = "/api/messages/{message_id}/reactions",
    tag = "messages",
    params(("message_id" = String, Path, description = "Message id")),
    request_body = ReactionRequest,
    responses(
        (status = 200, description = "Message with updated reactions", body = MessageResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn react_to_message(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Path(message_id): Path<String>,
    Json(request): Json<ReactionRequest>,
) -> GatewayResult<Json<MessageResponse>> {
    let message = state
        .core
        .messages()
        .react(&message_id, caller.id(), &request.emoji)
        .await?;
    Ok(Json(MessageResponse::from(message)))
}

#[utoipa::path(
    post,
    path = "/api/messages/{message_id}/star",
    tag = "messages",
    params(("message_id" = String, Path, description = "Message id")),
    responses(
        (status = 200, description = "Message with updated star count", body = MessageResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Message not found", body = ErrorResponse)
    )
)]
pub async fn star_message(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Path(message_id): Path<String>,
) -> GatewayResult<Json<MessageResponse>> {
    let message = state.core.messages().star(&message_id, caller.id()).await?;
    Ok(Json(MessageResponse::from(message)))
}
