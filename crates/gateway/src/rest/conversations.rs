//! Conversation REST endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use courier_database::{Conversation, ConversationFilter, ConversationFlags, Priority};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::middleware::Caller;
use crate::state::GatewayState;

/// A conversation as seen by one of its participants.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConversationResponse {
    pub id: String,
    pub participant_a: String,
    pub participant_b: String,
    /// The other participant, relative to the caller.
    pub counterpart_id: String,
    /// The caller's own unread counter.
    pub unread_count: i64,
    pub unread_count_a: i64,
    pub unread_count_b: i64,
    pub last_message_preview: Option<String>,
    pub last_message_at: Option<String>,
    pub is_starred: bool,
    pub is_archived: bool,
    pub is_active: bool,
    pub priority: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ConversationResponse {
    pub fn for_caller(conversation: Conversation, caller_id: &str) -> Self {
        let counterpart_id = conversation.counterpart(caller_id).unwrap_or_default().to_string();
        let unread_count = conversation.unread_for(caller_id).unwrap_or_default();

        Self {
            counterpart_id,
            unread_count,
            priority: conversation.priority.as_str().to_string(),
            id: conversation.id,
            participant_a: conversation.participant_a,
            participant_b: conversation.participant_b,
            unread_count_a: conversation.unread_count_a,
            unread_count_b: conversation.unread_count_b,
            last_message_preview: conversation.last_message_preview,
            last_message_at: conversation.last_message_at,
            is_starred: conversation.is_starred,
            is_archived: conversation.is_archived,
            is_active: conversation.is_active,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateConversationRequest {
    /// The participant to start a conversation with.
    pub participant_id: String,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateConversationRequest {
    pub starred: Option<bool>,
    pub archived: Option<bool>,
    #[schema(value_type = Option<String>, example = "urgent")]
    pub priority: Option<Priority>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListConversationsQuery {
    /// One of `all`, `unread`, `starred`, `archived`, `urgent`.
    pub filter: Option<String>,
}

/// Create conversation routes
pub fn create_conversation_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/conversations", get(list_conversations).post(create_conversation))
        .route(
            "/conversations/:conversation_id",
            get(get_conversation)
                .patch(update_conversation)
                .delete(delete_conversation),
        )
}

#[utoipa::path(
    get,
    path = "/api/conversations",
    tag = "conversations",
    params(ListConversationsQuery),
    responses(
        (status = 200, description = "Conversations of the caller", body = Vec<ConversationResponse>),
        (status = 400, description = "Unknown filter", body = ErrorResponse),
        (status = 401, description = "Missing caller", body = ErrorResponse)
    )
)]
pub async fn list_conversations(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<ListConversationsQuery>,
) -> GatewayResult<Json<Vec<ConversationResponse>>> {
    let filter = match params.filter.as_deref() {
        Some(filter) => filter
            .parse::<ConversationFilter>()
            .map_err(GatewayError::InvalidRequest)?,
        None => ConversationFilter::All,
    };

    let conversations = state.core.registry().list(caller.id(), filter).await?;
    Ok(Json(
        conversations
            .into_iter()
            .map(|conversation| ConversationResponse::for_caller(conversation, caller.id()))
            .collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/api/conversations",
    tag = "conversations",
    request_body = CreateConversationRequest,
    responses(
        (status = 200, description = "Existing or newly created conversation", body = ConversationResponse),
        (status = 404, description = "Unknown participant", body = ErrorResponse),
        (status = 422, description = "Conversation with oneself", body = ErrorResponse)
    )
)]
pub async fn create_conversation(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateConversationRequest>,
) -> GatewayResult<Json<ConversationResponse>> {
    let conversation = state
        .core
        .registry()
        .get_or_create(caller.id(), &request.participant_id)
        .await?;

    Ok(Json(ConversationResponse::for_caller(conversation, caller.id())))
}

#[utoipa::path(
    get,
    path = "/api/conversations/{conversation_id}",
    tag = "conversations",
    params(("conversation_id" = String, Path, description = "Conversation id")),
    responses(
        (status = 200, description = "Conversation details", body = ConversationResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    )
)]
pub async fn get_conversation(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Path(conversation_id): Path<String>,
) -> GatewayResult<Json<ConversationResponse>> {
    let conversation = state
        .core
        .registry()
        .get_for_participant(&conversation_id, caller.id())
        .await?;

    Ok(Json(ConversationResponse::for_caller(conversation, caller.id())))
}

#[utoipa::path(
    patch,
    path = "/api/conversations/{conversation_id}",
    tag = "conversations",
    params(("conversation_id" = String, Path, description = "Conversation id")),
    request_body = UpdateConversationRequest,
    responses(
        (status = 200, description = "Updated conversation", body = ConversationResponse),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    )
)]
pub async fn update_conversation(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Path(conversation_id): Path<String>,
    Json(request): Json<UpdateConversationRequest>,
) -> GatewayResult<Json<ConversationResponse>> {
    let registry = state.core.registry();
    registry
        .get_for_participant(&conversation_id, caller.id())
        .await?;

    let flags = ConversationFlags {
        starred: request.starred,
        archived: request.archived,
        priority: request.priority,
    };
    let conversation = registry.set_flags(&conversation_id, flags).await?;

    Ok(Json(ConversationResponse::for_caller(conversation, caller.id())))
}

#[utoipa::path(
    delete,
    path = "/api/conversations/{conversation_id}",
    tag = "conversations",
    params(("conversation_id" = String, Path, description = "Conversation id")),
    responses(
        (status = 204, description = "Conversation and its messages deleted"),
        (status = 403, description = "Caller is not a participant", body = ErrorResponse),
        (status = 404, description = "Conversation not found", body = ErrorResponse)
    )
)]
pub async fn delete_conversation(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Path(conversation_id): Path<String>,
) -> GatewayResult<StatusCode> {
    let registry = state.core.registry();
    registry
        .get_for_participant(&conversation_id, caller.id())
        .await?;
    registry.delete(&conversation_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
