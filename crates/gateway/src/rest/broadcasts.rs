//! Broadcast REST endpoint

use axum::{extract::State, routing::post, Extension, Json, Router};
use courier_database::{MessageType, Priority};
use courier_messaging::{BroadcastRequest, BroadcastSummary, Delivery, FailedDelivery};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::{ErrorResponse, GatewayResult};
use crate::middleware::Caller;
use crate::rest::messages::AttachmentPayload;
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBroadcastRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    pub recipient_ids: Vec<String>,
    #[schema(value_type = Option<String>, example = "system")]
    pub message_type: Option<MessageType>,
    #[schema(value_type = Option<String>, example = "high")]
    pub priority: Option<Priority>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeliveryResponse {
    pub recipient_id: String,
    pub conversation_id: String,
    pub message_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FailedDeliveryResponse {
    pub recipient_id: String,
    pub error_kind: String,
    pub message: String,
    pub attempts: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BroadcastSummaryResponse {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedDeliveryResponse>,
    pub delivered: Vec<DeliveryResponse>,
}

impl From<Delivery> for DeliveryResponse {
    fn from(delivery: Delivery) -> Self {
        Self {
            recipient_id: delivery.recipient_id,
            conversation_id: delivery.conversation_id,
            message_id: delivery.message_id,
        }
    }
}

impl From<FailedDelivery> for FailedDeliveryResponse {
    fn from(failure: FailedDelivery) -> Self {
        Self {
            recipient_id: failure.recipient_id,
            error_kind: failure.error_kind.as_str().to_string(),
            message: failure.message,
            attempts: failure.attempts,
        }
    }
}

impl From<BroadcastSummary> for BroadcastSummaryResponse {
    fn from(summary: BroadcastSummary) -> Self {
        Self {
            requested: summary.requested,
            succeeded: summary.succeeded,
            failed: summary.failed.into_iter().map(Into::into).collect(),
            delivered: summary.delivered.into_iter().map(Into::into).collect(),
        }
    }
}

/// Create broadcast routes
pub fn create_broadcast_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/broadcasts", post(create_broadcast))
}

#[utoipa::path(
    post,
    path = "/api/broadcasts",
    tag = "broadcasts",
    request_body = CreateBroadcastRequest,
    responses(
        (status = 200, description = "Per-recipient outcome; partial failure is not an error", body = BroadcastSummaryResponse),
        (status = 401, description = "Missing caller", body = ErrorResponse)
    )
)]
pub async fn create_broadcast(
    State(state): State<Arc<GatewayState>>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateBroadcastRequest>,
) -> GatewayResult<Json<BroadcastSummaryResponse>> {
    let broadcast = BroadcastRequest {
        sender_id: caller.id().to_string(),
        content: request.content,
        attachments: request.attachments.into_iter().map(Into::into).collect(),
        recipient_ids: request.recipient_ids,
        message_type: request.message_type,
        priority: request.priority,
    };

    let summary = state.core.broadcasts().broadcast(broadcast).await;
    Ok(Json(BroadcastSummaryResponse::from(summary)))
}
