//! # Courier Gateway Crate
//!
//! HTTP REST and WebSocket surface over the messaging core.
//!
//! ## Architecture
//!
//! - **REST**: conversation, message, broadcast and notification endpoints with OpenAPI documentation
//! - **WebSocket**: realtime delta stream with resync
//! - **State**: the shared [`MessagingCore`](courier_messaging::MessagingCore)
//! - **Middleware**: caller identification, CORS and request tracing
//!
//! ## Usage
//!
//! ```rust,no_run
//! use courier_config::MessagingConfig;
//! use courier_gateway::{create_router, GatewayState};
//!
//! # async fn run(pool: sqlx::SqlitePool) -> std::io::Result<()> {
//! let state = GatewayState::from_pool(pool, &MessagingConfig::default());
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:7070").await?;
//! axum::serve(listener, create_router(state)).await
//! # }
//! ```

pub mod error;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod websocket;

pub use error::{ErrorResponse, GatewayError, GatewayResult};
pub use middleware::{caller_middleware, Caller, PARTICIPANT_HEADER};
pub use state::GatewayState;

use axum::{http::Method, routing::get, Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        rest::health::health_check,
        rest::conversations::list_conversations,
        rest::conversations::create_conversation,
        rest::conversations::get_conversation,
        rest::conversations::update_conversation,
        rest::conversations::delete_conversation,
        rest::messages::list_messages,
        rest::messages::send_message,
        rest::messages::mark_conversation_read,
        rest::messages::delete_message,
        rest::messages::react_to_message,
        rest::messages::star_message,
        rest::broadcasts::create_broadcast,
        rest::notifications::dispatch_event,
        rest::notifications::list_notifications,
        rest::notifications::unread_count,
        rest::notifications::mark_notification_read,
        rest::notifications::mark_all_notifications_read,
        rest::notifications::delete_notification,
    ),
    components(
        schemas(
            ErrorResponse,
            rest::health::HealthResponse,
            rest::conversations::ConversationResponse,
            rest::conversations::CreateConversationRequest,
            rest::conversations::UpdateConversationRequest,
            rest::conversations::ListConversationsQuery,
            rest::messages::AttachmentPayload,
            rest::messages::MessageResponse,
            rest::messages::SendMessageRequest,
            rest::messages::ListMessagesQuery,
            rest::messages::ReadReceiptResponse,
            rest::messages::ReactionRequest,
            rest::broadcasts::CreateBroadcastRequest,
            rest::broadcasts::BroadcastSummaryResponse,
            rest::broadcasts::DeliveryResponse,
            rest::broadcasts::FailedDeliveryResponse,
            rest::notifications::NotificationResponse,
            rest::notifications::DomainEventRequest,
            rest::notifications::ListNotificationsQuery,
            rest::notifications::UnreadCountResponse,
            rest::notifications::MarkAllReadResponse,
        )
    ),
    tags(
        (name = "health", description = "Liveness and store reachability"),
        (name = "conversations", description = "Two-party conversations"),
        (name = "messages", description = "Messages, read receipts, reactions and stars"),
        (name = "broadcasts", description = "One message to many recipients"),
        (name = "notifications", description = "Notifications derived from domain events"),
    )
)]
pub struct ApiDoc;

/// Create the main application router with all routes
pub fn create_router(state: GatewayState) -> Router {
    let arc_state = Arc::new(state);

    Router::new()
        .merge(rest::create_rest_routes(arc_state.clone()).with_state(arc_state.clone()))
        .merge(websocket::create_websocket_routes().with_state(arc_state))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_headers(Any),
        )
        .layer(middleware::create_trace_middleware())
}
