//! REST API endpoints for the gateway

pub mod broadcasts;
pub mod conversations;
pub mod health;
pub mod messages;
pub mod notifications;

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;

use crate::middleware::caller_middleware;
use crate::state::GatewayState;

/// Create all REST API routes
pub fn create_rest_routes(state: Arc<GatewayState>) -> Router<Arc<GatewayState>> {
    // Conversation-scoped routes act on behalf of a known participant
    let participant_routes = Router::new()
        .merge(conversations::create_conversation_routes())
        .merge(messages::create_message_routes())
        .merge(broadcasts::create_broadcast_routes())
        .route_layer(axum_middleware::from_fn_with_state(state, caller_middleware));

    Router::new()
        .route("/health", get(health::health_check))
        .nest(
            "/api",
            Router::new()
                .merge(participant_routes)
                .merge(notifications::create_notification_routes()),
        )
}

pub use broadcasts::*;
pub use conversations::*;
pub use health::*;
pub use messages::*;
pub use notifications::*;
