//! Middleware for caller identification and request tracing

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use courier_database::Participant;
use courier_messaging::ParticipantDirectory;
use std::sync::Arc;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;

/// Header carrying the calling participant's id.
pub const PARTICIPANT_HEADER: &str = "x-participant-id";

/// The participant a request acts on behalf of.
#[derive(Debug, Clone)]
pub struct Caller(pub Participant);

impl Caller {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

/// Resolve `x-participant-id` against the directory and attach the [`Caller`].
///
/// The id is trusted as supplied; unknown ids are rejected with 404.
pub async fn caller_middleware(
    State(state): State<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, GatewayError> {
    let participant_id = participant_header(request.headers())?;
    let participant = state
        .core
        .directory()
        .resolve_participant(&participant_id)
        .await?;

    request.extensions_mut().insert(Caller(participant));
    Ok(next.run(request).await)
}

fn participant_header(headers: &HeaderMap) -> GatewayResult<String> {
    headers
        .get(PARTICIPANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::MissingCaller(format!("{PARTICIPANT_HEADER} header is required")))
}

/// Create tracing middleware
pub fn create_trace_middleware(
) -> TraceLayer<tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO))
}
