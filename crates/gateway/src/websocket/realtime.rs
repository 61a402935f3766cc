//! Realtime WebSocket handler
//!
//! One socket per participant. The socket carries the participant's
//! conversation deltas and the global notification feed. When a subscription
//! falls behind it is reported as `disconnected` and re-attached; the client
//! then asks for a `resync`.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use courier_database::Participant;
use courier_messaging::{
    Delta, ErrorKind, MessagingError, NotificationSnapshot, ParticipantDirectory, Subscription,
    SubscriptionState,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::state::GatewayState;

/// Client events received from WebSocket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Heartbeat to keep connection alive
    Ping,
    /// Re-deliver a conversation snapshot and the messages after `since_id`
    Resync {
        conversation_id: String,
        #[serde(default)]
        since_id: Option<String>,
    },
    /// Re-deliver the current notification list
    ResyncNotifications,
}

/// Server events sent to WebSocket clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Both topics are registered; every later change will be delivered
    Subscribed { participant_id: String },
    /// A state change
    Delta { delta: Delta },
    /// Deltas on `topic` were dropped; resync before trusting local state
    Disconnected { topic: String, missed: u64 },
    /// Heartbeat response
    Pong,
    /// Error response
    Error { kind: ErrorKind, message: String },
}

impl ServerEvent {
    fn from_error(error: MessagingError) -> Self {
        ServerEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    participant_id: String,
}

/// Realtime WebSocket connection handler
pub async fn realtime_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<WebSocketQuery>,
) -> Result<Response, GatewayError> {
    let participant = state
        .core
        .directory()
        .resolve_participant(&query.participant_id)
        .await?;

    Ok(ws.on_upgrade(move |socket| handle_realtime_websocket(socket, state, participant)))
}

type SocketSink = SplitSink<WebSocket, Message>;

async fn handle_realtime_websocket(socket: WebSocket, state: Arc<GatewayState>, participant: Participant) {
    let (mut sender, mut receiver) = socket.split();

    let mut conversations = state.core.subscribe_participant(&participant.id).await;
    let mut notifications = state.core.subscribe_notifications().await;
    info!(participant_id = %participant.id, "realtime socket connected");

    let subscribed = ServerEvent::Subscribed {
        participant_id: participant.id.clone(),
    };
    if send_event(&mut sender, &subscribed).await.is_err() {
        return;
    }

    loop {
        let outgoing = tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_text(&state, &participant.id, &text).await,
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            delta = conversations.recv() => match on_subscription(&mut conversations, delta).await {
                Some(event) => vec![event],
                None => break,
            },
            delta = notifications.recv() => match on_subscription(&mut notifications, delta).await {
                Some(event) => vec![event],
                None => break,
            },
        };

        if send_all(&mut sender, &outgoing).await.is_err() {
            break;
        }
    }

    conversations.unsubscribe().await;
    notifications.unsubscribe().await;
    info!(participant_id = %participant.id, "realtime socket closed");
}

/// Turn the outcome of a subscription receive into a server event. `None`
/// means the subscription is closed and the socket should end.
async fn on_subscription(subscription: &mut Subscription, delta: Option<Delta>) -> Option<ServerEvent> {
    if let Some(delta) = delta {
        return Some(ServerEvent::Delta { delta });
    }

    match subscription.state() {
        SubscriptionState::Disconnected { missed } => {
            let topic = subscription.topic().to_string();
            debug!(topic = %topic, missed, "re-attaching lagged realtime subscription");
            if subscription.reconnect().await {
                Some(ServerEvent::Disconnected { topic, missed })
            } else {
                None
            }
        }
        _ => None,
    }
}

async fn handle_client_text(state: &GatewayState, participant_id: &str, text: &str) -> Vec<ServerEvent> {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => handle_client_event(state, participant_id, event).await,
        Err(error) => vec![ServerEvent::Error {
            kind: ErrorKind::Validation,
            message: format!("unrecognised client event: {error}"),
        }],
    }
}

/// Handle one client event and return the events to send back.
pub async fn handle_client_event(
    state: &GatewayState,
    participant_id: &str,
    event: ClientEvent,
) -> Vec<ServerEvent> {
    match event {
        ClientEvent::Ping => vec![ServerEvent::Pong],
        ClientEvent::Resync {
            conversation_id,
            since_id,
        } => {
            debug!(participant_id, conversation_id = %conversation_id, "resync requested");
            match state
                .core
                .resync(&conversation_id, participant_id, since_id.as_deref())
                .await
            {
                Ok(batch) => into_delta_events(batch.into_deltas()),
                Err(error) => vec![ServerEvent::from_error(error)],
            }
        }
        ClientEvent::ResyncNotifications => match notification_snapshot(state).await {
            Ok(snapshot) => into_delta_events(snapshot.into_deltas()),
            Err(error) => vec![ServerEvent::from_error(error)],
        },
    }
}

async fn notification_snapshot(state: &GatewayState) -> Result<NotificationSnapshot, MessagingError> {
    let notifications = state.core.resync_notifications().await?;
    let unread_count = state.core.notifications().unread_count().await?;
    Ok(NotificationSnapshot {
        unread_count,
        notifications,
    })
}

fn into_delta_events(deltas: Vec<Delta>) -> Vec<ServerEvent> {
    deltas.into_iter().map(|delta| ServerEvent::Delta { delta }).collect()
}

async fn send_all(sender: &mut SocketSink, events: &[ServerEvent]) -> Result<(), axum::Error> {
    for event in events {
        send_event(sender, event).await?;
    }
    Ok(())
}

async fn send_event(sender: &mut SocketSink, event: &ServerEvent) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(text) => sender.send(Message::Text(text)).await,
        Err(error) => {
            warn!(error = %error, "could not serialise server event");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_snake_case_tags() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"resync","conversation_id":"c1","since_id":"m9"}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::Resync {
                conversation_id: "c1".into(),
                since_id: Some("m9".into()),
            }
        );

        let event: ClientEvent = serde_json::from_str(r#"{"type":"resync_notifications"}"#).unwrap();
        assert_eq!(event, ClientEvent::ResyncNotifications);
    }

    #[test]
    fn disconnected_event_carries_topic_and_missed_count() {
        let event = ServerEvent::Disconnected {
            topic: "participant:bob".into(),
            missed: 12,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "disconnected");
        assert_eq!(json["missed"], 12);
    }
}
