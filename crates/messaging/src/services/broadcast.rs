//! Broadcast coordinator: one message replicated into many conversations.

use super::conversation_registry::ConversationRegistry;
use super::directory::ParticipantDirectory;
use super::message_store::{MessageStore, OutgoingMessage};
use crate::types::{ErrorKind, MessagingError, MessagingResult};
use courier_config::BroadcastConfig;
use courier_database::{Attachment, Message, MessageType, Priority};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastRequest {
    pub sender_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub recipient_ids: Vec<String>,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl BroadcastRequest {
    pub fn new(sender_id: impl Into<String>, content: impl Into<String>, recipient_ids: Vec<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            content: content.into(),
            attachments: Vec::new(),
            recipient_ids,
            message_type: None,
            priority: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub recipient_id: String,
    pub conversation_id: String,
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDelivery {
    pub recipient_id: String,
    pub error_kind: ErrorKind,
    pub message: String,
    pub attempts: u32,
}

/// Aggregate outcome. Always returned, whatever happened per recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedDelivery>,
    pub delivered: Vec<Delivery>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSettings {
    pub recipient_timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub concurrency: usize,
}

impl From<&BroadcastConfig> for BroadcastSettings {
    fn from(config: &BroadcastConfig) -> Self {
        Self {
            recipient_timeout: Duration::from_millis(config.recipient_timeout_ms),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            concurrency: config.concurrency.max(1),
        }
    }
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self::from(&BroadcastConfig::default())
    }
}

pub struct BroadcastCoordinator<D> {
    registry: Arc<ConversationRegistry<D>>,
    store: Arc<MessageStore<D>>,
    settings: BroadcastSettings,
}

impl<D: ParticipantDirectory> BroadcastCoordinator<D> {
    pub fn new(
        registry: Arc<ConversationRegistry<D>>,
        store: Arc<MessageStore<D>>,
        settings: BroadcastSettings,
    ) -> Self {
        Self {
            registry,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> BroadcastSettings {
        self.settings
    }

    /// Send one message to every distinct recipient.
    ///
    /// Recipients run concurrently up to the configured bound. Each attempt
    /// has its own timeout; only retryable failures are tried again, with
    /// exponential backoff.
    pub async fn broadcast(&self, request: BroadcastRequest) -> BroadcastSummary {
        let mut seen = HashSet::new();
        let recipients: Vec<String> = request
            .recipient_ids
            .iter()
            .filter(|recipient| seen.insert(recipient.as_str()))
            .cloned()
            .collect();

        let shared = &request;
        let mut outcomes: Vec<(usize, Result<Delivery, FailedDelivery>)> =
            stream::iter(recipients.iter().cloned().enumerate())
                .map(move |(index, recipient)| async move {
                    (index, self.deliver(shared, &recipient).await)
                })
                .buffer_unordered(self.settings.concurrency)
                .collect()
                .await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut summary = BroadcastSummary {
            requested: recipients.len(),
            succeeded: 0,
            failed: Vec::new(),
            delivered: Vec::new(),
        };
        for (_, outcome) in outcomes {
            match outcome {
                Ok(delivery) => summary.delivered.push(delivery),
                Err(failure) => summary.failed.push(failure),
            }
        }
        summary.succeeded = summary.delivered.len();

        info!(
            sender_id = %request.sender_id,
            requested = summary.requested,
            succeeded = summary.succeeded,
            failed = summary.failed.len(),
            "broadcast finished"
        );
        summary
    }

    async fn deliver(&self, request: &BroadcastRequest, recipient_id: &str) -> Result<Delivery, FailedDelivery> {
        // One id for every attempt, so a retry after a late commit is a no-op.
        let message_id = cuid2::create_id();
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(
                self.settings.recipient_timeout,
                self.attempt(request, recipient_id, &message_id),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(MessagingError::timeout("broadcast delivery")),
            };

            match outcome {
                Ok((delivery, message)) => {
                    self.store.announce(&message).await;
                    return Ok(delivery);
                }
                Err(error) if error.is_retryable() && attempt < self.settings.max_attempts => {
                    let backoff = self.backoff(attempt);
                    warn!(
                        recipient_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "broadcast delivery failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(error) => {
                    warn!(recipient_id, attempt, kind = error.kind().as_str(), "broadcast delivery failed");
                    return Err(FailedDelivery {
                        recipient_id: recipient_id.to_string(),
                        error_kind: error.kind(),
                        message: error.to_string(),
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Everything up to the commit. Fan-out is left to the caller so the
    /// per-recipient timeout never covers work done after the message exists.
    async fn attempt(
        &self,
        request: &BroadcastRequest,
        recipient_id: &str,
        message_id: &str,
    ) -> MessagingResult<(Delivery, Message)> {
        let conversation = self
            .registry
            .get_or_create(&request.sender_id, recipient_id)
            .await?;

        let mut outgoing = OutgoingMessage::text(
            conversation.id.clone(),
            request.sender_id.clone(),
            recipient_id,
            request.content.clone(),
        )
        .with_attachments(request.attachments.clone());
        if let Some(message_type) = request.message_type {
            outgoing = outgoing.with_type(message_type);
        }
        if let Some(priority) = request.priority {
            outgoing = outgoing.with_priority(priority);
        }

        let outcome = self.store.commit(message_id, &outgoing).await?;
        if !outcome.inserted {
            debug!(recipient_id, message_id, "broadcast retry found the message already committed");
        }

        let delivery = Delivery {
            recipient_id: recipient_id.to_string(),
            conversation_id: conversation.id,
            message_id: outcome.message.id.clone(),
        };
        Ok((delivery, outcome.message))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.settings.retry_backoff.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config_and_clamp() {
        let config = BroadcastConfig {
            recipient_timeout_ms: 250,
            max_attempts: 0,
            retry_backoff_ms: 10,
            concurrency: 0,
        };
        let settings = BroadcastSettings::from(&config);

        assert_eq!(settings.recipient_timeout, Duration::from_millis(250));
        assert_eq!(settings.max_attempts, 1);
        assert_eq!(settings.concurrency, 1);
    }
}
