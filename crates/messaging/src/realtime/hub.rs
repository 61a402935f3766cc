//! Topic-based fan-out of deltas to live subscribers.

use super::subscription::Subscription;
use crate::types::Delta;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::debug;

/// Default bounded buffer per topic.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Message and conversation deltas for one participant's conversations.
    Participant(String),
    /// The global notification feed.
    Notifications,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Participant(id) => write!(f, "participant:{id}"),
            Topic::Notifications => f.write_str("notifications"),
        }
    }
}

/// Hub holding one bounded broadcast channel per active topic.
///
/// Publishing never waits on subscribers: a full buffer evicts the oldest
/// delta and the slow subscriber observes a lag on its next receive.
#[derive(Clone)]
pub struct FanoutHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    topics: RwLock<HashMap<Topic, broadcast::Sender<Delta>>>,
    capacity: usize,
    shutdown: watch::Sender<bool>,
}

impl FanoutHub {
    pub fn new(capacity: usize) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(HubInner {
                topics: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                shutdown,
            }),
        }
    }

    /// Register a receiver on `topic` and acknowledge it.
    ///
    /// The receiver exists before the subscription reports `Subscribed`, so
    /// every delta published after this returns is observable.
    pub async fn subscribe(&self, topic: Topic) -> Subscription {
        let mut subscription =
            Subscription::connecting(self.clone(), topic.clone(), self.shutdown_receiver());
        if self.is_shut_down() {
            subscription.close();
            return subscription;
        }

        let receiver = self.register(&topic).await;
        subscription.attach(receiver);
        subscription
    }

    pub(crate) async fn register(&self, topic: &Topic) -> broadcast::Receiver<Delta> {
        let mut topics = self.inner.topics.write().await;
        let sender = topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0);
        sender.subscribe()
    }

    /// Push a delta to everyone on `topic`. Returns how many receivers got it.
    pub async fn publish(&self, topic: &Topic, delta: Delta) -> usize {
        if self.is_shut_down() {
            return 0;
        }

        let topics = self.inner.topics.read().await;
        let Some(sender) = topics.get(topic) else {
            return 0;
        };

        let kind = delta.name();
        let delivered = sender.send(delta).unwrap_or(0);
        debug!(topic = %topic, delta = kind, delivered, "published delta");
        delivered
    }

    pub async fn publish_to_participants(&self, participants: &[&str], delta: Delta) {
        for participant in participants {
            self.publish(&Topic::Participant((*participant).to_string()), delta.clone())
                .await;
        }
    }

    pub async fn publish_notification(&self, delta: Delta) {
        self.publish(&Topic::Notifications, delta).await;
    }

    /// Drop the channel of a topic nobody listens to anymore.
    pub async fn prune(&self, topic: &Topic) {
        let mut topics = self.inner.topics.write().await;
        if topics.get(topic).is_some_and(|sender| sender.receiver_count() == 0) {
            topics.remove(topic);
            debug!(topic = %topic, "pruned idle topic");
        }
    }

    pub async fn subscriber_count(&self, topic: &Topic) -> usize {
        let topics = self.inner.topics.read().await;
        topics.get(topic).map_or(0, |sender| sender.receiver_count())
    }

    /// Close every subscription. Later publishes are dropped.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        debug!("fan-out hub shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
