//! Subscriber side of the fan-out hub.

use super::hub::{FanoutHub, Topic};
use crate::types::Delta;
use serde::Serialize;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// Lifecycle of a subscription.
///
/// `Connecting -> Subscribed -> Delivering* -> Closed`, with `Disconnected`
/// entered when the subscriber fell behind the bounded buffer. A
/// disconnected subscription can `reconnect` and should then resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubscriptionState {
    Connecting,
    Subscribed,
    Delivering,
    Disconnected { missed: u64 },
    Closed,
}

pub struct Subscription {
    hub: FanoutHub,
    topic: Topic,
    receiver: Option<broadcast::Receiver<Delta>>,
    shutdown: watch::Receiver<bool>,
    state: SubscriptionState,
}

enum Received {
    Delta(Delta),
    Lagged(u64),
    Closed,
}

impl Subscription {
    pub(crate) fn connecting(hub: FanoutHub, topic: Topic, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            hub,
            topic,
            receiver: None,
            shutdown,
            state: SubscriptionState::Connecting,
        }
    }

    pub(crate) fn attach(&mut self, receiver: broadcast::Receiver<Delta>) {
        self.receiver = Some(receiver);
        self.transition(SubscriptionState::Subscribed);
    }

    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// Wait for the next delta.
    ///
    /// Returns `None` once the subscription is closed, the hub shut down, or
    /// the subscriber lagged; check [`state`](Self::state) to tell them apart.
    pub async fn recv(&mut self) -> Option<Delta> {
        if *self.shutdown.borrow() {
            self.close();
            return None;
        }

        let receiver = self.receiver.as_mut()?;
        let received = tokio::select! {
            biased;
            _ = self.shutdown.changed() => Received::Closed,
            result = receiver.recv() => match result {
                Ok(delta) => Received::Delta(delta),
                Err(RecvError::Lagged(missed)) => Received::Lagged(missed),
                Err(RecvError::Closed) => Received::Closed,
            },
        };

        self.settle(received)
    }

    /// Take a delta if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Delta> {
        if *self.shutdown.borrow() {
            self.close();
            return None;
        }

        let receiver = self.receiver.as_mut()?;
        let received = match receiver.try_recv() {
            Ok(delta) => Received::Delta(delta),
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Lagged(missed)) => Received::Lagged(missed),
            Err(TryRecvError::Closed) => Received::Closed,
        };

        self.settle(received)
    }

    /// Re-register after a lag. Returns `false` if the subscription is closed.
    pub async fn reconnect(&mut self) -> bool {
        if self.state == SubscriptionState::Closed || self.hub.is_shut_down() {
            self.close();
            return false;
        }

        self.receiver = None;
        self.transition(SubscriptionState::Connecting);
        let receiver = self.hub.register(&self.topic).await;
        self.attach(receiver);
        true
    }

    /// Stop receiving. Deltas published afterwards are dropped for this subscriber.
    pub async fn unsubscribe(mut self) {
        self.close();
        self.hub.prune(&self.topic).await;
    }

    pub(crate) fn close(&mut self) {
        self.receiver = None;
        self.transition(SubscriptionState::Closed);
    }

    fn settle(&mut self, received: Received) -> Option<Delta> {
        match received {
            Received::Delta(delta) => {
                self.transition(SubscriptionState::Delivering);
                Some(delta)
            }
            Received::Lagged(missed) => {
                warn!(topic = %self.topic, missed, "subscriber fell behind, disconnecting");
                self.receiver = None;
                self.transition(SubscriptionState::Disconnected { missed });
                None
            }
            Received::Closed => {
                self.close();
                None
            }
        }
    }

    fn transition(&mut self, next: SubscriptionState) {
        if self.state != next {
            debug!(topic = %self.topic, from = ?self.state, to = ?next, "subscription state changed");
            self.state = next;
        }
    }
}
