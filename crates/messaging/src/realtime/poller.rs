//! Periodic notification polling for consumers without a live subscription.

use crate::services::NotificationDispatcher;
use crate::types::{MessagingResult, NotificationSnapshot};
use courier_database::NotificationStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
const SNAPSHOT_LIMIT: i64 = 50;

/// Emits `{unread_count, notifications}` snapshots on a fixed interval.
///
/// Consumers are expected to dedupe by notification id, for example by
/// feeding [`NotificationSnapshot::into_deltas`] into a `ClientCache`.
pub struct NotificationPoller {
    dispatcher: Arc<NotificationDispatcher>,
    interval: Duration,
    limit: i64,
}

impl NotificationPoller {
    pub fn new(dispatcher: Arc<NotificationDispatcher>, interval: Duration) -> Self {
        Self {
            dispatcher,
            interval,
            limit: SNAPSHOT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn poll_once(&self) -> MessagingResult<NotificationSnapshot> {
        let notifications = self
            .dispatcher
            .list(None::<NotificationStatus>, Some(self.limit))
            .await?;
        let unread_count = self.dispatcher.unread_count().await?;

        Ok(NotificationSnapshot {
            unread_count,
            notifications,
        })
    }

    /// Start polling in the background. The first snapshot is taken
    /// immediately. Polling stops when `shutdown` flips to `true` or the
    /// returned receiver is dropped.
    pub fn spawn(
        self,
        mut shutdown: watch::Receiver<bool>,
    ) -> (mpsc::Receiver<NotificationSnapshot>, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(4);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                match self.poll_once().await {
                    Ok(snapshot) => {
                        debug!(unread = snapshot.unread_count, "notification poll");
                        if sender.send(snapshot).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, kind = error.kind().as_str(), "notification poll failed");
                    }
                }
            }

            debug!("notification poller stopped");
        });

        (receiver, handle)
    }
}
