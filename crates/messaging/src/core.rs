//! Facade wiring the registry, store, dispatcher, broadcaster and fan-out hub.

use crate::clock::{Clock, SystemClock};
use crate::realtime::{FanoutHub, NotificationPoller, Subscription, Topic};
use crate::services::{
    BroadcastCoordinator, BroadcastSettings, ConversationRegistry, MessageStore,
    NotificationDispatcher, ParticipantDirectory,
};
use crate::types::{MessagingResult, ResyncBatch};
use courier_config::MessagingConfig;
use courier_database::Notification;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Entry point for every messaging operation.
pub struct MessagingCore<D> {
    directory: Arc<D>,
    registry: Arc<ConversationRegistry<D>>,
    messages: Arc<MessageStore<D>>,
    notifications: Arc<NotificationDispatcher>,
    broadcasts: Arc<BroadcastCoordinator<D>>,
    hub: FanoutHub,
    poll_interval: Duration,
}

impl<D> Clone for MessagingCore<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            registry: Arc::clone(&self.registry),
            messages: Arc::clone(&self.messages),
            notifications: Arc::clone(&self.notifications),
            broadcasts: Arc::clone(&self.broadcasts),
            hub: self.hub.clone(),
            poll_interval: self.poll_interval,
        }
    }
}

impl<D: ParticipantDirectory> MessagingCore<D> {
    pub fn new(pool: SqlitePool, directory: D, config: &MessagingConfig) -> Self {
        Self::with_clock(pool, directory, config, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, directory: D, config: &MessagingConfig, clock: Arc<dyn Clock>) -> Self {
        let directory = Arc::new(directory);
        let hub = FanoutHub::new(config.realtime.channel_capacity);
        let timeout = config.operation_timeout();

        let registry = Arc::new(ConversationRegistry::new(
            pool.clone(),
            Arc::clone(&directory),
            hub.clone(),
            Arc::clone(&clock),
            timeout,
        ));
        let messages = Arc::new(MessageStore::new(
            pool.clone(),
            Arc::clone(&directory),
            hub.clone(),
            Arc::clone(&clock),
            timeout,
        ));
        let notifications = Arc::new(NotificationDispatcher::new(pool, hub.clone(), clock, timeout));
        let broadcasts = Arc::new(BroadcastCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&messages),
            BroadcastSettings::from(&config.broadcast),
        ));

        Self {
            directory,
            registry,
            messages,
            notifications,
            broadcasts,
            hub,
            poll_interval: Duration::from_secs(config.notifications.poll_interval_seconds),
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn registry(&self) -> &ConversationRegistry<D> {
        &self.registry
    }

    pub fn messages(&self) -> &MessageStore<D> {
        &self.messages
    }

    pub fn notifications(&self) -> &NotificationDispatcher {
        &self.notifications
    }

    pub fn broadcasts(&self) -> &BroadcastCoordinator<D> {
        &self.broadcasts
    }

    pub fn hub(&self) -> &FanoutHub {
        &self.hub
    }

    pub async fn subscribe_participant(&self, participant_id: &str) -> Subscription {
        self.hub.subscribe(Topic::Participant(participant_id.to_string())).await
    }

    pub async fn subscribe_notifications(&self) -> Subscription {
        self.hub.subscribe(Topic::Notifications).await
    }

    /// Catch a participant up on one conversation after a lag or reconnect.
    pub async fn resync(
        &self,
        conversation_id: &str,
        participant_id: &str,
        since_id: Option<&str>,
    ) -> MessagingResult<ResyncBatch> {
        let conversation = self
            .registry
            .get_for_participant(conversation_id, participant_id)
            .await?;
        let messages = self
            .messages
            .list_by_conversation(conversation_id, since_id, None)
            .await?;

        Ok(ResyncBatch {
            conversation,
            messages,
        })
    }

    pub async fn resync_notifications(&self) -> MessagingResult<Vec<Notification>> {
        self.notifications.list(None, None).await
    }

    pub fn notification_poller(&self) -> NotificationPoller {
        NotificationPoller::new(Arc::clone(&self.notifications), self.poll_interval)
    }

    /// Close all subscriptions and stop pollers started from this core.
    pub fn shutdown(&self) {
        self.hub.shutdown();
    }
}
