//! Realtime fan-out: hub, subscriptions, receiving-side cache and polling.

pub mod cache;
pub mod hub;
pub mod poller;
pub mod subscription;

pub use cache::ClientCache;
pub use hub::{FanoutHub, Topic, DEFAULT_CHANNEL_CAPACITY};
pub use poller::{NotificationPoller, DEFAULT_POLL_INTERVAL};
pub use subscription::{Subscription, SubscriptionState};
