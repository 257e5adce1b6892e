//! Process-wide notification channel.
//!
//! One [`NotificationChannel::publish`] call per lifecycle event. The channel
//! is a `tokio::sync::broadcast` fan-out; every [`Subscription`] filters the
//! stream by its [`Scope`], so a type-scoped and an instance-scoped subscriber
//! both receive an instance emission once, and nobody receives it twice.
//!
//! Delivery is at-most-once: no retry, no persistence. A subscription created
//! after an emission never sees it, and a subscription that lags more than the
//! channel capacity loses the oldest notifications.

pub mod receiver;
pub mod recorder;

use std::sync::Arc;
use std::time::Duration;

use opflow_core::{Extras, Notification, NotificationAddress, Scope};
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub use receiver::{OperationListener, OperationReceiver};
pub use recorder::Recorder;

// ---------------------------------------------------------------------------
// NotificationChannel
// ---------------------------------------------------------------------------

struct ChannelInner {
    sender: broadcast::Sender<Arc<Notification>>,
    /// Next sequence number. Held across send so emissions never interleave.
    publish_lock: Mutex<u64>,
}

/// Cloneable handle to a shared notification channel.
#[derive(Clone)]
pub struct NotificationChannel {
    inner: Arc<ChannelInner>,
}

impl NotificationChannel {
    /// Creates a channel buffering up to `capacity` notifications per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero (a `tokio::sync::broadcast` requirement).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            inner: Arc::new(ChannelInner {
                sender,
                publish_lock: Mutex::new(0),
            }),
        }
    }

    /// Publishes one notification to every live subscription.
    ///
    /// Returns the sequence number assigned to the notification.
    pub fn publish(&self, address: NotificationAddress, extras: Extras) -> u64 {
        let event = address.event;
        let mut next = self.inner.publish_lock.lock();
        let sequence = *next;
        *next += 1;

        let notification = Arc::new(Notification {
            address,
            sequence,
            extras,
        });
        tracing::debug!(address = %notification.address, sequence, "publishing notification");
        // send() only fails when nobody is subscribed, which is not an error here.
        let delivered = self.inner.sender.send(notification).unwrap_or(0);
        drop(next);

        metrics::counter!("opflow_notifications_total", "event" => event.as_str()).increment(1);
        tracing::trace!(sequence, delivered, "notification fanned out");
        sequence
    }

    /// Subscribes to every notification matching `scope` published from now on.
    #[must_use]
    pub fn subscribe(&self, scope: Scope) -> Subscription {
        Subscription {
            scope,
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Number of live subscriptions, regardless of scope.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new(1024)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Scope-filtered view of the channel.
pub struct Subscription {
    scope: Scope,
    receiver: broadcast::Receiver<Arc<Notification>>,
}

impl Subscription {
    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Waits for the next matching notification.
    ///
    /// Returns `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<Arc<Notification>> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) if self.scope.matches(&notification.address) => {
                    return Some(notification);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(scope = ?self.scope, missed, "subscription lagged, notifications lost");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next matching notification that is already buffered.
    pub fn try_recv(&mut self) -> Option<Arc<Notification>> {
        loop {
            match self.receiver.try_recv() {
                Ok(notification) if self.scope.matches(&notification.address) => {
                    return Some(notification);
                }
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!(scope = ?self.scope, missed, "subscription lagged, notifications lost");
                }
                Err(
                    broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed,
                ) => return None,
            }
        }
    }

    /// Waits up to `timeout` for the next matching notification.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Arc<Notification>> {
        tokio::time::timeout(timeout, self.recv()).await.ok().flatten()
    }

    /// Drains every matching notification that is already buffered.
    pub fn drain(&mut self) -> Vec<Arc<Notification>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use opflow_core::EventKind;

    use super::*;

    fn address(ty: &str, id: &str, event: EventKind) -> NotificationAddress {
        NotificationAddress::new(ty, id, event)
    }

    #[tokio::test]
    async fn instance_emission_reaches_type_and_instance_subscribers_once() {
        let channel = NotificationChannel::new(16);
        let mut by_type = channel.subscribe(Scope::for_type("CreateDevice"));
        let mut by_instance = channel.subscribe(Scope::for_instance("CreateDevice", "a"));
        let mut other_instance = channel.subscribe(Scope::for_instance("CreateDevice", "b"));

        channel.publish(address("CreateDevice", "a", EventKind::Start), Extras::new());

        assert_eq!(by_type.drain().len(), 1);
        assert_eq!(by_instance.drain().len(), 1);
        assert!(other_instance.drain().is_empty());
    }

    #[tokio::test]
    async fn global_emission_reaches_type_subscriber_once() {
        let channel = NotificationChannel::new(16);
        let mut by_type = channel.subscribe(Scope::for_type("CreateDevice"));
        let mut global = channel.subscribe(Scope::for_instance("CreateDevice", ""));

        channel.publish(address("CreateDevice", "", EventKind::Finish), Extras::new());

        assert_eq!(by_type.drain().len(), 1);
        assert_eq!(global.drain().len(), 1);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_emissions() {
        let channel = NotificationChannel::new(16);
        channel.publish(address("Op", "", EventKind::Start), Extras::new());
        let mut late = channel.subscribe(Scope::for_type("Op"));
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn sequence_numbers_are_strictly_increasing() {
        let channel = NotificationChannel::new(16);
        let mut sub = channel.subscribe(Scope::for_type("Op"));
        for event in EventKind::ALL {
            channel.publish(address("Op", "", event), Extras::new());
        }
        let seen: Vec<u64> = sub.drain().iter().map(|n| n.sequence).collect();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let channel = NotificationChannel::new(4);
        let seq = channel.publish(address("Op", "", EventKind::Ok), Extras::new());
        assert_eq!(seq, 0);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn recv_timeout_returns_none_when_quiet() {
        let channel = NotificationChannel::new(4);
        let mut sub = channel.subscribe(Scope::for_type("Op"));
        assert!(sub.recv_timeout(Duration::from_millis(10)).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_publishers_keep_a_total_order() {
        let channel = NotificationChannel::new(1024);
        let mut sub = channel.subscribe(Scope::for_type("Op"));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let channel = channel.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..16 {
                    channel.publish(
                        address("Op", &worker.to_string(), EventKind::Start),
                        Extras::new(),
                    );
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let seen: Vec<u64> = sub.drain().iter().map(|n| n.sequence).collect();
        assert_eq!(seen.len(), 128);
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
