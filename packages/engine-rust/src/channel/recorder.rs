//! Collects notifications for inspection in tests and the demo binary.

use std::sync::Arc;
use std::time::Duration;

use opflow_core::{EventKind, Notification, Scope};

use super::{NotificationChannel, Subscription};

/// Subscription that remembers everything it has received.
pub struct Recorder {
    subscription: Subscription,
    seen: Vec<Arc<Notification>>,
}

impl Recorder {
    #[must_use]
    pub fn new(channel: &NotificationChannel, scope: Scope) -> Self {
        Self {
            subscription: channel.subscribe(scope),
            seen: Vec::new(),
        }
    }

    /// Pulls in every notification already buffered.
    pub fn poll(&mut self) -> &[Arc<Notification>] {
        self.seen.extend(self.subscription.drain());
        &self.seen
    }

    /// Waits until a notification of `event` arrives, or `timeout` passes
    /// without any matching notification.
    ///
    /// Returns the matching notification, if any.
    pub async fn wait_for(
        &mut self,
        event: EventKind,
        timeout: Duration,
    ) -> Option<Arc<Notification>> {
        loop {
            let notification = self.subscription.recv_timeout(timeout).await?;
            self.seen.push(Arc::clone(&notification));
            if notification.event() == event {
                return Some(notification);
            }
        }
    }

    /// Everything received so far.
    #[must_use]
    pub fn notifications(&self) -> &[Arc<Notification>] {
        &self.seen
    }

    /// Event kinds received so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<EventKind> {
        self.seen.iter().map(|n| n.event()).collect()
    }

    /// Number of received notifications of `event`.
    #[must_use]
    pub fn count(&self, event: EventKind) -> usize {
        self.seen.iter().filter(|n| n.event() == event).count()
    }

    /// Most recent notification of `event`.
    #[must_use]
    pub fn last(&self, event: EventKind) -> Option<&Arc<Notification>> {
        self.seen.iter().rev().find(|n| n.event() == event)
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}
