//! Typed receivers on top of the notification channel.
//!
//! An [`OperationReceiver`] owns one [`Subscription`] and a background task
//! that routes every matching notification into an [`OperationListener`].

use opflow_core::{EventKind, Extras, Notification, Scope};
use tokio::sync::oneshot;

use super::{NotificationChannel, Subscription};

// ---------------------------------------------------------------------------
// OperationListener
// ---------------------------------------------------------------------------

/// Callbacks for the lifecycle of the operations a receiver listens to.
///
/// Only the verdict callbacks are mandatory. Callbacks run on the receiver's
/// background task, one at a time, in publish order.
pub trait OperationListener: Send + 'static {
    /// Dispatch was refused because connectivity was unavailable.
    fn on_no_connectivity(&mut self) {}

    fn on_start(&mut self) {}

    /// Always follows one of the verdict callbacks.
    fn on_finish(&mut self) {}

    fn on_result_ok(&mut self, extras: &Extras);

    fn on_result_error(&mut self, extras: &Extras);
}

/// Routes one notification to the matching listener callback.
pub fn dispatch<L: OperationListener + ?Sized>(listener: &mut L, notification: &Notification) {
    match notification.event() {
        EventKind::Start => listener.on_start(),
        EventKind::Ok => listener.on_result_ok(&notification.extras),
        EventKind::Error => listener.on_result_error(&notification.extras),
        EventKind::Finish => listener.on_finish(),
        EventKind::NoConnectivity => listener.on_no_connectivity(),
    }
}

// ---------------------------------------------------------------------------
// OperationReceiver
// ---------------------------------------------------------------------------

/// Background task feeding one listener from one scope.
///
/// Dropping the receiver without calling [`stop`](Self::stop) detaches the
/// task; it ends when the channel goes away.
pub struct OperationReceiver {
    scope: Scope,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl OperationReceiver {
    /// Subscribes to `scope` and starts delivering into `listener`.
    ///
    /// The subscription exists before this returns, so every notification
    /// published afterwards is seen.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<L: OperationListener>(
        channel: &NotificationChannel,
        scope: Scope,
        mut listener: L,
    ) -> Self {
        let mut subscription: Subscription = channel.subscribe(scope.clone());
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task_scope = scope.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    notification = subscription.recv() => {
                        match notification {
                            Some(n) => dispatch(&mut listener, &n),
                            None => break,
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
            tracing::debug!(scope = ?task_scope, "receiver stopped");
        });

        Self {
            scope,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Stops delivery and waits for the background task to exit.
    ///
    /// Notifications still buffered at this point are dropped.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
