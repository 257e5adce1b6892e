//! Dependencies injected into every operation.
//!
//! There is no process-global state: the connectivity predicate, the
//! notification channel, the invocation arena and the clock travel together
//! in an [`EngineContext`] handed to each operation at construction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opflow_core::{ClockSource, SystemClock};

use crate::channel::NotificationChannel;
use crate::config::EngineConfig;
use crate::operation::arena::InvocationArena;

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

/// Synchronous "can we reach the outside world" predicate, consulted before
/// every dispatch.
pub trait Connectivity: Send + Sync {
    fn has_connectivity(&self) -> bool;
}

impl<F> Connectivity for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn has_connectivity(&self) -> bool {
        self()
    }
}

/// Connectivity flag that can be flipped at runtime.
#[derive(Debug)]
pub struct SwitchConnectivity {
    online: AtomicBool,
}

impl SwitchConnectivity {
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for SwitchConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Connectivity for SwitchConnectivity {
    fn has_connectivity(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// EngineContext
// ---------------------------------------------------------------------------

/// Shared services for a family of operations. Cheap to clone.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<EngineConfig>,
    pub channel: NotificationChannel,
    pub connectivity: Arc<dyn Connectivity>,
    pub arena: Arc<InvocationArena>,
    pub clock: Arc<dyn ClockSource>,
}

impl EngineContext {
    /// Builds a context with a fresh channel, an empty arena and the system clock.
    #[must_use]
    pub fn new(config: EngineConfig, connectivity: Arc<dyn Connectivity>) -> Self {
        let channel = NotificationChannel::new(config.channel_capacity);
        Self {
            config: Arc::new(config),
            channel,
            connectivity,
            arena: Arc::new(InvocationArena::new()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }
}
