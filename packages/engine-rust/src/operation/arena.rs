//! In-flight invocations, keyed by id.
//!
//! Strategy tasks report completions here rather than to the operation that
//! spawned them. The arena counts outstanding strategies and, when the last
//! one finishes, hands the verdicts to whichever operation is currently
//! linked. If none is linked and the operation was snapshotted before it was
//! dropped, the verdicts stay parked until [`InvocationArena::relink`]
//! attaches a restored operation. Without a snapshot nothing can ever
//! relink, so the entry is dropped instead.
//!
//! Lock order: a `DashMap` guard is never held while an entry mutex is taken.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use opflow_core::{ExecutionState, InvocationId, Verdict};
use parking_lot::Mutex;

/// Receiver of the verdicts of a finished invocation.
pub(crate) trait CompletionSink: Send + Sync {
    fn on_invocation_complete(&self, id: InvocationId, verdicts: Vec<Verdict>);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("invocation {0} is not in flight")]
    Unknown(InvocationId),
    #[error("invocation {id} belongs to `{found}`, not `{expected}`")]
    TypeMismatch {
        id: InvocationId,
        expected: String,
        found: String,
    },
}

struct Slot {
    state: ExecutionState,
    verdict: Option<Verdict>,
}

struct Entry {
    operation_type: String,
    slots: Vec<Slot>,
    outstanding: usize,
    link: Option<Weak<dyn CompletionSink>>,
    detachable: bool,
    delivered: bool,
}

impl Entry {
    fn take_verdicts(&mut self) -> Vec<Verdict> {
        self.slots
            .iter_mut()
            .map(|slot| slot.verdict.take().unwrap_or_default())
            .collect()
    }
}

/// Registry of in-flight invocations shared by every operation of a context.
#[derive(Default)]
pub struct InvocationArena {
    entries: DashMap<InvocationId, Arc<Mutex<Entry>>>,
}

impl InvocationArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: InvocationId) -> Option<Arc<Mutex<Entry>>> {
        self.entries.get(&id).map(|e| Arc::clone(e.value()))
    }

    pub(crate) fn register(
        &self,
        id: InvocationId,
        operation_type: &str,
        strategies: usize,
        sink: Weak<dyn CompletionSink>,
    ) {
        let entry = Entry {
            operation_type: operation_type.to_string(),
            slots: (0..strategies)
                .map(|_| Slot {
                    state: ExecutionState::Pending,
                    verdict: None,
                })
                .collect(),
            outstanding: strategies,
            link: Some(sink),
            detachable: false,
            delivered: false,
        };
        self.entries.insert(id, Arc::new(Mutex::new(entry)));
    }

    pub(crate) fn mark_running(&self, id: InvocationId, index: usize) {
        if let Some(entry) = self.entry(id) {
            if let Some(slot) = entry.lock().slots.get_mut(index) {
                slot.state = ExecutionState::Running;
            }
        }
    }

    /// Marks `id` as captured by a snapshot, so its verdicts are parked if
    /// the operation goes away before they arrive.
    pub(crate) fn mark_detachable(&self, id: InvocationId) {
        if let Some(entry) = self.entry(id) {
            entry.lock().detachable = true;
        }
    }

    /// Records the verdict of strategy `index`. The call that brings the
    /// outstanding count to zero delivers (or parks) the verdicts.
    pub(crate) fn complete(&self, id: InvocationId, index: usize, verdict: Verdict) {
        let Some(entry) = self.entry(id) else {
            tracing::debug!(invocation = %id, "completion for an invocation no longer tracked");
            return;
        };

        let delivery = {
            let mut guard = entry.lock();
            let Some(slot) = guard.slots.get_mut(index) else {
                tracing::warn!(invocation = %id, index, "completion for unknown strategy slot");
                return;
            };
            if slot.state == ExecutionState::Done {
                tracing::warn!(invocation = %id, index, "duplicate strategy completion ignored");
                return;
            }
            slot.state = ExecutionState::Done;
            slot.verdict = Some(verdict);
            guard.outstanding -= 1;
            if guard.outstanding > 0 {
                return;
            }

            if let Some(sink) = guard.link.as_ref().and_then(Weak::upgrade) {
                guard.delivered = true;
                let verdicts = guard.take_verdicts();
                self.entries.remove(&id);
                Some((sink, verdicts))
            } else if guard.detachable {
                tracing::debug!(invocation = %id, "no operation linked, parking verdicts");
                guard.link = None;
                None
            } else {
                tracing::debug!(invocation = %id, "operation dropped without a snapshot, discarding verdicts");
                self.entries.remove(&id);
                None
            }
        };

        if let Some((sink, verdicts)) = delivery {
            sink.on_invocation_complete(id, verdicts);
        }
    }

    /// Links a restored operation to an in-flight invocation.
    ///
    /// Returns the parked verdicts when the invocation already finished while
    /// no operation was linked; the caller must deliver them itself.
    pub(crate) fn relink(
        &self,
        id: InvocationId,
        operation_type: &str,
        sink: Weak<dyn CompletionSink>,
    ) -> Result<Option<Vec<Verdict>>, ArenaError> {
        let entry = self.entry(id).ok_or(ArenaError::Unknown(id))?;
        let mut guard = entry.lock();
        if guard.delivered {
            return Err(ArenaError::Unknown(id));
        }
        if guard.operation_type != operation_type {
            return Err(ArenaError::TypeMismatch {
                id,
                expected: operation_type.to_string(),
                found: guard.operation_type.clone(),
            });
        }
        guard.detachable = false;
        if guard.outstanding > 0 {
            guard.link = Some(sink);
            return Ok(None);
        }
        guard.delivered = true;
        let verdicts = guard.take_verdicts();
        self.entries.remove(&id);
        Ok(Some(verdicts))
    }

    /// Strategies of `id` still running, or `None` if `id` is not tracked.
    #[must_use]
    pub fn outstanding(&self, id: InvocationId) -> Option<usize> {
        self.entry(id).map(|entry| entry.lock().outstanding)
    }

    #[must_use]
    pub fn states(&self, id: InvocationId) -> Option<Vec<ExecutionState>> {
        self.entry(id)
            .map(|entry| entry.lock().slots.iter().map(|slot| slot.state).collect())
    }

    /// Drops an invocation, parked or not. Late completions are then ignored.
    pub fn discard(&self, id: InvocationId) -> bool {
        self.entries.remove(&id).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
