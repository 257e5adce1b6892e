//! Operations: the state machine that dispatches strategies and publishes
//! the lifecycle of every invocation.
//!
//! An [`Operation`] pairs an [`OperationKind`] (which strategies to run and
//! how to combine their verdicts) with the shared [`EngineContext`]. All
//! status changes and all emissions of one operation happen under its state
//! lock, so a subscriber never sees a replay interleaved with the live
//! terminal emission.

pub mod arena;
pub mod single;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use opflow_core::{
    failure_extras, EventKind, Extras, Failure, InvocationId, NotificationAddress,
    OperationSnapshot, OperationStatus, PolicyError, ResultPolicy, Scope, SnapshotError,
    StrategyError, Verdict, GLOBAL_INSTANCE,
};
use parking_lot::Mutex;
use tracing::Instrument;

use crate::context::EngineContext;
use crate::strategy::{panic_message, BoxStrategy};
use arena::{ArenaError, CompletionSink};

pub use single::{Single, SingleStrategyKind};

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// What an operation does: the strategies it dispatches for a request and
/// how their verdicts combine.
pub trait OperationKind: Send + Sync + 'static {
    /// Request arguments passed to [`Operation::perform`].
    type Args: ?Sized;

    /// Operation type name, the first half of every notification address.
    fn type_name(&self) -> &'static str;

    /// Builds the strategies for one invocation, in dispatch order.
    ///
    /// Returning an empty list is a programming error and makes `perform` fail.
    fn strategies(&self, args: &Self::Args) -> Vec<BoxStrategy>;

    fn result_policy(&self) -> ResultPolicy {
        ResultPolicy::default()
    }

    /// Called once per invocation, after the verdict is known and before
    /// subscribers are notified.
    fn on_operation_finish(&self, _elapsed: Duration) {}
}

// ---------------------------------------------------------------------------
// Dispatch / errors
// ---------------------------------------------------------------------------

/// What a `perform` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// New strategies were dispatched.
    Started,
    /// An invocation was already in flight; only `START` was re-emitted.
    AlreadyExecuting,
    /// The stored terminal outcome was re-emitted.
    Replayed,
    /// Connectivity was unavailable; only `NO_CONNECTIVITY` was emitted.
    NoConnectivity,
}

impl Dispatch {
    /// Whether this call started new work.
    #[must_use]
    pub fn is_started(self) -> bool {
        self == Self::Started
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("operation `{operation}` produced no strategies")]
    NoStrategies { operation: &'static str },
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("perform must be called from within a tokio runtime")]
    NoRuntime,
    #[error("snapshot belongs to `{found}`, expected `{expected}`")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("invocation {0} is no longer in flight")]
    UnknownInvocation(InvocationId),
    #[error("executing snapshot carries no invocation handle")]
    MissingInvocation,
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

struct OperationState {
    instance_id: String,
    status: OperationStatus,
    started_at_ms: Option<u64>,
    result: Option<Verdict>,
    invocation: Option<InvocationId>,
    connection_delay: Duration,
}

struct OperationCore<K> {
    kind: K,
    ctx: EngineContext,
    state: Mutex<OperationState>,
}

impl<K: OperationKind> OperationCore<K> {
    fn publish(&self, instance_id: &str, event: EventKind, extras: Extras) {
        let address = NotificationAddress::new(self.kind.type_name(), instance_id, event);
        self.ctx.channel.publish(address, extras);
    }

    fn publish_verdict(&self, instance_id: &str, verdict: &Verdict) {
        let event = if verdict.success {
            EventKind::Ok
        } else {
            EventKind::Error
        };
        self.publish(instance_id, event, verdict.extras.clone());
        self.publish(instance_id, EventKind::Finish, Extras::new());
    }

    fn is_current(&self, state: &OperationState, id: InvocationId) -> bool {
        if state.status == OperationStatus::Executing && state.invocation == Some(id) {
            return true;
        }
        tracing::warn!(
            operation = self.kind.type_name(),
            invocation = %id,
            "discarding completion of a superseded invocation"
        );
        false
    }

    fn finish(&self, id: InvocationId, verdicts: Vec<Verdict>) {
        let verdict = self.kind.result_policy().combine(verdicts);

        let elapsed = {
            let state = self.state.lock();
            if !self.is_current(&state, id) {
                return;
            }
            let now = self.ctx.clock.now();
            Duration::from_millis(now.saturating_sub(state.started_at_ms.unwrap_or(now)))
        };
        // Outside the lock: the hook may query the operation.
        self.kind.on_operation_finish(elapsed);

        let mut state = self.state.lock();
        if !self.is_current(&state, id) {
            return;
        }
        state.status = OperationStatus::Finished;
        state.invocation = None;
        state.result = Some(verdict.clone());

        let operation = self.kind.type_name();
        let outcome = if verdict.success { "ok" } else { "error" };
        metrics::counter!("opflow_operations_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        metrics::histogram!("opflow_operation_duration_ms", "operation" => operation)
            .record(elapsed.as_secs_f64() * 1000.0);
        tracing::info!(
            operation,
            instance = %state.instance_id,
            invocation = %id,
            success = verdict.success,
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "operation finished"
        );

        self.publish_verdict(&state.instance_id, &verdict);
    }
}

impl<K: OperationKind> CompletionSink for OperationCore<K> {
    fn on_invocation_complete(&self, id: InvocationId, verdicts: Vec<Verdict>) {
        self.finish(id, verdicts);
    }
}

/// One operation instance. Cloning yields another handle to the same instance.
pub struct Operation<K: OperationKind> {
    core: Arc<OperationCore<K>>,
}

impl<K: OperationKind> Clone for Operation<K> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<K: OperationKind> Operation<K> {
    /// Creates the global instance of `kind`, in `Ready`.
    #[must_use]
    pub fn new(kind: K, ctx: EngineContext) -> Self {
        let state = OperationState {
            instance_id: GLOBAL_INSTANCE.to_string(),
            status: OperationStatus::Ready,
            started_at_ms: None,
            result: None,
            invocation: None,
            connection_delay: ctx.config.default_connection_delay,
        };
        Self {
            core: Arc::new(OperationCore {
                kind,
                ctx,
                state: Mutex::new(state),
            }),
        }
    }

    #[must_use]
    pub fn with_instance_id(self, instance_id: impl Into<String>) -> Self {
        self.core.state.lock().instance_id = instance_id.into();
        self
    }

    #[must_use]
    pub fn kind(&self) -> &K {
        &self.core.kind
    }

    #[must_use]
    pub fn context(&self) -> &EngineContext {
        &self.core.ctx
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.core.kind.type_name()
    }

    #[must_use]
    pub fn instance_id(&self) -> String {
        self.core.state.lock().instance_id.clone()
    }

    /// Renames the instance. `None` selects the global instance.
    pub fn set_instance_id(&self, instance_id: Option<&str>) {
        self.core.state.lock().instance_id = instance_id.unwrap_or(GLOBAL_INSTANCE).to_string();
    }

    /// Scope a receiver should subscribe to for this instance.
    #[must_use]
    pub fn scope(&self) -> Scope {
        Scope::for_instance(self.type_name(), self.instance_id())
    }

    #[must_use]
    pub fn status(&self) -> OperationStatus {
        self.core.state.lock().status
    }

    /// Verdict of the last finished invocation, until `reset`.
    #[must_use]
    pub fn last_result(&self) -> Option<Verdict> {
        self.core.state.lock().result.clone()
    }

    #[must_use]
    pub fn connection_delay(&self) -> Duration {
        self.core.state.lock().connection_delay
    }

    /// Delay applied before every strategy of the next invocations runs.
    pub fn set_connection_delay(&self, delay: Duration) {
        self.core.state.lock().connection_delay = delay;
    }

    /// Strategies of the in-flight invocation that have not reported yet.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        let invocation = self.core.state.lock().invocation;
        invocation
            .and_then(|id| self.core.ctx.arena.outstanding(id))
            .unwrap_or(0)
    }

    /// Forces `Waiting`. The next `perform` dispatches as if from `Ready`.
    pub fn set_as_waiting(&self) {
        let mut state = self.core.state.lock();
        tracing::debug!(operation = self.type_name(), from = %state.status, "set as waiting");
        state.status = OperationStatus::Waiting;
    }

    /// Returns to `Ready` and forgets the stored result. Completions of an
    /// invocation started before the reset are dropped.
    pub fn reset(&self) {
        let mut state = self.core.state.lock();
        if let Some(id) = state.invocation.take() {
            tracing::debug!(operation = self.type_name(), invocation = %id, "abandoning in-flight invocation");
            self.core.ctx.arena.discard(id);
        }
        state.status = OperationStatus::Ready;
        state.started_at_ms = None;
        state.result = None;
    }

    fn sink(&self) -> Weak<dyn CompletionSink> {
        let sink: Arc<dyn CompletionSink> = self.core.clone();
        Arc::downgrade(&sink)
    }

    /// Requests execution.
    ///
    /// From `Ready` or `Waiting` this checks connectivity, builds the
    /// strategies, emits `START` and spawns them; the terminal `OK`/`ERROR`
    /// and `FINISH` follow once the last strategy reports. See [`Dispatch`]
    /// for the other statuses.
    ///
    /// # Errors
    ///
    /// - [`OperationError::NoRuntime`] outside a tokio runtime
    /// - [`OperationError::NoStrategies`] when the kind built no strategies
    /// - [`OperationError::Policy`] when the result policy does not fit them
    ///
    /// Nothing is emitted and the status is unchanged on error.
    pub fn perform(&self, args: &K::Args) -> Result<Dispatch, OperationError> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| OperationError::NoRuntime)?;
        let core = &self.core;
        let operation = core.kind.type_name();
        let mut state = core.state.lock();

        match state.status {
            OperationStatus::Executing => {
                tracing::debug!(operation, instance = %state.instance_id, "already executing");
                core.publish(&state.instance_id, EventKind::Start, Extras::new());
                return Ok(Dispatch::AlreadyExecuting);
            }
            OperationStatus::Finished => {
                let verdict = state.result.clone().unwrap_or_default();
                tracing::debug!(operation, instance = %state.instance_id, "replaying stored outcome");
                core.publish_verdict(&state.instance_id, &verdict);
                return Ok(Dispatch::Replayed);
            }
            OperationStatus::Ready | OperationStatus::Waiting => {}
        }

        if !core.ctx.connectivity.has_connectivity() {
            tracing::info!(operation, instance = %state.instance_id, "no connectivity, dispatch refused");
            core.publish(&state.instance_id, EventKind::NoConnectivity, Extras::new());
            return Ok(Dispatch::NoConnectivity);
        }

        let strategies = core.kind.strategies(args);
        if strategies.is_empty() {
            return Err(OperationError::NoStrategies { operation });
        }
        core.kind.result_policy().validate(strategies.len())?;

        let id = InvocationId::new();
        state.status = OperationStatus::Executing;
        state.started_at_ms = Some(core.ctx.clock.now());
        state.result = None;
        state.invocation = Some(id);
        let delay = state.connection_delay;
        let instance = state.instance_id.clone();

        core.ctx
            .arena
            .register(id, operation, strategies.len(), self.sink());
        tracing::info!(
            operation,
            instance = %instance,
            invocation = %id,
            strategies = strategies.len(),
            "dispatching"
        );
        core.publish(&instance, EventKind::Start, Extras::new());
        drop(state);

        for (index, mut strategy) in strategies.into_iter().enumerate() {
            if !delay.is_zero() {
                strategy.set_delay(delay);
            }
            let arena = Arc::clone(&core.ctx.arena);
            let span = tracing::info_span!(
                "operation",
                operation,
                instance = %instance,
                invocation = %id,
                strategy = strategy.label(),
                index
            );
            runtime.spawn(
                async move {
                    arena.mark_running(id, index);
                    let verdict = match AssertUnwindSafe(strategy.run()).catch_unwind().await {
                        Ok(verdict) => verdict,
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            tracing::error!(error = %message, "strategy panicked");
                            let failure = Failure::Strategy(StrategyError::Panicked(message));
                            Verdict::failure(failure_extras(&failure))
                        }
                    };
                    arena.complete(id, index, verdict);
                }
                .instrument(span),
            );
        }

        Ok(Dispatch::Started)
    }

    /// Captures the instance's state, including the in-flight invocation handle.
    ///
    /// An executing invocation captured here keeps its verdicts parked if
    /// this operation is dropped before they arrive, ready for [`restore`](Self::restore).
    #[must_use]
    pub fn snapshot(&self) -> OperationSnapshot {
        let snapshot = {
            let state = self.core.state.lock();
            OperationSnapshot {
                operation_type: self.type_name().to_string(),
                instance_id: state.instance_id.clone(),
                status: state.status,
                started_at_ms: state.started_at_ms,
                result: state.result.clone(),
                invocation: state.invocation,
                connection_delay_ms: u64::try_from(state.connection_delay.as_millis())
                    .unwrap_or(u64::MAX),
            }
        };
        if snapshot.status == OperationStatus::Executing {
            if let Some(id) = snapshot.invocation {
                self.core.ctx.arena.mark_detachable(id);
            }
        }
        snapshot
    }

    /// Rebuilds an instance from a snapshot.
    ///
    /// An `Executing` snapshot re-attaches to its in-flight invocation. If
    /// that invocation finished while detached, the terminal emission happens
    /// before this returns.
    ///
    /// # Errors
    ///
    /// - [`OperationError::TypeMismatch`] if the snapshot is of another type
    /// - [`OperationError::MissingInvocation`] for an `Executing` snapshot
    ///   without a handle
    /// - [`OperationError::UnknownInvocation`] if the arena no longer holds
    ///   the invocation
    pub fn restore(
        kind: K,
        ctx: EngineContext,
        snapshot: &OperationSnapshot,
    ) -> Result<Self, OperationError> {
        let expected = kind.type_name();
        if snapshot.operation_type != expected {
            return Err(OperationError::TypeMismatch {
                expected,
                found: snapshot.operation_type.clone(),
            });
        }

        let operation = Self::new(kind, ctx);
        {
            let mut state = operation.core.state.lock();
            state.instance_id.clone_from(&snapshot.instance_id);
            state.status = snapshot.status;
            state.started_at_ms = snapshot.started_at_ms;
            state.result.clone_from(&snapshot.result);
            state.invocation = snapshot.invocation;
            state.connection_delay = Duration::from_millis(snapshot.connection_delay_ms);
        }

        if snapshot.status == OperationStatus::Executing {
            let id = snapshot
                .invocation
                .ok_or(OperationError::MissingInvocation)?;
            let parked = operation
                .core
                .ctx
                .arena
                .relink(id, expected, operation.sink())
                .map_err(|err| match err {
                    ArenaError::Unknown(id) => OperationError::UnknownInvocation(id),
                    ArenaError::TypeMismatch { found, .. } => {
                        OperationError::TypeMismatch { expected, found }
                    }
                })?;
            tracing::debug!(operation = expected, invocation = %id, finished = parked.is_some(), "relinked");
            if let Some(verdicts) = parked {
                operation.core.finish(id, verdicts);
            }
        }

        Ok(operation)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
