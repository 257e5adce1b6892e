//! Single-strategy operations.
//!
//! Most operations run exactly one strategy and analyze its response
//! themselves. [`SingleStrategyKind`] folds strategy construction and
//! analysis into one trait; [`Single`] adapts it to [`OperationKind`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use opflow_core::{
    failure_extras, judge, Analysis, AnalyzeError, EventKind, Extras, Failure, InvocationId,
    OperationStatus, Outcome, Response, Verdict,
};

use super::{Dispatch, Operation, OperationKind};
use crate::context::EngineContext;
use crate::strategy::{panic_message, AnalyzedStrategy, BoxStrategy, ResultAnalyzer, Strategy};

/// An operation that dispatches one strategy and analyzes its response.
pub trait SingleStrategyKind: Send + Sync + 'static {
    type Args: ?Sized;
    type Output: Send + 'static;

    fn type_name(&self) -> &'static str;

    /// Builds the strategy for one invocation.
    fn strategy(&self, args: &Self::Args) -> Box<dyn Strategy<Output = Self::Output>>;

    /// Classifies the strategy's response.
    ///
    /// # Errors
    ///
    /// Returns an [`AnalyzeError`] for responses this operation does not
    /// recognize; the invocation then ends in `ERROR`.
    fn analyze_result(
        &self,
        response: &Response<Self::Output>,
    ) -> Result<Analysis, AnalyzeError>;

    /// Extras for the `ERROR` notification when the strategy or analysis failed.
    fn on_failure(&self, failure: &Failure) -> Extras {
        failure_extras(failure)
    }

    fn on_operation_finish(&self, _elapsed: Duration) {}
}

/// [`OperationKind`] adapter for a [`SingleStrategyKind`].
pub struct Single<K>(Arc<K>);

impl<K> Single<K> {
    #[must_use]
    pub fn new(kind: K) -> Self {
        Self(Arc::new(kind))
    }

    #[must_use]
    pub fn inner(&self) -> &K {
        &self.0
    }
}

struct KindAnalyzer<K>(Arc<K>);

impl<K: SingleStrategyKind> ResultAnalyzer<K::Output> for KindAnalyzer<K> {
    fn analyze(&self, response: &Response<K::Output>) -> Result<Analysis, AnalyzeError> {
        self.0.analyze_result(response)
    }

    fn on_failure(&self, failure: &Failure) -> Extras {
        self.0.on_failure(failure)
    }
}

impl<K: SingleStrategyKind> OperationKind for Single<K> {
    type Args = K::Args;

    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn strategies(&self, args: &K::Args) -> Vec<BoxStrategy> {
        let analyzer = Arc::new(KindAnalyzer(Arc::clone(&self.0)));
        vec![AnalyzedStrategy::new(self.0.strategy(args), analyzer).boxed()]
    }

    fn on_operation_finish(&self, elapsed: Duration) {
        self.0.on_operation_finish(elapsed);
    }
}

impl<K: SingleStrategyKind> Operation<Single<K>> {
    /// Creates the global instance of a single-strategy operation.
    #[must_use]
    pub fn single(kind: K, ctx: EngineContext) -> Self {
        Self::new(Single::new(kind), ctx)
    }

    /// Runs the lifecycle synchronously against a supplied outcome instead of
    /// dispatching a strategy.
    ///
    /// Status guards match [`perform`](Self::perform): an executing operation
    /// only re-announces `START`, a finished one replays. Connectivity is not
    /// consulted. Returns `true` when the outcome was analyzed.
    pub fn test_response(&self, outcome: Outcome<K::Output>) -> bool {
        let core = &self.core;
        let id = InvocationId::new();
        {
            let mut state = core.state.lock();
            match state.status {
                OperationStatus::Executing => {
                    core.publish(&state.instance_id, EventKind::Start, Extras::new());
                    return false;
                }
                OperationStatus::Finished => {
                    let verdict = state.result.clone().unwrap_or_default();
                    core.publish_verdict(&state.instance_id, &verdict);
                    return false;
                }
                OperationStatus::Ready | OperationStatus::Waiting => {}
            }
            state.status = OperationStatus::Executing;
            state.started_at_ms = Some(core.ctx.clock.now());
            state.result = None;
            state.invocation = Some(id);
            core.publish(&state.instance_id, EventKind::Start, Extras::new());
        }

        let kind = core.kind.inner();
        let analysis = panic::catch_unwind(AssertUnwindSafe(|| {
            judge(
                outcome,
                |response| kind.analyze_result(response),
                |failure| kind.on_failure(failure),
            )
        }));
        let verdict = analysis.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            tracing::warn!(operation = kind.type_name(), error = %message, "analyzer aborted");
            let failure = Failure::Analyze(AnalyzeError::Panicked(message));
            Verdict::failure(kind.on_failure(&failure))
        });
        core.finish(id, vec![verdict]);
        true
    }

    /// Convenience for `perform` returning only whether work started.
    ///
    /// # Errors
    ///
    /// Same as [`perform`](Self::perform).
    pub fn execute(&self, args: &K::Args) -> Result<bool, super::OperationError> {
        self.perform(args).map(Dispatch::is_started)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
