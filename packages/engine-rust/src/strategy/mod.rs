//! Strategies and the runner that pairs each one with its analyzer.
//!
//! A [`Strategy`] performs one unit of asynchronous work and reports a raw
//! [`Outcome`]. A [`ResultAnalyzer`] turns that outcome into a [`Verdict`].
//! Operations never see either directly: they dispatch type-erased
//! [`BoxStrategy`] values built with [`analyzed`], which applies the delay,
//! executes the strategy and runs the analysis off the async worker threads.

pub mod mock;
pub mod network;
pub mod storage;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opflow_core::{
    failure_extras, judge, Analysis, AnalyzeError, Extras, Failure, Outcome, Response, Verdict,
};

pub use mock::{FixtureError, MockFixture, MockStrategy};
pub use network::{
    HttpMethod, HttpReply, HttpRequest, HttpTransport, NetworkStrategy, ReqwestTransport,
    TransportError,
};
pub use storage::{
    KeyValueRepository, MemoryRepository, RepositoryError, StorageAction, StorageStrategy,
};

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// One unit of asynchronous work.
#[async_trait]
pub trait Strategy: Send + 'static {
    /// Payload carried by a successful response.
    type Output: Send + 'static;

    /// Runs the work once and reports what happened.
    ///
    /// Errors are reported as [`Outcome::Failure`], never by panicking.
    async fn execute(&mut self) -> Outcome<Self::Output>;

    /// Short label used in logs and spans.
    fn name(&self) -> &'static str;
}

#[async_trait]
impl<T: Send + 'static> Strategy for Box<dyn Strategy<Output = T>> {
    type Output = T;

    async fn execute(&mut self) -> Outcome<T> {
        (**self).execute().await
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

// ---------------------------------------------------------------------------
// ResultAnalyzer
// ---------------------------------------------------------------------------

/// Interprets the responses of one strategy type.
pub trait ResultAnalyzer<T>: Send + Sync + 'static {
    /// Classifies a response.
    ///
    /// # Errors
    ///
    /// Returns an [`AnalyzeError`] when the response is not recognized or its
    /// payload cannot be decoded; the strategy then counts as failed.
    fn analyze(&self, response: &Response<T>) -> Result<Analysis, AnalyzeError>;

    /// Extras published when the strategy or the analysis failed.
    fn on_failure(&self, failure: &Failure) -> Extras {
        failure_extras(failure)
    }
}

impl<T, F> ResultAnalyzer<T> for F
where
    F: Fn(&Response<T>) -> Result<Analysis, AnalyzeError> + Send + Sync + 'static,
{
    fn analyze(&self, response: &Response<T>) -> Result<Analysis, AnalyzeError> {
        self(response)
    }
}

// ---------------------------------------------------------------------------
// DispatchStrategy
// ---------------------------------------------------------------------------

/// Type-erased strategy as dispatched by an operation.
#[async_trait]
pub trait DispatchStrategy: Send + 'static {
    fn label(&self) -> &'static str;

    /// Delay applied before the strategy executes.
    fn set_delay(&mut self, delay: Duration);

    /// Runs the strategy and its analysis to a verdict. Never fails, but a
    /// panicking strategy unwinds out of it; the dispatcher catches that.
    async fn run(self: Box<Self>) -> Verdict;
}

pub type BoxStrategy = Box<dyn DispatchStrategy>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A strategy paired with the analyzer that judges its outcome.
pub struct AnalyzedStrategy<S: Strategy, A> {
    strategy: S,
    analyzer: Arc<A>,
    delay: Duration,
}

impl<S, A> AnalyzedStrategy<S, A>
where
    S: Strategy,
    A: ResultAnalyzer<S::Output>,
{
    #[must_use]
    pub fn new(strategy: S, analyzer: Arc<A>) -> Self {
        Self {
            strategy,
            analyzer,
            delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn boxed(self) -> BoxStrategy {
        Box::new(self)
    }
}

/// Pairs `strategy` with `analyzer`, ready for dispatch.
#[must_use]
pub fn analyzed<S, A>(strategy: S, analyzer: A) -> BoxStrategy
where
    S: Strategy,
    A: ResultAnalyzer<S::Output>,
{
    AnalyzedStrategy::new(strategy, Arc::new(analyzer)).boxed()
}

#[async_trait]
impl<S, A> DispatchStrategy for AnalyzedStrategy<S, A>
where
    S: Strategy,
    A: ResultAnalyzer<S::Output>,
{
    fn label(&self) -> &'static str {
        self.strategy.name()
    }

    fn set_delay(&mut self, delay: Duration) {
        self.delay = delay;
    }

    async fn run(self: Box<Self>) -> Verdict {
        let Self {
            mut strategy,
            analyzer,
            delay,
        } = *self;

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let outcome = strategy.execute().await;
        tracing::debug!(strategy = strategy.name(), code = ?outcome.code(), "strategy reported");

        // Analysis may decode large payloads; keep it off the async workers.
        let fallback = Arc::clone(&analyzer);
        let analysis = tokio::task::spawn_blocking(move || {
            judge(
                outcome,
                |response| analyzer.analyze(response),
                |failure| analyzer.on_failure(failure),
            )
        })
        .await;

        match analysis {
            Ok(verdict) => verdict,
            Err(err) => {
                tracing::warn!(strategy = strategy.name(), error = %err, "analyzer aborted");
                let failure = Failure::Analyze(AnalyzeError::Panicked(err.to_string()));
                Verdict::failure(fallback.on_failure(&failure))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use opflow_core::{codes, FailureInfo, FailureKind, StrategyError, EXTRA_ERROR};

    use super::*;

    #[test]
    fn panic_payload_text() {
        let payload: Box<dyn Any + Send> = Box::new("static text");
        assert_eq!(panic_message(payload.as_ref()), "static text");
        let payload: Box<dyn Any + Send> = Box::new(format!("formatted {}", 7));
        assert_eq!(panic_message(payload.as_ref()), "formatted 7");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    struct Fixed(Option<Outcome<u32>>);

    #[async_trait]
    impl Strategy for Fixed {
        type Output = u32;

        async fn execute(&mut self) -> Outcome<u32> {
            self.0
                .take()
                .unwrap_or_else(|| Outcome::transport_failure("already executed"))
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn created_is_ok(response: &Response<u32>) -> Result<Analysis, AnalyzeError> {
        match response.code {
            codes::CREATED => Ok(Analysis::Ok(Extras::new().with("value", &response.payload)?)),
            code => Err(AnalyzeError::Unexpected { code }),
        }
    }

    #[tokio::test]
    async fn recognized_response_becomes_success() {
        let strategy = analyzed(Fixed(Some(Outcome::response(201, 7))), created_is_ok);
        let verdict = strategy.run().await;
        assert!(verdict.success);
        assert_eq!(verdict.extras.get::<u32>("value"), Some(7));
    }

    #[tokio::test]
    async fn unexpected_code_takes_failure_path() {
        let verdict = analyzed(Fixed(Some(Outcome::response(500, 0))), created_is_ok)
            .run()
            .await;
        assert!(!verdict.success);
        let info: FailureInfo = verdict.extras.get(EXTRA_ERROR).unwrap();
        assert_eq!(info.kind, FailureKind::Unexpected);
    }

    #[tokio::test]
    async fn strategy_failure_skips_analyzer() {
        let analyzer = |_: &Response<u32>| -> Result<Analysis, AnalyzeError> {
            panic!("analyzer must not run on strategy failure")
        };
        let outcome = Outcome::Failure(StrategyError::Transport("refused".into()));
        let verdict = analyzed(Fixed(Some(outcome)), analyzer).run().await;
        assert!(!verdict.success);
        let info: FailureInfo = verdict.extras.get(EXTRA_ERROR).unwrap();
        assert_eq!(info.kind, FailureKind::Transport);
    }

    #[tokio::test]
    async fn panicking_analyzer_is_contained() {
        let analyzer = |_: &Response<u32>| -> Result<Analysis, AnalyzeError> { panic!("boom") };
        let verdict = analyzed(Fixed(Some(Outcome::response(200, 1))), analyzer)
            .run()
            .await;
        assert!(!verdict.success);
        let info: FailureInfo = verdict.extras.get(EXTRA_ERROR).unwrap();
        assert_eq!(info.kind, FailureKind::Panicked);
    }

    struct Custom;

    impl ResultAnalyzer<u32> for Custom {
        fn analyze(&self, response: &Response<u32>) -> Result<Analysis, AnalyzeError> {
            Err(AnalyzeError::Unexpected {
                code: response.code,
            })
        }

        fn on_failure(&self, _failure: &Failure) -> Extras {
            Extras::new().with_flag("custom", true)
        }
    }

    #[tokio::test]
    async fn analyzer_supplies_failure_extras() {
        let verdict = analyzed(Fixed(Some(Outcome::response(418, 0))), Custom)
            .run()
            .await;
        assert!(!verdict.success);
        assert!(verdict.extras.flag("custom"));
        assert!(!verdict.extras.contains_key(EXTRA_ERROR));
    }

    #[tokio::test]
    async fn delay_is_applied_before_execution() {
        let mut strategy = analyzed(Fixed(Some(Outcome::response(201, 1))), created_is_ok);
        strategy.set_delay(Duration::from_millis(30));
        let started = Instant::now();
        let verdict = strategy.run().await;
        assert!(verdict.success);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn boxed_strategies_forward_to_the_inner_strategy() {
        let inner: Box<dyn Strategy<Output = u32>> = Box::new(Fixed(Some(Outcome::response(201, 3))));
        let strategy = analyzed(inner, created_is_ok);
        assert_eq!(strategy.label(), "fixed");
        assert!(strategy.run().await.success);
    }
}
