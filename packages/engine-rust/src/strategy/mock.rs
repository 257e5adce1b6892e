//! Deterministic strategy replaying scripted outcomes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opflow_core::{Outcome, StrategyError};
use parking_lot::Mutex;

use super::Strategy;

/// Errors raised by a [`MockFixture`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixtureError {
    /// More executions than scripted outcomes.
    #[error("mock fixture `{fixture}` exhausted after {consumed} outcomes")]
    Exhausted { fixture: String, consumed: usize },
}

impl From<FixtureError> for StrategyError {
    fn from(err: FixtureError) -> Self {
        match err {
            FixtureError::Exhausted { fixture, consumed } => {
                StrategyError::FixtureExhausted { fixture, consumed }
            }
        }
    }
}

struct FixtureState<T> {
    queue: VecDeque<Outcome<T>>,
    consumed: usize,
}

/// Ordered queue of scripted outcomes, shared by every mock strategy built
/// from it. Outcomes are handed out strictly in the order they were pushed.
pub struct MockFixture<T> {
    name: String,
    state: Mutex<FixtureState<T>>,
}

impl<T> MockFixture<T> {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_outcomes(name, std::iter::empty())
    }

    #[must_use]
    pub fn from_outcomes(
        name: impl Into<String>,
        outcomes: impl IntoIterator<Item = Outcome<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(FixtureState {
                queue: outcomes.into_iter().collect(),
                consumed: 0,
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends an outcome to the script.
    pub fn push(&self, outcome: Outcome<T>) {
        self.state.lock().queue.push_back(outcome);
    }

    pub fn push_response(&self, code: u16, payload: T) {
        self.push(Outcome::response(code, payload));
    }

    /// Takes the next scripted outcome.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError::Exhausted`] when the script is used up.
    pub fn pop(&self) -> Result<Outcome<T>, FixtureError> {
        let mut state = self.state.lock();
        match state.queue.pop_front() {
            Some(outcome) => {
                state.consumed += 1;
                Ok(outcome)
            }
            None => Err(FixtureError::Exhausted {
                fixture: self.name.clone(),
                consumed: state.consumed,
            }),
        }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.state.lock().queue.len()
    }

    #[must_use]
    pub fn consumed(&self) -> usize {
        self.state.lock().consumed
    }
}

/// Strategy that reports the next outcome of a [`MockFixture`].
pub struct MockStrategy<T> {
    fixture: Arc<MockFixture<T>>,
    delay: Duration,
}

impl<T> MockStrategy<T> {
    #[must_use]
    pub fn new(fixture: Arc<MockFixture<T>>) -> Self {
        Self {
            fixture,
            delay: Duration::ZERO,
        }
    }

    /// Simulated latency, applied after the outcome is taken.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl<T: Send + 'static> Strategy for MockStrategy<T> {
    type Output = T;

    async fn execute(&mut self) -> Outcome<T> {
        // Taken before the delay so concurrent strategies consume in dispatch order.
        let next = self.fixture.pop();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match next {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = %err, "mock strategy ran past its script");
                Outcome::Failure(err.into())
            }
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
