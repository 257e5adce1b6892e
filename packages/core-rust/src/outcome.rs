//! Raw strategy outcomes.
//!
//! A strategy reports exactly one [`Outcome`]: either a [`Response`] carrying a
//! result code and payload, or a [`StrategyError`] describing why no response
//! was produced. Interpretation of the outcome belongs to the analyzer.

use serde::{Deserialize, Serialize};

/// Result codes shared by the bundled strategies.
///
/// Network strategies report the HTTP status verbatim; storage strategies map
/// their results onto the same vocabulary.
pub mod codes {
    pub const OK: u16 = 200;
    pub const CREATED: u16 = 201;
    pub const NO_CONTENT: u16 = 204;
    pub const NOT_FOUND: u16 = 404;
}

/// A result code plus payload produced by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    /// Result code (HTTP status for network strategies).
    pub code: u16,
    /// Payload produced alongside the code.
    pub payload: T,
}

impl<T> Response<T> {
    #[must_use]
    pub fn new(code: u16, payload: T) -> Self {
        Self { code, payload }
    }

    /// Whether the code is in the 2xx range.
    #[must_use]
    pub fn is_success_code(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

/// Failure raised by a strategy before any response existed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum StrategyError {
    /// The transport (network, socket, TLS, timeout) failed.
    #[error("transport failure: {0}")]
    Transport(String),
    /// A mock strategy ran after its scripted outcomes were used up.
    #[error("mock fixture `{fixture}` exhausted after {consumed} outcomes")]
    FixtureExhausted { fixture: String, consumed: usize },
    /// The key-value repository failed.
    #[error("storage failure: {0}")]
    Storage(String),
    /// The strategy panicked before reporting.
    #[error("strategy panicked: {0}")]
    Panicked(String),
}

/// Immutable outcome of one strategy execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome<T> {
    /// The strategy could not produce a response.
    Failure(StrategyError),
    /// The strategy produced a response.
    Response(Response<T>),
}

impl<T> Outcome<T> {
    /// Shorthand for `Outcome::Response(Response::new(code, payload))`.
    #[must_use]
    pub fn response(code: u16, payload: T) -> Self {
        Self::Response(Response::new(code, payload))
    }

    /// Shorthand for a transport failure.
    #[must_use]
    pub fn transport_failure(message: impl Into<String>) -> Self {
        Self::Failure(StrategyError::Transport(message.into()))
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Result code, if a response was produced.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Failure(_) => None,
            Self::Response(response) => Some(response.code),
        }
    }
}
