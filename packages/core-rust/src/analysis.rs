//! Result analysis: turning raw outcomes into verdicts.
//!
//! An analyzer inspects a [`Response`] and returns a tagged [`Analysis`]. The
//! pipeline in [`judge`] folds strategy failures and analyzer failures into a
//! single failure path so that a strategy contributes exactly one [`Verdict`].
//! [`ResultPolicy`] combines the verdicts of all strategies of one invocation.

use serde::{Deserialize, Serialize};

use crate::decode::DecodeError;
use crate::extras::{Extras, EXTRA_ERROR};
use crate::outcome::{Outcome, Response, StrategyError};

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// What an analyzer concluded about a response, with the extras to publish.
#[derive(Debug, Clone, PartialEq)]
pub enum Analysis {
    /// The response counts as success; extras go with the `OK` notification.
    Ok(Extras),
    /// The response was understood but counts as failure; extras go with `ERROR`.
    Error(Extras),
}

impl Analysis {
    /// Success with no extras.
    #[must_use]
    pub fn ok() -> Self {
        Self::Ok(Extras::new())
    }

    /// Failure with no extras.
    #[must_use]
    pub fn error() -> Self {
        Self::Error(Extras::new())
    }
}

/// Errors raised while analyzing a response.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    /// The analyzer does not recognize this code/payload combination.
    #[error("unexpected response code {code}")]
    Unexpected { code: u16 },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A typed value could not be staged as an extra.
    #[error("cannot stage extra: {0}")]
    Extras(#[from] serde_json::Error),
    /// The analyzer panicked.
    #[error("analyzer panicked: {0}")]
    Panicked(String),
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

/// Either side of the single failure path.
#[derive(Debug)]
pub enum Failure {
    Strategy(StrategyError),
    Analyze(AnalyzeError),
}

/// Coarse classification of a failure, published with the default error extras.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    Storage,
    Fixture,
    Unexpected,
    Decode,
    Panicked,
}

impl Failure {
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Strategy(StrategyError::Transport(_)) => FailureKind::Transport,
            Self::Strategy(StrategyError::Storage(_)) => FailureKind::Storage,
            Self::Strategy(StrategyError::FixtureExhausted { .. }) => FailureKind::Fixture,
            Self::Analyze(AnalyzeError::Unexpected { .. }) => FailureKind::Unexpected,
            Self::Analyze(AnalyzeError::Decode(_) | AnalyzeError::Extras(_)) => {
                FailureKind::Decode
            }
            Self::Strategy(StrategyError::Panicked(_))
            | Self::Analyze(AnalyzeError::Panicked(_)) => FailureKind::Panicked,
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Strategy(err) => err.to_string(),
            Self::Analyze(err) => err.to_string(),
        }
    }
}

/// Failure details as published under [`EXTRA_ERROR`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub kind: FailureKind,
    pub message: String,
}

/// Extras published for a failure when the analyzer adds nothing of its own.
#[must_use]
pub fn failure_extras(failure: &Failure) -> Extras {
    let info = FailureInfo {
        kind: failure.kind(),
        message: failure.message(),
    };
    let mut extras = Extras::new();
    if let Err(err) = extras.insert(EXTRA_ERROR, &info) {
        tracing::warn!(error = %err, "failed to stage failure extras");
    }
    extras
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Final word of one strategy: success flag plus extras.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub success: bool,
    pub extras: Extras,
}

impl Verdict {
    #[must_use]
    pub fn success(extras: Extras) -> Self {
        Self {
            success: true,
            extras,
        }
    }

    #[must_use]
    pub fn failure(extras: Extras) -> Self {
        Self {
            success: false,
            extras,
        }
    }
}

impl From<Analysis> for Verdict {
    fn from(analysis: Analysis) -> Self {
        match analysis {
            Analysis::Ok(extras) => Self::success(extras),
            Analysis::Error(extras) => Self::failure(extras),
        }
    }
}

/// Runs the analysis pipeline for one outcome.
///
/// A strategy failure skips `analyze` entirely. An analyzer error is handled
/// exactly like a strategy failure: both go through `on_failure` and yield a
/// failed verdict.
pub fn judge<T, A, F>(outcome: Outcome<T>, analyze: A, on_failure: F) -> Verdict
where
    A: FnOnce(&Response<T>) -> Result<Analysis, AnalyzeError>,
    F: FnOnce(&Failure) -> Extras,
{
    let failure = match outcome {
        Outcome::Failure(err) => Failure::Strategy(err),
        Outcome::Response(response) => match analyze(&response) {
            Ok(analysis) => return analysis.into(),
            Err(err) => {
                tracing::info!(code = response.code, error = %err, "analyzer rejected response");
                Failure::Analyze(err)
            }
        },
    };
    Verdict::failure(on_failure(&failure))
}

// ---------------------------------------------------------------------------
// ResultPolicy
// ---------------------------------------------------------------------------

/// How the verdicts of a multi-strategy invocation combine into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultPolicy {
    /// The overall verdict is the verdict of the strategy at this index.
    /// Other strategies must still finish but do not affect the result.
    Primary(usize),
    /// Success only if every strategy succeeded.
    All,
}

impl Default for ResultPolicy {
    fn default() -> Self {
        Self::Primary(0)
    }
}

/// A policy that cannot be applied to the dispatched strategy set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("primary strategy index {index} out of range for {count} strategies")]
    PrimaryOutOfRange { index: usize, count: usize },
}

impl ResultPolicy {
    /// Checks the policy against the number of dispatched strategies.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::PrimaryOutOfRange`] when the primary index does
    /// not name a dispatched strategy.
    pub fn validate(self, count: usize) -> Result<(), PolicyError> {
        match self {
            Self::Primary(index) if index >= count => {
                Err(PolicyError::PrimaryOutOfRange { index, count })
            }
            _ => Ok(()),
        }
    }

    /// Combines per-strategy verdicts, given in dispatch order.
    ///
    /// `All` merges the extras of every verdict that agrees with the overall
    /// result, in dispatch order.
    #[must_use]
    pub fn combine(self, mut verdicts: Vec<Verdict>) -> Verdict {
        match self {
            Self::Primary(index) => {
                if index < verdicts.len() {
                    verdicts.swap_remove(index)
                } else {
                    Verdict::failure(Extras::new())
                }
            }
            Self::All => {
                let success = verdicts.iter().all(|v| v.success);
                let mut extras = Extras::new();
                for verdict in verdicts.into_iter().filter(|v| v.success == success) {
                    extras.merge(verdict.extras);
                }
                Verdict { success, extras }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::outcome::codes;

    fn accept_created(response: &Response<String>) -> Result<Analysis, AnalyzeError> {
        match response.code {
            codes::CREATED => Ok(Analysis::Ok(Extras::new().with_flag("created", true))),
            code => Err(AnalyzeError::Unexpected { code }),
        }
    }

    #[test]
    fn accepted_response_is_success() {
        let verdict = judge(
            Outcome::response(201, String::new()),
            accept_created,
            failure_extras,
        );
        assert!(verdict.success);
        assert!(verdict.extras.flag("created"));
    }

    #[test]
    fn analyzer_error_takes_failure_path() {
        let verdict = judge(
            Outcome::response(500, String::new()),
            accept_created,
            failure_extras,
        );
        assert!(!verdict.success);
        let info: FailureInfo = verdict.extras.get(EXTRA_ERROR).unwrap();
        assert_eq!(info.kind, FailureKind::Unexpected);
    }

    #[test]
    fn strategy_failure_skips_analyzer() {
        let verdict = judge(
            Outcome::<String>::transport_failure("timed out"),
            |_| panic!("analyzer must not run"),
            failure_extras,
        );
        assert!(!verdict.success);
        let info: FailureInfo = verdict.extras.get(EXTRA_ERROR).unwrap();
        assert_eq!(info.kind, FailureKind::Transport);
        assert_eq!(info.message, "transport failure: timed out");
    }

    #[test]
    fn analysis_error_variant_is_understood_failure() {
        let verdict = judge(
            Outcome::response(409, String::new()),
            |_| Ok(Analysis::Error(Extras::new().with_flag("conflict", true))),
            failure_extras,
        );
        assert!(!verdict.success);
        assert!(verdict.extras.flag("conflict"));
        assert!(!verdict.extras.contains_key(EXTRA_ERROR));
    }

    #[test]
    fn primary_policy_follows_primary() {
        let verdicts = vec![
            Verdict::failure(Extras::new().with_flag("primary", true)),
            Verdict::success(Extras::new().with_flag("secondary", true)),
        ];
        let combined = ResultPolicy::Primary(0).combine(verdicts.clone());
        assert!(!combined.success);
        assert!(combined.extras.flag("primary"));

        let combined = ResultPolicy::Primary(1).combine(verdicts);
        assert!(combined.success);
        assert!(combined.extras.flag("secondary"));
    }

    #[test]
    fn all_policy_merges_failing_extras() {
        let verdicts = vec![
            Verdict::success(Extras::new().with_flag("a", true)),
            Verdict::failure(Extras::new().with_flag("b", true)),
        ];
        let combined = ResultPolicy::All.combine(verdicts);
        assert!(!combined.success);
        assert!(combined.extras.flag("b"));
        assert!(!combined.extras.contains_key("a"));
    }

    #[test]
    fn validate_rejects_out_of_range_primary() {
        assert_eq!(
            ResultPolicy::Primary(2).validate(2),
            Err(PolicyError::PrimaryOutOfRange { index: 2, count: 2 })
        );
        assert!(ResultPolicy::Primary(1).validate(2).is_ok());
        assert!(ResultPolicy::All.validate(0).is_ok());
    }

    proptest! {
        #[test]
        fn all_policy_is_conjunction(flags in proptest::collection::vec(any::<bool>(), 1..8)) {
            let verdicts: Vec<Verdict> = flags
                .iter()
                .map(|&ok| if ok { Verdict::success(Extras::new()) } else { Verdict::failure(Extras::new()) })
                .collect();
            let combined = ResultPolicy::All.combine(verdicts);
            prop_assert_eq!(combined.success, flags.iter().all(|&ok| ok));
        }

        #[test]
        fn primary_policy_ignores_others(
            flags in proptest::collection::vec(any::<bool>(), 1..8),
            pick in any::<prop::sample::Index>(),
        ) {
            let index = pick.index(flags.len());
            let verdicts: Vec<Verdict> = flags
                .iter()
                .map(|&ok| if ok { Verdict::success(Extras::new()) } else { Verdict::failure(Extras::new()) })
                .collect();
            let combined = ResultPolicy::Primary(index).combine(verdicts);
            prop_assert_eq!(combined.success, flags[index]);
        }
    }
}
