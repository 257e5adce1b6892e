//! Lifecycle status of an operation and execution state of its strategies.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an operation instance.
///
/// ```text
/// Ready | Waiting --perform--> Executing --last completion--> Finished
/// Finished --reset--> Ready
/// ```
///
/// A `perform` call while `Executing` only re-announces the start; a call while
/// `Finished` replays the stored terminal outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Idle and ready to dispatch. Initial status.
    #[default]
    Ready,
    /// Explicitly deferred by the caller; behaves like `Ready` on the next dispatch.
    Waiting,
    /// Strategies are in flight.
    Executing,
    /// Terminal outcome computed and stored until `reset`.
    Finished,
}

impl OperationStatus {
    /// Whether a `perform` call in this status dispatches new work.
    #[must_use]
    pub fn accepts_dispatch(self) -> bool {
        matches!(self, Self::Ready | Self::Waiting)
    }

    /// Stable lowercase name used in logs and metrics labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Waiting => "waiting",
            Self::Executing => "executing",
            Self::Finished => "finished",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution state of one dispatched strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Spawned but not yet started.
    #[default]
    Pending,
    /// Running (including any artificial delay).
    Running,
    /// Outcome reported.
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_status_is_ready() {
        assert_eq!(OperationStatus::default(), OperationStatus::Ready);
    }

    #[test]
    fn only_ready_and_waiting_accept_dispatch() {
        assert!(OperationStatus::Ready.accepts_dispatch());
        assert!(OperationStatus::Waiting.accepts_dispatch());
        assert!(!OperationStatus::Executing.accepts_dispatch());
        assert!(!OperationStatus::Finished.accepts_dispatch());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&OperationStatus::Executing).unwrap();
        assert_eq!(json, "\"executing\"");
        let back: OperationStatus = serde_json::from_str("\"waiting\"").unwrap();
        assert_eq!(back, OperationStatus::Waiting);
    }
}
