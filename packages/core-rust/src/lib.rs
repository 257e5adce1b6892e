//! `opflow` core: operation status, strategy outcomes, result analysis,
//! notification addressing and snapshots.

pub mod analysis;
pub mod clock;
pub mod decode;
pub mod extras;
pub mod notification;
pub mod outcome;
pub mod snapshot;
pub mod status;

pub use analysis::{
    failure_extras, judge, Analysis, AnalyzeError, Failure, FailureInfo, FailureKind, PolicyError,
    ResultPolicy, Verdict,
};
pub use clock::{ClockSource, ManualClock, SystemClock};
pub use decode::{decode, looks_like_json, DecodeError};
pub use extras::{Extras, EXTRA_ERROR};
pub use notification::{EventKind, Notification, NotificationAddress, Scope, GLOBAL_INSTANCE};
pub use outcome::{codes, Outcome, Response, StrategyError};
pub use snapshot::{InvocationId, OperationSnapshot, SnapshotError};
pub use status::{ExecutionState, OperationStatus};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
