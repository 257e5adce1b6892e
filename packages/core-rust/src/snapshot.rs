//! Suspend/resume snapshot of an operation.
//!
//! A snapshot captures everything needed to rebuild an operation instance in
//! the same process: identity, status, timing, the stored verdict and the
//! handle of the in-flight invocation. The strategies themselves stay in the
//! engine's invocation arena; the handle lets a restored operation re-attach
//! to them instead of dispatching again.
//!
//! # Wire format
//!
//! Snapshots serialize with `serde`; [`OperationSnapshot::to_msgpack`] and
//! [`OperationSnapshot::to_json`] are provided for callers that persist them
//! as bytes or text.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::Verdict;
use crate::status::OperationStatus;

/// Identifier of one dispatched invocation (one `perform` that started work).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(pub Uuid);

impl InvocationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Serializable state of one operation instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub operation_type: String,
    pub instance_id: String,
    pub status: OperationStatus,
    /// Set while executing and after finishing.
    pub started_at_ms: Option<u64>,
    /// Set once finished.
    pub result: Option<Verdict>,
    /// Set while executing.
    pub invocation: Option<InvocationId>,
    pub connection_delay_ms: u64,
}

/// Errors from encoding or decoding a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("msgpack encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("msgpack decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("json snapshot failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl OperationSnapshot {
    /// Encodes the snapshot as `MsgPack` (named fields).
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Encode`] if serialization fails.
    pub fn to_msgpack(&self) -> Result<Vec<u8>, SnapshotError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    /// # Errors
    ///
    /// Returns [`SnapshotError::Decode`] if `bytes` is not a valid snapshot.
    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, SnapshotError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }

    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// # Errors
    ///
    /// Returns [`SnapshotError::Json`] if `text` is not a valid snapshot.
    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(text)?)
    }
}
