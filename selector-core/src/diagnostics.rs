//! Diagnostics snapshots.
//!
//! Snapshots are for inspection tooling only. Their shape carries no
//! compatibility promise.

use serde::Serialize;

use crate::engine::Phase;
use crate::error::Result;

/// Point-in-time view of one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub phase: Phase,
    pub has_value: bool,
    /// An asynchronous fault is waiting for the next compute.
    pub has_error: bool,
    /// A computed value has not been committed yet.
    pub pending_commit: bool,
    /// Selector invocations, including development checks.
    pub selector_runs: u64,
    /// Re-invoke signals sent to the host.
    pub notifications: u64,
    /// Subscription nodes built over the engine's lifetime.
    pub attach_cycles: u64,
    pub deferred_faults: u64,
    pub stability_warnings: u64,
    pub identity_warnings: u64,
}

impl EngineSnapshot {
    /// Render the snapshot as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
