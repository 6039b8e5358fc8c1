use std::time::Duration;
use thiserror::Error;

use meshpool_api::SpawnError;

use crate::pool::slot::SlotStatus;

/// Errors raised by pool-management operations.
///
/// Per-job failures never appear here; they are captured in each job's
/// [`JobOutcome`](meshpool_api::JobOutcome). This type covers construction,
/// resize, lease, and shutdown failures, which are raised synchronously to
/// the caller of the operation.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A launch failed after exhausting its retry policy. Retryable.
    #[error("Spawn failed: {0}")]
    Spawn(#[from] SpawnError),

    /// No free port found in the managed range. Retryable with a wider
    /// range.
    #[error("No free port found in {scanned} ports starting at {start}")]
    PortExhaustion { start: u16, scanned: u16 },

    /// A supplied IP address failed validation. Caller error.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// The index does not name a live slot. Caller error.
    #[error("No live slot at index {0}")]
    IndexOutOfRange(usize),

    /// Removal blocked by in-flight or locked use. Retry with `force` or
    /// wait.
    #[error("Instance {index} is {status:?}; retry with force to remove it anyway")]
    InstanceBusy { index: usize, status: SlotStatus },

    /// Internal invariant violation in the slot state machine. Indicates
    /// a bug.
    #[error("Invalid slot status transition at index {index}: {from:?} -> {to:?}")]
    InvalidTransition {
        index: usize,
        from: SlotStatus,
        to: SlotStatus,
    },

    /// Pool construction under-provisioned; the whole construction is
    /// aborted and every already-started instance is terminated.
    #[error("Pool startup failed: {succeeded} of {requested} instances started")]
    PartialStartupFailure {
        succeeded: usize,
        requested: usize,
        failures: Vec<PoolError>,
    },

    /// A pool needs at least two instances.
    #[error("A pool requires at least 2 instances, got {0}")]
    PoolTooSmall(usize),

    /// `add_instance` failed after reserving a slot; the slot has been
    /// tombstoned.
    #[error("Failed to add instance: {cause}")]
    AddInstanceFailed {
        #[source]
        cause: Box<PoolError>,
    },

    /// The operation was refused because shutdown has begun.
    #[error("Pool is shutting down")]
    ShuttingDown,

    /// No live instance exists to dispatch onto.
    #[error("No live instances available")]
    NoInstances,

    /// A blocking pool operation exceeded its timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Filesystem failure while managing per-instance working
    /// directories.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal pool error.
    #[error("Internal pool error: {0}")]
    Other(#[from] anyhow::Error),
}
