//! # Capability Error Types
//!
//! Error types raised at the capability boundary between the pool and the
//! external solver: launching an instance, terminating it, and running a
//! job against it.
//!
//! Pool-level errors (slot bookkeeping, construction, resize) live in the
//! pool implementation crate; the types here are the ones a `Launcher` or
//! `Instance` implementation is expected to produce.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while launching a solver instance.
///
/// All variants are considered retryable by the pool's spawn retry policy
/// except where the caller explicitly requested a resource that is taken
/// (see `PortInUse` with an explicitly requested port).
#[derive(Error, Debug, Clone)]
pub enum SpawnError {
    /// The requested port is already bound by another process or sibling
    /// instance.
    #[error("Port {0} is already in use")]
    PortInUse(u16),

    /// The launcher process exited before the instance reported ready.
    #[error("Solver process exited before becoming ready: {0}")]
    ExitedEarly(String),

    /// The instance did not report ready within the launch timeout.
    #[error("Instance did not become ready within {0:?}")]
    ReadyTimeout(Duration),

    /// Any other launch failure, with a human-readable reason.
    #[error("Launch failed: {0}")]
    LaunchFailed(String),
}

/// Errors raised while terminating a solver instance.
#[derive(Error, Debug, Clone)]
pub enum TerminateError {
    /// The process did not exit within the graceful-termination window.
    #[error("Instance did not exit within {0:?}")]
    Timeout(Duration),

    /// Termination failed outright.
    #[error("Failed to terminate instance: {0}")]
    Failed(String),
}

/// Errors produced by a job running against one instance.
///
/// The pool inspects only the variant, never the payload: `Transport` and
/// `Timeout` mark the slot dead (the instance is presumed unusable), every
/// other variant returns the slot to the free state.
#[derive(Error, Debug)]
pub enum JobError {
    /// The job itself failed; the instance is presumed healthy.
    #[error("Job failed: {0}")]
    Failed(String),

    /// The connection to the instance broke mid-call.
    #[error("Transport failure talking to instance: {0}")]
    Transport(String),

    /// The job exceeded its per-job timeout.
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),

    /// Catch-all for errors carried out of user job closures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    /// Whether this failure indicates the instance itself is unusable.
    pub fn is_fatal_to_instance(&self) -> bool {
        matches!(self, JobError::Transport(_) | JobError::Timeout(_))
    }
}
