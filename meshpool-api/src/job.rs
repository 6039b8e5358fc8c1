//! # Jobs and Job Outcomes
//!
//! A job is an opaque unit of work: it receives one instance connection,
//! does whatever it wants with it, and produces a result or an error. The
//! pool schedules jobs onto free instances but never interprets their
//! content.
//!
//! Closures are the common case; [`job_fn`] adapts any suitable closure
//! into a [`BoxedJob`].

use std::fmt;
use std::sync::Arc;

use crate::errors::JobError;
use crate::instance::Instance;
use crate::types::{BoxedFuture, JobOutput, JobResult};

/// An opaque unit of work executed against one solver instance.
///
/// `run` consumes the job: a job executes at most once.
pub trait Job: Send + 'static {
    fn run(self: Box<Self>, instance: Arc<dyn Instance>) -> BoxedFuture<'static, JobResult>;
}

pub type BoxedJob = Box<dyn Job>;

impl<F> Job for F
where
    F: FnOnce(Arc<dyn Instance>) -> BoxedFuture<'static, JobResult> + Send + 'static,
{
    fn run(self: Box<Self>, instance: Arc<dyn Instance>) -> BoxedFuture<'static, JobResult> {
        (*self)(instance)
    }
}

/// Adapt a closure into a boxed job.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use meshpool_api::{job_fn, BoxedFuture, Instance, JobOutput, JobResult};
///
/// let job = job_fn(|instance: Arc<dyn Instance>| -> BoxedFuture<'static, JobResult> {
///     Box::pin(async move {
///         let out = instance.submit("/SOLVE").await?;
///         Ok(Box::new(out) as JobOutput)
///     })
/// });
/// ```
pub fn job_fn<F>(f: F) -> BoxedJob
where
    F: FnOnce(Arc<dyn Instance>) -> BoxedFuture<'static, JobResult> + Send + 'static,
{
    Box::new(f)
}

/// The per-job result of a pool dispatch call.
///
/// A dispatch call always yields one outcome per input job, in input
/// order. Job failures are captured here rather than raised, so one bad
/// job never aborts its siblings.
pub enum JobOutcome {
    /// The job ran to completion; carries its output.
    Completed(JobOutput),

    /// The job raised; carries the captured error.
    Failed(JobError),

    /// The job was never dispatched (cancellation, shutdown) or its slot
    /// was forcibly removed mid-flight.
    Cancelled,
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobOutcome::Cancelled)
    }

    /// The captured error, if the job failed.
    pub fn error(&self) -> Option<&JobError> {
        match self {
            JobOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Take the output, if the job completed.
    pub fn into_output(self) -> Option<JobOutput> {
        match self {
            JobOutcome::Completed(out) => Some(out),
            _ => None,
        }
    }
}

impl fmt::Debug for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Completed(_) => f.write_str("Completed(..)"),
            JobOutcome::Failed(e) => write!(f, "Failed({e})"),
            JobOutcome::Cancelled => f.write_str("Cancelled"),
        }
    }
}
