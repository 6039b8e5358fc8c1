//! # Job Dispatch
//!
//! Distributes a sequence of jobs across the pool's free instances.
//! Results come back in input order even though execution is concurrent
//! and unordered in time: the dispatcher records each outcome at its
//! job's input position.
//!
//! A work queue is seeded from the input sequence; the dispatcher pulls
//! the next job, waits for a free slot, and hands the job to that slot
//! as an independent task. One job's failure is captured in its own
//! outcome and never aborts siblings. Transport failures and per-job
//! timeouts mark the slot dead; the health monitor takes it from there.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_queue::SegQueue;
use futures::FutureExt;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{debug, warn};

use meshpool_api::{
    job_fn, BoxedFuture, BoxedJob, Instance, JobError, JobOutcome, JobOutput, JobResult,
};

use crate::pool::error::PoolError;
use crate::pool::slot::{InstanceHandle, SlotStatus};
use crate::pool::{MeshPool, PoolCore};

/// Cooperative cancellation handle for a dispatch call.
///
/// Cancelling drops every queued-but-undispatched job (reported as
/// `Cancelled`) and lets in-flight jobs finish.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    flag: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                flag: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    pub(crate) fn notified(&self) -> Notified<'_> {
        self.inner.notify.notified()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshPool {
    /// Run a sequence of jobs across the pool.
    ///
    /// Always returns one outcome per input job, in input order: success,
    /// captured failure, or cancelled. Never raises for per-job failures.
    pub async fn run(&self, jobs: Vec<BoxedJob>) -> Result<Vec<JobOutcome>, PoolError> {
        self.run_with_cancel(jobs, CancelToken::new()).await
    }

    /// [`run`](MeshPool::run) with cooperative cancellation.
    pub async fn run_with_cancel(
        &self,
        jobs: Vec<BoxedJob>,
        cancel: CancelToken,
    ) -> Result<Vec<JobOutcome>, PoolError> {
        if self.core.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }
        if self.core.table.dispatchable_len() == 0 {
            return Err(PoolError::NoInstances);
        }

        let total = jobs.len();
        let results: Arc<Mutex<Vec<Option<JobOutcome>>>> =
            Arc::new(Mutex::new((0..total).map(|_| None).collect()));

        // work queue seeded from the input sequence
        let queue: SegQueue<(usize, BoxedJob)> = SegQueue::new();
        for pair in jobs.into_iter().enumerate() {
            queue.push(pair);
        }
        debug!(total, "dispatch started");

        let mut tasks = Vec::with_capacity(total);
        while let Some((position, job)) = queue.pop() {
            let acquired = self.acquire_for_dispatch(&cancel).await;
            let Some((slot, handle)) = acquired else {
                results.lock().unwrap()[position] = Some(JobOutcome::Cancelled);
                continue;
            };

            let core = self.core.clone();
            let results = results.clone();
            tasks.push(tokio::spawn(async move {
                let outcome = execute_job(&core, slot, handle, job).await;
                results.lock().unwrap()[position] = Some(outcome);
            }));
        }

        // in-flight jobs are allowed to finish, cancelled or not
        for task in tasks {
            let _ = task.await;
        }

        let collected = match Arc::try_unwrap(results) {
            Ok(mutex) => mutex.into_inner().unwrap(),
            Err(arc) => std::mem::take(&mut *arc.lock().unwrap()),
        };
        Ok(collected
            .into_iter()
            .map(|outcome| outcome.unwrap_or(JobOutcome::Cancelled))
            .collect())
    }

    /// Map a sequence of textual solver inputs over the pool.
    ///
    /// Each input is submitted to one instance via the single-instance
    /// capability; each completed outcome carries the instance's textual
    /// output as a `String`.
    pub async fn run_batch(&self, inputs: Vec<String>) -> Result<Vec<JobOutcome>, PoolError> {
        let jobs = inputs
            .into_iter()
            .map(|input| {
                job_fn(move |instance: Arc<dyn Instance>| -> BoxedFuture<'static, JobResult> {
                    Box::pin(async move {
                        let output = instance.submit(&input).await?;
                        Ok(Box::new(output) as JobOutput)
                    })
                })
            })
            .collect();
        self.run(jobs).await
    }

    /// Wait until a free slot can be flipped to `Busy`, or until the run
    /// can no longer make progress (cancellation, shutdown, or no
    /// dispatchable slot left).
    async fn acquire_for_dispatch(
        &self,
        cancel: &CancelToken,
    ) -> Option<(usize, InstanceHandle)> {
        loop {
            if cancel.is_cancelled() || self.core.is_shutting_down() {
                return None;
            }
            if self.core.table.dispatchable_len() == 0 {
                warn!("no dispatchable instance left; dropping remaining jobs");
                return None;
            }
            if let Some(acquired) = self.core.table.try_acquire_free() {
                return Some(acquired);
            }
            tokio::select! {
                _ = self.core.table.free_notify().notified() => {}
                _ = cancel.notified() => {}
                _ = tokio::time::sleep(self.core.config.dispatch_poll_interval) => {}
            }
        }
    }
}

/// Execute one job on its acquired slot and settle the slot afterwards.
///
/// Panics inside the job are contained and reported as a failed outcome.
/// A slot whose instance proved unreachable goes `Dead` instead of back
/// to `Free`; a slot force-removed mid-flight turns the outcome into
/// `Cancelled`.
async fn execute_job(
    core: &PoolCore,
    slot: usize,
    handle: InstanceHandle,
    job: BoxedJob,
) -> JobOutcome {
    let fut = AssertUnwindSafe(job.run(handle.connection.clone())).catch_unwind();
    let result: JobResult = match core.config.job_timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(Ok(result)) => result,
            Ok(Err(_panic)) => Err(JobError::Failed("job panicked".to_string())),
            Err(_) => Err(JobError::Timeout(limit)),
        },
        None => match fut.await {
            Ok(result) => result,
            Err(_panic) => Err(JobError::Failed("job panicked".to_string())),
        },
    };

    let next = match &result {
        Err(e) if e.is_fatal_to_instance() => {
            warn!(slot, error = %e, "instance unreachable during job, marking dead");
            SlotStatus::Dead
        }
        _ => SlotStatus::Free,
    };

    if !core.table.release_busy(slot, next) {
        debug!(slot, "slot removed mid-flight, job reported cancelled");
        return JobOutcome::Cancelled;
    }
    match result {
        Ok(output) => JobOutcome::Completed(output),
        Err(e) => JobOutcome::Failed(e),
    }
}
