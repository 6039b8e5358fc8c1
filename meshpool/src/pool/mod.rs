//! # Pool Manager
//!
//! Supervises a fleet of independently launched solver instances:
//! bulk construction, dispatch of job sequences across free instances,
//! dynamic growth and shrink under concurrent access, health monitoring
//! with automatic healing, and orderly shutdown.
//!
//! The pool is an explicit value owning its slot table, counters, and
//! monitor task; there is no process-wide singleton. It is constructed
//! explicitly and torn down explicitly via [`MeshPool::shutdown`].
//!
//! # Thread Safety
//! - The slot table and resize counters are the only shared mutable
//!   state; all mutation funnels through the table's mutex
//! - Each instance connection is used by at most one task at a time,
//!   enforced by the `Busy`/`Locked` slot status
//! - `add_instance`/`remove_instance` serialize against dispatch's
//!   free-slot acquisition but never block unrelated in-flight jobs

pub mod config;
pub mod dispatch;
pub mod error;
pub mod launcher;
pub mod monitor;
pub mod slot;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use meshpool_api::{Instance, Launcher, SpawnError, TerminateError};

pub use config::{PoolConfig, RetryPolicy, DEFAULT_STARTING_PORT};
pub use dispatch::CancelToken;
pub use error::PoolError;
pub use launcher::AddInstanceOptions;
pub use slot::{InstanceHandle, SlotStatus};

use launcher::LauncherBridge;
use slot::SlotTable;

/// Shared state behind the pool façade. Dispatch tasks and the health
/// monitor hold an `Arc` of this.
pub(crate) struct PoolCore {
    pub(crate) table: SlotTable,
    pub(crate) bridge: LauncherBridge,
    pub(crate) config: Arc<PoolConfig>,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) shutdown_notify: Notify,
}

impl PoolCore {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }
}

/// A pool of independently launched solver instances.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use meshpool::{MeshPool, PoolConfig};
/// # async fn example(launcher: Arc<dyn meshpool::Launcher>) -> Result<(), meshpool::PoolError> {
/// let pool = MeshPool::new(launcher, PoolConfig::with_size(4)).await?;
/// assert_eq!(pool.len(), 4);
/// pool.shutdown().await?;
/// # Ok(())
/// # }
/// ```
pub struct MeshPool {
    core: Arc<PoolCore>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl MeshPool {
    /// Construct a pool of `config.initial_size` instances.
    ///
    /// Instances are spawned concurrently, bounded by
    /// `config.max_parallel_spawn`. If any spawn fails after retries the
    /// whole construction fails with `PartialStartupFailure` and every
    /// already-started instance is terminated: downstream job
    /// distribution assumes the requested capacity, so the pool never
    /// silently under-provisions.
    pub async fn new(
        launcher: Arc<dyn Launcher>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        let requested = config.initial_size;
        if requested < 2 {
            return Err(PoolError::PoolTooSmall(requested));
        }

        let config = Arc::new(config);
        let core = Arc::new(PoolCore {
            table: SlotTable::new(),
            bridge: LauncherBridge::new(launcher, config.clone()),
            config: config.clone(),
            shutting_down: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
        });

        let limit = Arc::new(Semaphore::new(config.max_parallel_spawn.max(1)));
        let mut spawns = Vec::with_capacity(requested);
        for _ in 0..requested {
            let index = core.table.allocate();
            core.table.inc_spawning();
            let core = core.clone();
            let limit = limit.clone();
            spawns.push(tokio::spawn(async move {
                let _permit = limit
                    .acquire_owned()
                    .await
                    .map_err(|e| PoolError::Other(anyhow::anyhow!(e)))?;
                spawn_into_slot(&core, index, &AddInstanceOptions::default()).await
            }));
        }

        let mut failures = Vec::new();
        for joined in futures::future::join_all(spawns).await {
            match joined {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => failures.push(e),
                Err(e) => failures.push(PoolError::Other(anyhow::anyhow!(e))),
            }
        }

        if !failures.is_empty() {
            let succeeded = core.table.live_len();
            // abort the whole pool rather than under-provision
            terminate_all(&core).await;
            core.table.retire_all();
            return Err(PoolError::PartialStartupFailure {
                succeeded,
                requested,
                failures,
            });
        }

        info!(size = requested, "pool started");
        let monitor = monitor::spawn_monitor(core.clone());
        Ok(Self {
            core,
            monitor: Mutex::new(Some(monitor)),
        })
    }

    /// Launch one more instance and append it to the pool.
    ///
    /// Safe to call concurrently with dispatch and with other resize
    /// calls; dispatch never observes the new slot as free before its
    /// instance is ready.
    pub async fn add_instance(&self, opts: AddInstanceOptions) -> Result<usize, PoolError> {
        if self.core.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }

        self.core.table.inc_spawning();
        let index = self.core.table.allocate();
        match spawn_into_slot(&self.core, index, &opts).await {
            Ok(index) => {
                info!(index, "instance added");
                Ok(index)
            }
            Err(
                cause @ (PoolError::InvalidAddress(_)
                | PoolError::PortExhaustion { .. }
                | PoolError::Spawn(SpawnError::PortInUse(_))),
            ) => {
                // caller errors keep their kind
                Err(cause)
            }
            Err(cause) => Err(PoolError::AddInstanceFailed {
                cause: Box::new(cause),
            }),
        }
    }

    /// Remove the instance at `index` from the pool.
    ///
    /// Refuses with `InstanceBusy` when the slot is `Busy` or `Locked`
    /// and `force` is false. With `force`, any in-flight job for the slot
    /// is abandoned and reported as cancelled. The slot is tombstoned
    /// regardless of how termination goes; a removed instance must never
    /// remain schedulable.
    pub async fn remove_instance(&self, index: usize, force: bool) -> Result<(), PoolError> {
        let handle = self.core.table.begin_remove(index, force)?;
        if let Some(handle) = handle {
            terminate_handle(&self.core, &handle).await;
        }
        self.core.table.finish_remove(index);
        info!(index, force, "instance removed");
        Ok(())
    }

    /// Shut the pool down: stop accepting work, drain in-flight jobs up
    /// to the grace timeout, terminate every instance, and tombstone the
    /// slot table. Idempotent; the second call is a no-op.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        if self.core.shutting_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.core.shutdown_notify.notify_waiters();

        // stop the health monitor before tearing instances down
        let monitor = self.monitor.lock().unwrap().take();
        if let Some(task) = monitor {
            let grace = self.core.config.shutdown_grace;
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!("health monitor did not stop within the grace timeout");
            }
        }

        // let in-flight work finish, bounded by the grace timeout
        let deadline = Instant::now() + self.core.config.shutdown_grace;
        while self.core.table.busy_or_locked_len() > 0 && Instant::now() < deadline {
            tokio::time::sleep(self.core.config.dispatch_poll_interval).await;
        }
        let abandoned = self.core.table.busy_or_locked_len();
        if abandoned > 0 {
            warn!(abandoned, "shutdown grace expired with jobs still in flight");
        }

        terminate_all(&self.core).await;
        self.core.table.retire_all();
        info!("pool shut down");
        Ok(())
    }

    // --- caller-held exclusivity ---

    /// Reserve the instance at `index` for a sequence of dependent calls.
    /// The slot stays `Locked` until the lease is dropped.
    pub fn lease(&self, index: usize) -> Result<InstanceLease, PoolError> {
        let handle = self.core.table.lock_slot(index)?;
        Ok(InstanceLease {
            core: self.core.clone(),
            index,
            handle,
            released: false,
        })
    }

    /// Reserve any free instance, waiting up to `wait` for one.
    pub async fn lease_any(&self, wait: Duration) -> Result<InstanceLease, PoolError> {
        let deadline = Instant::now() + wait;
        loop {
            if self.core.is_shutting_down() {
                return Err(PoolError::ShuttingDown);
            }
            if let Some((index, handle)) = self.core.table.try_lock_any() {
                return Ok(InstanceLease {
                    core: self.core.clone(),
                    index,
                    handle,
                    released: false,
                });
            }
            if Instant::now() >= deadline {
                return Err(PoolError::Timeout {
                    operation: "lease_any",
                    after: wait,
                });
            }
            tokio::select! {
                _ = self.core.table.free_notify().notified() => {}
                _ = tokio::time::sleep(self.core.config.dispatch_poll_interval) => {}
            }
        }
    }

    // --- inspection ---

    /// Number of live instances (slots not dead or tombstoned).
    pub fn len(&self) -> usize {
        self.core.table.live_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The connection of the live slot at `index`.
    pub fn get(&self, index: usize) -> Result<Arc<dyn Instance>, PoolError> {
        match self.core.table.status(index)? {
            SlotStatus::Retired => Err(PoolError::IndexOutOfRange(index)),
            _ => self
                .core
                .table
                .handle(index)
                .map(|h| h.connection)
                .ok_or(PoolError::IndexOutOfRange(index)),
        }
    }

    /// Snapshot of the live instances, in slot order.
    pub fn instances(&self) -> Vec<(usize, Arc<dyn Instance>)> {
        self.core
            .table
            .live_handles()
            .into_iter()
            .map(|(i, h)| (i, h.connection))
            .collect()
    }

    /// Consistent ordered view of every slot's status, tombstones
    /// included.
    pub fn snapshot_status(&self) -> Vec<(usize, SlotStatus)> {
        self.core.table.snapshot()
    }

    /// `(spawning_count, exiting_count)`.
    pub fn counters(&self) -> (usize, usize) {
        self.core.table.counters()
    }

    /// Whether no asynchronous resize operation is in flight.
    pub fn is_quiescent(&self) -> bool {
        self.counters() == (0, 0)
    }

    /// Wait until no resize operation is in flight, up to `wait`.
    pub async fn wait_quiescent(&self, wait: Duration) -> Result<(), PoolError> {
        let deadline = Instant::now() + wait;
        while !self.is_quiescent() {
            if Instant::now() >= deadline {
                return Err(PoolError::Timeout {
                    operation: "wait_quiescent",
                    after: wait,
                });
            }
            tokio::time::sleep(self.core.config.dispatch_poll_interval).await;
        }
        Ok(())
    }

    /// Run one health pass immediately, outside the monitor interval.
    pub async fn check_health_now(&self) {
        monitor::run_health_pass(&self.core).await;
    }
}

impl fmt::Display for MeshPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Solver pool with {} active instances", self.len())
    }
}

impl fmt::Debug for MeshPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshPool")
            .field("live", &self.len())
            .field("counters", &self.counters())
            .finish()
    }
}

impl Drop for MeshPool {
    fn drop(&mut self) {
        if !self.core.is_shutting_down() {
            warn!("pool dropped without shutdown; instances may leak until process exit");
        }
    }
}

/// RAII reservation of one instance for exclusive caller use.
///
/// The slot is `Locked` while the lease is alive and returns to `Free`
/// on drop. The health monitor leaves locked slots alone.
pub struct InstanceLease {
    core: Arc<PoolCore>,
    index: usize,
    handle: InstanceHandle,
    released: bool,
}

impl InstanceLease {
    /// Slot index of the leased instance.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The leased connection.
    pub fn instance(&self) -> &Arc<dyn Instance> {
        &self.handle.connection
    }

    /// Release the lease explicitly.
    pub fn release(mut self) {
        self.released = true;
        self.core.table.release_locked(self.index);
    }
}

impl Drop for InstanceLease {
    fn drop(&mut self) {
        if !self.released {
            self.core.table.release_locked(self.index);
        }
    }
}

impl fmt::Debug for InstanceLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceLease")
            .field("index", &self.index)
            .field("addr", &self.handle.addr)
            .finish()
    }
}

/// Spawn an instance into an already-allocated slot and publish it.
///
/// Brackets `spawning_count`; on failure the reserved slot is tombstoned
/// so dispatch never sees a half-initialized slot as free.
pub(crate) async fn spawn_into_slot(
    core: &Arc<PoolCore>,
    index: usize,
    opts: &AddInstanceOptions,
) -> Result<usize, PoolError> {
    let sibling_ports = core.table.ports_in_use();
    match core.bridge.spawn_instance(index, opts, &sibling_ports).await {
        Ok(handle) => {
            let port = handle.addr.port();
            core.table.attach_handle(index, handle.clone());
            match core.table.set_status(index, SlotStatus::Free) {
                Ok(()) => {
                    core.bridge.release_port(port);
                    core.table.dec_spawning();
                    debug!(index, port, "instance ready");
                    Ok(index)
                }
                Err(e) => {
                    // the slot was removed while the launch was in flight
                    terminate_handle(core, &handle).await;
                    core.bridge.release_port(port);
                    core.table.dec_spawning();
                    Err(e)
                }
            }
        }
        Err(e) => {
            let _ = core.table.set_status(index, SlotStatus::Retired);
            core.table.dec_spawning();
            Err(e)
        }
    }
}

/// Gracefully terminate one handle, escalating to a forced kill after
/// the grace timeout, then clean up its working directory.
pub(crate) async fn terminate_handle(core: &PoolCore, handle: &InstanceHandle) {
    let grace = core.config.shutdown_grace;
    let result: Result<Result<(), TerminateError>, _> =
        tokio::time::timeout(grace, handle.connection.terminate()).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(index = handle.index, error = %e, "graceful termination failed, killing");
            handle.connection.kill().await;
        }
        Err(_) => {
            warn!(index = handle.index, "termination timed out, killing");
            handle.connection.kill().await;
        }
    }
    if core.config.remove_work_dirs {
        if let Err(e) = tokio::fs::remove_dir_all(&handle.work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(index = handle.index, error = %e, "failed to remove work dir");
            }
        }
    }
}

/// Terminate every remaining instance concurrently.
pub(crate) async fn terminate_all(core: &PoolCore) {
    let drained = core.table.drain_for_shutdown();
    futures::future::join_all(
        drained
            .iter()
            .map(|(_, handle)| terminate_handle(core, handle)),
    )
    .await;
}
