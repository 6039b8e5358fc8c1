//! # Health Monitor
//!
//! Background loop that detects instances that have silently died
//! (process exited, connection severed) despite no in-flight job
//! reporting a failure, and respawns them in place when auto-healing is
//! enabled.
//!
//! The loop never holds the pool-wide mutex across a probe: it snapshots
//! probe targets under the mutex, performs the network round-trips
//! outside it, then re-acquires to apply each transition, and only if
//! the slot's status is unchanged, so a slot that was locked, removed,
//! or acquired in the meantime is left alone.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::pool::launcher::AddInstanceOptions;
use crate::pool::{terminate_handle, PoolCore};

/// Start the monitor loop for `core`. The task exits promptly once
/// shutdown begins.
pub(crate) fn spawn_monitor(core: Arc<PoolCore>) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(
            interval = ?core.config.health_check_interval,
            auto_heal = core.config.auto_heal,
            "health monitor started"
        );
        loop {
            tokio::select! {
                _ = core.shutdown_notify.notified() => break,
                _ = tokio::time::sleep(core.config.health_check_interval) => {}
            }
            if core.is_shutting_down() {
                break;
            }
            run_health_pass(&core).await;
        }
        debug!("health monitor stopped");
    })
}

/// One monitor pass: probe every eligible slot, mark failures dead, and
/// heal dead slots in place.
pub(crate) async fn run_health_pass(core: &Arc<PoolCore>) {
    let targets = core.table.probe_targets();
    for (index, observed_status, connection) in targets {
        if core.is_shutting_down() {
            return;
        }
        let alive = matches!(
            tokio::time::timeout(core.config.probe_timeout, connection.ping()).await,
            Ok(true)
        );
        if alive {
            core.table.note_health_check(index);
            continue;
        }
        // apply under the mutex, and only if the slot hasn't moved on
        if core.table.mark_dead_if(index, observed_status) {
            warn!(index, "instance failed liveness probe, marked dead");
        }
    }

    if core.config.auto_heal {
        heal_dead_slots(core).await;
    }
}

/// Respawn dead slots at their own index, bounded per slot by
/// `max_heal_attempts`.
async fn heal_dead_slots(core: &Arc<PoolCore>) {
    for index in core.table.healable_slots(core.config.max_heal_attempts) {
        if core.is_shutting_down() {
            return;
        }
        let Some(stale) = core.table.begin_heal(index, core.config.max_heal_attempts) else {
            continue;
        };
        if let Some(stale) = stale {
            // tear the old process down before its port is reconsidered
            terminate_handle(core, &stale).await;
        }

        let sibling_ports = core.table.ports_in_use();
        let opts = AddInstanceOptions::default();
        match core.bridge.spawn_instance(index, &opts, &sibling_ports).await {
            Ok(handle) => {
                let port = handle.addr.port();
                if core.table.finish_heal_success(index, handle.clone()) {
                    core.bridge.release_port(port);
                    core.table.note_health_check(index);
                    info!(index, port, "instance healed");
                } else {
                    // the slot was removed while the replacement launched
                    terminate_handle(core, &handle).await;
                    core.bridge.release_port(port);
                }
            }
            Err(e) => {
                core.table.finish_heal_failure(index);
                error!(index, error = %e, "heal attempt failed");
            }
        }
    }
}
