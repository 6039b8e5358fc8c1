//! # Launcher Integration
//!
//! Wraps the external [`Launcher`] capability with the pool-specific
//! concerns the capability itself does not cover: free-port selection
//! from a managed range, IP validation, per-instance working-directory
//! isolation, readiness timeout, and bounded retry.
//!
//! Port reservations live here rather than in the slot table because a
//! port must be held from the moment it is selected until the spawned
//! instance's handle lands in the table; two concurrent `add_instance`
//! calls must never be granted the same port.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, warn};
use uuid::Uuid;

use meshpool_api::{Launcher, SpawnError, SpawnRequest};

use crate::pool::config::PoolConfig;
use crate::pool::error::PoolError;
use crate::pool::slot::InstanceHandle;

/// Whether `port` is already bound on `ip`.
pub fn port_in_use(ip: IpAddr, port: u16) -> bool {
    TcpListener::bind(SocketAddr::new(ip, port)).is_err()
}

/// Parse and validate a caller-supplied IP string.
pub fn validate_ip(ip: &str) -> Result<IpAddr, PoolError> {
    ip.parse()
        .map_err(|_| PoolError::InvalidAddress(ip.to_string()))
}

/// Caller-facing knobs for one `add_instance` call. Everything omitted
/// falls back to the pool configuration.
#[derive(Debug, Clone, Default)]
pub struct AddInstanceOptions {
    /// IP address for the new instance, validated before use.
    pub ip: Option<String>,

    /// Explicit port. When omitted the pool selects the first free port
    /// from its managed range.
    pub port: Option<u16>,

    /// Instance name for logging. Defaults to `instance-{index}`.
    pub name: Option<String>,

    /// Solver executable override.
    pub exec_file: Option<PathBuf>,
}

/// The pool's view of the launcher capability.
pub(crate) struct LauncherBridge {
    launcher: Arc<dyn Launcher>,
    config: Arc<PoolConfig>,

    /// Ports selected but not yet visible through the slot table.
    reserved: Mutex<HashSet<u16>>,
}

impl LauncherBridge {
    pub fn new(launcher: Arc<dyn Launcher>, config: Arc<PoolConfig>) -> Self {
        Self {
            launcher,
            config,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Reserve a port for an instance about to spawn.
    ///
    /// An explicitly requested port fails immediately with `SpawnError`
    /// when taken; an omitted port triggers a bounded scan of the managed
    /// range, skipping sibling ports, reserved ports, and ports bound on
    /// the host.
    pub fn reserve_port(
        &self,
        requested: Option<u16>,
        ip: IpAddr,
        sibling_ports: &[u16],
    ) -> Result<u16, PoolError> {
        let mut reserved = self.reserved.lock().unwrap();
        if let Some(port) = requested {
            if reserved.contains(&port)
                || sibling_ports.contains(&port)
                || port_in_use(ip, port)
            {
                return Err(PoolError::Spawn(SpawnError::PortInUse(port)));
            }
            reserved.insert(port);
            return Ok(port);
        }

        let start = self.config.starting_port;
        let limit = self.config.port_scan_limit;
        for offset in 0..limit {
            let Some(port) = start.checked_add(offset) else {
                break;
            };
            if reserved.contains(&port) || sibling_ports.contains(&port) {
                continue;
            }
            if port_in_use(ip, port) {
                continue;
            }
            reserved.insert(port);
            return Ok(port);
        }
        Err(PoolError::PortExhaustion {
            start,
            scanned: limit,
        })
    }

    /// Return a reservation once the port is either visible through the
    /// slot table or no longer needed.
    pub fn release_port(&self, port: u16) {
        self.reserved.lock().unwrap().remove(&port);
    }

    /// Create the isolated working directory for the slot at `index`.
    fn create_work_dir(&self, index: usize) -> Result<PathBuf, PoolError> {
        let root = self
            .config
            .run_root
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        let dir = root.join(format!("meshpool-{index}-{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Launch one instance for the slot at `index`, applying the spawn
    /// retry policy. The returned handle's port stays reserved; the
    /// caller releases it after attaching the handle to the slot table.
    ///
    /// Guarantees cleanup on the failure path: the working directory is
    /// removed and the port reservation returned before the error
    /// surfaces.
    pub async fn spawn_instance(
        &self,
        index: usize,
        opts: &AddInstanceOptions,
        sibling_ports: &[u16],
    ) -> Result<InstanceHandle, PoolError> {
        let ip = match &opts.ip {
            Some(raw) => validate_ip(raw)?,
            None => self.config.base_ip,
        };
        let name = opts
            .name
            .clone()
            .unwrap_or_else(|| format!("instance-{index}"));
        let exec_file = opts.exec_file.clone().or_else(|| self.config.exec_file.clone());
        let policy = &self.config.spawn_retry;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let port = self.reserve_port(opts.port, ip, sibling_ports)?;
            let work_dir = match self.create_work_dir(index) {
                Ok(dir) => dir,
                Err(e) => {
                    self.release_port(port);
                    return Err(e);
                }
            };

            let req = SpawnRequest {
                ip,
                port,
                name: name.clone(),
                exec_file: exec_file.clone(),
                work_dir: work_dir.clone(),
                extra_args: self.config.extra_args.clone(),
            };

            debug!(index, %ip, port, attempt, "launching instance");
            let spawned = tokio::time::timeout(policy.timeout, self.launcher.spawn(req)).await;

            let error = match spawned {
                Ok(Ok(connection)) => {
                    return Ok(InstanceHandle {
                        index,
                        addr: SocketAddr::new(ip, port),
                        connection,
                        work_dir,
                        created_at: Instant::now(),
                    });
                }
                Ok(Err(e)) => e,
                Err(_) => SpawnError::ReadyTimeout(policy.timeout),
            };

            // failure path: no orphaned socket or directory left behind
            self.release_port(port);
            if let Err(e) = std::fs::remove_dir_all(&work_dir) {
                warn!(index, dir = %work_dir.display(), error = %e, "failed to remove work dir");
            }

            if attempt >= policy.max_attempts {
                return Err(PoolError::Spawn(error));
            }
            warn!(index, attempt, error = %error, "launch attempt failed, retrying");
            tokio::time::sleep(policy.backoff).await;
        }
    }
}
