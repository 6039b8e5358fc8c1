use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

/// Default port the solver binds to when nothing else is configured.
pub const DEFAULT_STARTING_PORT: u16 = 50052;

// --- Retry policy ---

/// Bounded-retry-with-timeout shape used for every spawn attempt.
///
/// Kept as an explicit configuration value rather than hardcoded constants
/// so it is testable.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Maximum number of launch attempts before giving up.
    pub max_attempts: u32,

    /// Delay between attempts.
    pub backoff: Duration,

    /// Per-attempt launch timeout (process start plus readiness wait).
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

// --- Pool configuration ---

/// Configuration for a [`MeshPool`](crate::pool::MeshPool).
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of instances spawned at construction. Minimum 2.
    pub initial_size: usize,

    /// Address instances bind to unless a caller supplies one.
    pub base_ip: IpAddr,

    /// First port of the managed port range.
    pub starting_port: u16,

    /// How many ports past `starting_port` the free-port scan may visit
    /// before failing with `PortExhaustion`.
    pub port_scan_limit: u16,

    /// Path to the solver executable. `None` means the launcher's default.
    pub exec_file: Option<PathBuf>,

    /// Base directory for per-instance working directories. `None` means
    /// the system temporary directory.
    pub run_root: Option<PathBuf>,

    /// Whether an instance's working directory is deleted when the
    /// instance is removed or the pool shuts down.
    pub remove_work_dirs: bool,

    /// Maximum number of instances launched concurrently during
    /// construction, to avoid resource storms.
    pub max_parallel_spawn: usize,

    /// Retry policy applied to every launch attempt.
    pub spawn_retry: RetryPolicy,

    /// Per-job timeout during dispatch. Expiry marks the slot dead and
    /// records the job as failed. `None` means no limit.
    pub job_timeout: Option<Duration>,

    /// How long a dispatcher sleeps between free-slot scans when no
    /// wakeup arrives.
    pub dispatch_poll_interval: Duration,

    /// Interval between health-monitor passes.
    pub health_check_interval: Duration,

    /// Timeout for one liveness probe.
    pub probe_timeout: Duration,

    /// Whether dead instances are automatically respawned at the same
    /// slot index.
    pub auto_heal: bool,

    /// Respawn attempts per slot before it is left dead.
    pub max_heal_attempts: u32,

    /// Graceful-termination window for one instance, and the drain window
    /// for in-flight work during shutdown.
    pub shutdown_grace: Duration,

    /// Extra command-line arguments passed to every instance.
    pub extra_args: Vec<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: 2,
            base_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            starting_port: DEFAULT_STARTING_PORT,
            port_scan_limit: 2048,
            exec_file: None,
            run_root: None,
            remove_work_dirs: true,
            max_parallel_spawn: num_cpus::get(),
            spawn_retry: RetryPolicy::default(),
            job_timeout: None,
            dispatch_poll_interval: Duration::from_millis(10),
            health_check_interval: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
            auto_heal: true,
            max_heal_attempts: 3,
            shutdown_grace: Duration::from_secs(10),
            extra_args: Vec::new(),
        }
    }
}

impl PoolConfig {
    /// Shorthand for a pool of `n` instances with everything else at
    /// defaults.
    pub fn with_size(n: usize) -> Self {
        Self {
            initial_size: n,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_size, 2);
        assert_eq!(config.starting_port, DEFAULT_STARTING_PORT);
        assert!(config.auto_heal);
        assert!(config.max_parallel_spawn >= 1);
    }

    #[test]
    fn with_size_overrides_only_size() {
        let config = PoolConfig::with_size(8);
        assert_eq!(config.initial_size, 8);
        assert_eq!(config.starting_port, DEFAULT_STARTING_PORT);
    }
}
