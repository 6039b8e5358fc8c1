//! # Instance and Launcher Capabilities
//!
//! The two external capabilities the pool consumes:
//!
//! - [`Launcher`] starts one solver process and hands back a connection
//!   once the process is reachable.
//! - [`Instance`] is that connection: liveness probe, single submit call,
//!   and termination.
//!
//! A successful `Launcher::spawn` starts exactly one external process; the
//! caller becomes responsible for terminating it. Implementations must not
//! leave an orphaned process or bound socket behind on the failure path.

use async_trait::async_trait;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use crate::errors::{JobError, SpawnError, TerminateError};

/// Everything a launcher needs to start one solver instance.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Address the instance should bind to.
    pub ip: IpAddr,

    /// Port the instance should listen on. Always resolved by the caller;
    /// the launcher never picks its own port.
    pub port: u16,

    /// Human-readable instance name, used for logging.
    pub name: String,

    /// Path to the solver executable. `None` means the launcher's default.
    pub exec_file: Option<PathBuf>,

    /// Isolated working directory for this instance. Created by the caller
    /// before the spawn; one per instance so concurrently running jobs
    /// never collide on files.
    pub work_dir: PathBuf,

    /// Additional command-line arguments passed through verbatim.
    pub extra_args: Vec<String>,
}

impl SpawnRequest {
    /// The socket address the spawned instance will be reachable at.
    pub fn address(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

/// One running solver process plus its connection.
///
/// The connection is used by at most one caller at a time; the pool
/// enforces that through slot status, so implementations do not need
/// internal locking for `submit`.
#[async_trait]
pub trait Instance: Send + Sync + fmt::Debug {
    /// The address this instance is reachable at.
    fn address(&self) -> SocketAddr;

    /// Lightweight liveness probe. Returns `false` if the process has
    /// exited or the connection is severed. Must not block indefinitely.
    async fn ping(&self) -> bool;

    /// Submit one textual input to the instance and return its output.
    ///
    /// Raises `JobError::Transport` on connection failure, which the pool
    /// interprets as a possible dead instance.
    async fn submit(&self, input: &str) -> Result<String, JobError>;

    /// Request graceful termination: flush and close the connection, then
    /// ask the process to exit.
    async fn terminate(&self) -> Result<(), TerminateError>;

    /// Forcibly kill the process. Infallible by contract; used as the
    /// escalation path when graceful termination fails.
    async fn kill(&self);
}

/// Starts solver instances.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Start one instance per `req` and return its connection once the
    /// process is ready to accept work.
    async fn spawn(&self, req: SpawnRequest) -> Result<Arc<dyn Instance>, SpawnError>;
}
