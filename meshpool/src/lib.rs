// Meshpool
//
// This crate implements a pool manager for a fleet of independently
// launched finite-element solver instances, enabling concurrent
// distributed execution of many independent jobs (e.g. Monte Carlo
// trials) across N running instances of the external engine.
//
// The solver itself is an external collaborator: the pool consumes the
// launcher and single-instance capabilities defined in `meshpool-api`.

pub mod logging;
pub mod pool;

// Re-export commonly used types
pub use pool::{
    AddInstanceOptions, CancelToken, InstanceHandle, InstanceLease, MeshPool, PoolConfig,
    PoolError, RetryPolicy, SlotStatus,
};

// Re-export the capability layer so callers need only one crate
pub use meshpool_api as api;
pub use meshpool_api::{
    job_fn, BoxedJob, Instance, Job, JobError, JobOutcome, JobOutput, JobResult, Launcher,
    SpawnError, SpawnRequest, TerminateError,
};
