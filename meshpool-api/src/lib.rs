//! # Meshpool Capability API
//!
//! This crate defines the interfaces between the meshpool instance pool and
//! the external finite-element solver it orchestrates. The pool never talks
//! to a solver process directly; it consumes two capabilities that are
//! implemented elsewhere (by the gRPC launcher/client stack, or by mocks in
//! tests):
//!
//! - **Launcher**: starts one solver process bound to a network port and
//!   returns a live connection once the process is ready.
//! - **Instance**: one running solver process plus its connection. Exposes a
//!   liveness probe, a textual submit call, and termination.
//!
//! ## Design Principles
//!
//! - **Opaque work units**: a [`job::Job`] is a closed function type taking
//!   one instance connection and producing a result. The pool never
//!   interprets job content.
//! - **Capability boundaries**: everything the pool needs from the solver
//!   side is expressed here as an async trait, so the pool can be exercised
//!   without a solver installation.
//! - **Typed failures**: launch, termination, and job failures are separate
//!   error enums so callers can branch on them.
//!
//! ## Module Organization
//!
//! - [`instance`]: the `Instance` and `Launcher` traits and `SpawnRequest`
//! - [`job`]: the `Job` trait, job outcomes, and closure adapters
//! - [`errors`]: capability-level error types
//! - [`types`]: common type aliases

pub mod errors;
pub mod instance;
pub mod job;
pub mod types;

pub use errors::{JobError, SpawnError, TerminateError};
pub use instance::{Instance, Launcher, SpawnRequest};
pub use job::{job_fn, BoxedJob, Job, JobOutcome};
pub use types::{BoxedFuture, JobOutput, JobResult};
