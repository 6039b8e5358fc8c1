use crate::errors::JobError;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;

// Type aliases for common types
pub type JobOutput = Box<dyn Any + Send>;
pub type JobResult = Result<JobOutput, JobError>;
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
