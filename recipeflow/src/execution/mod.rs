//! Component execution: jobs, dispatch, validation and usage accounting.
//!
//! A step's batch runs as one [`Execution`] call over one [`Job`] per
//! started row. [`ExecutionWrapper`] validates inputs and outputs against
//! the task's JSON Schemas and brackets the batch with a single usage
//! `check` and `collect`. Failures of a single job go to that job's error
//! sink and never affect its siblings.

mod executor;
mod job;
mod schema;
mod usage;
mod wrapper;

pub use executor::{execute_concurrent, execute_sequential, Execution, JobExecution, JobHandler};
pub use job::{ErrorHandler, InputReader, Job, JobCell, OutputWriter};
pub use schema::CompiledSchema;
pub use usage::{noop_usage_handler, NoopUsageHandler, UsageHandler};
pub use wrapper::ExecutionWrapper;
