//! Pipeline runner.
//!
//! [`PipelineRunner`] sorts a recipe's steps into waves and runs every wave
//! over a [`RunMemory`](crate::memory::RunMemory) of one row per input:
//!
//! 1. per row, a step is skipped when an upstream step did not complete or
//!    its condition is false ([`process_condition`]);
//! 2. the remaining rows become one batch of memory-backed jobs, dispatched
//!    through the step component's [`ExecutionWrapper`](crate::execution::ExecutionWrapper);
//! 3. iterator steps run their nested steps once per iteration in a child
//!    memory and collect `output-elements` back into the parent row.
//!
//! After the last wave the recipe outputs are rendered per row and a
//! [`Trace`] is generated for every step.

mod condition;
mod io;
mod iterator;
mod orchestrator;
mod trace;


pub use condition::{process_condition, ConditionMap};
pub use iterator::parse_range;
pub use orchestrator::{PipelineRunner, RunError, RunRequest, RunResult};
pub use trace::{generate_traces, Trace, TraceStatus};
