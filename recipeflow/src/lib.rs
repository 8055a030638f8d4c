//! # Recipeflow
//!
//! The execution core of declarative recipes: a recipe names a set of steps,
//! each an instance of a registered component type, whose inputs reference
//! run variables, secrets and the outputs of other steps through `${...}`
//! templates.
//!
//! A run takes a batch of input rows and:
//!
//! - **Schedules** the steps into waves from the references between them
//! - **Evaluates conditions** per row, skipping steps and their dependents
//! - **Renders templates** against per-row run memory
//! - **Executes components** once per wave step over all started rows, with
//!   schema validation, usage accounting and per-job failure isolation
//! - **Iterates** nested steps over arrays or integer ranges
//! - **Reports** traces, pipeline outputs and memory events
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recipeflow::prelude::*;
//!
//! let recipe = Recipe::from_yaml_str(yaml)?;
//! let runner = PipelineRunner::new(Arc::new(registry), EngineConfig::default());
//!
//! let result = runner
//!     .run(&recipe, inputs, Value::empty_map(), &CancellationToken::new())
//!     .await?;
//! println!("{:?}", result.outputs);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod component;
pub mod config;
pub mod errors;
pub mod events;
pub mod execution;
pub mod expr;
pub mod graph;
pub mod memory;
pub mod observability;
pub mod recipe;
pub mod runner;
pub mod template;
pub mod testing;
pub mod value;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::component::{Component, ComponentRegistry, ExecutionParams};
    pub use crate::config::{ConditionSemantics, EngineConfig, ExecutionMode, LogConfig};
    pub use crate::errors::{
        GraphError, RecipeflowError, Result, UsageError, ValidationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::execution::{Execution, Job, JobExecution, JobHandler, UsageHandler};
    pub use crate::graph::{build_graph, DependencyGraph, StepGroup};
    pub use crate::memory::{
        InMemoryKeyValueStore, KeyValueStore, RunMemory, StepStatus, TriggerMemoryStore,
    };
    pub use crate::observability::init_tracing;
    pub use crate::recipe::{Recipe, Step, Variable};
    pub use crate::runner::{PipelineRunner, RunRequest, RunResult, Trace, TraceStatus};
    pub use crate::value::Value;
}
