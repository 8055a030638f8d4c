//! Run memory.
//!
//! A run owns one [`RowMemory`] per batch row. Rows are locked
//! independently so that jobs of different rows never contend. Each row
//! holds the bound variables, secrets, system variables and a
//! [`StepMemory`] per step.
//!
//! [`TriggerMemoryStore`] persists a run to a [`KeyValueStore`] so that it
//! can be reloaded by trigger ID.

mod row;
mod run;
mod status;
mod step;
mod store;
mod trigger;

pub use row::RowMemory;
pub use run::RunMemory;
pub use status::{StatusKind, StepStatus};
pub use step::{StepError, StepField, StepMemory};
pub use store::{InMemoryKeyValueStore, KeyValueStore};
pub use trigger::{ComponentItemMemory, TriggerMemory, TriggerMemoryStore};
