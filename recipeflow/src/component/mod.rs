//! Component types and the registry the runner resolves them from.

mod registry;

pub use registry::{Component, ComponentRegistry, ExecutionParams};
