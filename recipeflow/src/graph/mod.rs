//! Dependency graph construction and wave scheduling.
//!
//! [`build_graph`] scans step templates for `${<stepID>...}` references and
//! produces a [`DependencyGraph`]; [`DependencyGraph::sort`] turns it into
//! ordered groups of steps that may run in parallel.

mod builder;
mod scheduler;

pub use builder::{build_graph, find_reference_parents};
pub use scheduler::{DependencyGraph, StepGroup};
