//! Testing utilities for recipe runs.
//!
//! This module provides:
//! - Fake components covering success, failure, panics and slow jobs
//! - A recording usage handler and a ready-made registry
//! - Assertions over run results

mod assertions;
mod components;
mod fixtures;

pub use assertions::{
    assert_run_succeeded, assert_step_completed, assert_step_errored, assert_step_skipped,
    assert_step_status,
};
pub use components::{
    EchoComponent, FailingComponent, MeteredComponent, PanickingComponent, RecordingComponent,
    SlowComponent, TextComponent,
};
pub use fixtures::{input_rows, test_registry, test_runner, RecordingUsageHandler};
