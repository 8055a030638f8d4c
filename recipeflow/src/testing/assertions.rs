//! Test assertions for run results.

use crate::runner::{RunResult, TraceStatus};

fn status_of(result: &RunResult, step_id: &str, index: usize) -> TraceStatus {
    let trace = result
        .trace(step_id)
        .unwrap_or_else(|| panic!("no trace for step '{step_id}'"));
    *trace
        .statuses
        .get(index)
        .unwrap_or_else(|| panic!("step '{step_id}' has no row {index}"))
}

/// Asserts that no step errored.
pub fn assert_run_succeeded(result: &RunResult) {
    assert!(
        result.is_success(),
        "Expected success, got errors: {:?}",
        result.errors
    );
}

/// Asserts a step's status for one row.
pub fn assert_step_status(result: &RunResult, step_id: &str, index: usize, expected: TraceStatus) {
    let status = status_of(result, step_id, index);
    assert_eq!(
        status, expected,
        "Expected step '{step_id}' row {index} to be {expected:?}, got {status:?}"
    );
}

/// Asserts that a step completed for one row.
pub fn assert_step_completed(result: &RunResult, step_id: &str, index: usize) {
    assert_step_status(result, step_id, index, TraceStatus::Completed);
}

/// Asserts that a step was skipped for one row.
pub fn assert_step_skipped(result: &RunResult, step_id: &str, index: usize) {
    assert_step_status(result, step_id, index, TraceStatus::Skipped);
}

/// Asserts that a step errored for one row with a message containing `fragment`.
pub fn assert_step_errored(result: &RunResult, step_id: &str, index: usize, fragment: &str) {
    assert_step_status(result, step_id, index, TraceStatus::Error);
    let error = result
        .errors
        .iter()
        .find(|e| e.component_id == step_id && e.batch_index == index);
    assert!(
        error.is_some_and(|e| e.message.contains(fragment)),
        "Expected step '{step_id}' row {index} to fail with '{fragment}', got {error:?}"
    );
}
