//! Per-step traces of a run.

use crate::errors::Result;
use crate::memory::RunMemory;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Final state of a step for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceStatus {
    /// The step completed.
    Completed,
    /// The step was skipped.
    Skipped,
    /// The step failed or never finished.
    Error,
}

/// What happened to one step across the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Status per row.
    pub statuses: Vec<TraceStatus>,
    /// Input per row, when generated in full.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Option<Value>>,
    /// Output per row, when generated in full.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<Option<Value>>,
    /// The first error message of the batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time the step took, in milliseconds.
    #[serde(default)]
    pub compute_time_ms: f64,
}

/// Builds the trace of every listed step.
///
/// With `full`, the per-row inputs and outputs are included. Rows that never
/// ran the step carry `None`.
pub fn generate_traces<'a>(
    memory: &RunMemory,
    step_ids: impl IntoIterator<Item = &'a String>,
    full: bool,
) -> Result<IndexMap<String, Trace>> {
    let mut traces = IndexMap::new();

    for step_id in step_ids {
        let mut trace = Trace::default();
        for index in 0..memory.batch_size() {
            let step = memory.step(index, step_id)?;
            let status = if step.status.completed {
                TraceStatus::Completed
            } else if step.status.skipped {
                TraceStatus::Skipped
            } else {
                TraceStatus::Error
            };
            trace.statuses.push(status);

            if trace.error.is_none() && !step.error.message.is_empty() {
                trace.error = Some(step.error.message.clone());
            }

            if full {
                let ran = step.status.started;
                trace.inputs.push(ran.then(|| step.input.clone()));
                trace.outputs.push(step.status.completed.then(|| step.output.clone()));
            }
        }
        traces.insert(step_id.clone(), trace);
    }

    Ok(traces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{RowMemory, StatusKind, StepField};
    use pretty_assertions::assert_eq;

    fn memory() -> RunMemory {
        let rows = (0..3).map(|_| RowMemory::default()).collect();
        let memory = RunMemory::new("run", rows);
        for index in 0..3 {
            memory.init_step(index, "a").unwrap();
        }
        memory.set_status(0, "a", StatusKind::Started, true).unwrap();
        memory
            .set_step_data(0, "a", StepField::Input, Value::from("in"))
            .unwrap();
        memory
            .set_step_data(0, "a", StepField::Output, Value::from("out"))
            .unwrap();
        memory.set_status(0, "a", StatusKind::Completed, true).unwrap();
        memory.set_status(1, "a", StatusKind::Skipped, true).unwrap();
        memory.set_status(2, "a", StatusKind::Started, true).unwrap();
        memory.record_error(2, "a", "boom").unwrap();
        memory
    }

    #[test]
    fn test_statuses_and_error() {
        let ids = vec!["a".to_string()];
        let traces = generate_traces(&memory(), &ids, false).unwrap();
        let trace = &traces["a"];

        assert_eq!(
            trace.statuses,
            vec![TraceStatus::Completed, TraceStatus::Skipped, TraceStatus::Error]
        );
        assert_eq!(trace.error.as_deref(), Some("boom"));
        assert!(trace.inputs.is_empty());
    }

    #[test]
    fn test_full_trace() {
        let ids = vec!["a".to_string()];
        let traces = generate_traces(&memory(), &ids, true).unwrap();
        let trace = &traces["a"];

        assert_eq!(trace.inputs[0], Some(Value::from("in")));
        assert_eq!(trace.inputs[1], None);
        assert_eq!(trace.outputs, vec![Some(Value::from("out")), None, None]);
    }

    #[test]
    fn test_unknown_step() {
        let ids = vec!["nope".to_string()];
        assert!(generate_traces(&memory(), &ids, false).is_err());
    }
}
