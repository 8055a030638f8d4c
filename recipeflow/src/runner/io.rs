//! Job I/O backed by run memory.

use crate::cancellation::CancellationToken;
use crate::errors::{RecipeflowError, Result};
use crate::execution::{ErrorHandler, InputReader, Job, OutputWriter};
use crate::memory::{RunMemory, StepField};
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// The iterator row a nested run belongs to.
#[derive(Clone)]
pub(crate) struct ParentLink {
    pub memory: Arc<RunMemory>,
    pub index: usize,
    pub step_id: String,
}

impl ParentLink {
    pub(crate) fn record_error(&self, message: &str) {
        if let Err(err) = self.memory.record_error(self.index, &self.step_id, message) {
            warn!(step_id = %self.step_id, error = %err, "failed to mark iterator errored");
        }
    }
}

/// Renders the step's input template against the row and records it.
struct MemoryInput {
    memory: Arc<RunMemory>,
    index: usize,
    step_id: String,
    template: Value,
}

#[async_trait]
impl InputReader for MemoryInput {
    async fn read(&self) -> Result<Value> {
        let input = self.memory.render(self.index, &self.template, false)?;
        self.memory
            .set_step_data(self.index, &self.step_id, StepField::Input, input.clone())?;
        Ok(input)
    }
}

struct MemoryOutput {
    memory: Arc<RunMemory>,
    index: usize,
    step_id: String,
}

#[async_trait]
impl OutputWriter for MemoryOutput {
    async fn write(&self, output: Value) -> Result<()> {
        self.memory
            .set_step_data(self.index, &self.step_id, StepField::Output, output)?;
        self.memory.refresh_pipeline_output(self.index)
    }
}

struct MemoryErrorHandler {
    memory: Arc<RunMemory>,
    index: usize,
    step_id: String,
    parent: Option<ParentLink>,
}

#[async_trait]
impl ErrorHandler for MemoryErrorHandler {
    async fn error(&self, err: RecipeflowError) {
        let message = err.to_string();
        warn!(
            step_id = %self.step_id,
            batch_index = self.index,
            kind = err.kind(),
            error = %message,
            "job failed"
        );
        if let Err(e) = self.memory.record_error(self.index, &self.step_id, &message) {
            warn!(step_id = %self.step_id, error = %e, "failed to record job error");
        }
        if let Some(parent) = &self.parent {
            parent.record_error(&message);
        }
    }
}

/// Builds the memory-backed job of a step for one row.
pub(crate) fn memory_job(
    memory: &Arc<RunMemory>,
    index: usize,
    step_id: &str,
    template: &Value,
    parent: Option<&ParentLink>,
    cancel: &CancellationToken,
) -> Job {
    Job::new(
        Arc::new(MemoryInput {
            memory: memory.clone(),
            index,
            step_id: step_id.to_string(),
            template: template.clone(),
        }),
        Arc::new(MemoryOutput {
            memory: memory.clone(),
            index,
            step_id: step_id.to_string(),
        }),
        Arc::new(MemoryErrorHandler {
            memory: memory.clone(),
            index,
            step_id: step_id.to_string(),
            parent: parent.cloned(),
        }),
        cancel.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{RowMemory, StatusKind};
    use pretty_assertions::assert_eq;

    fn memory() -> Arc<RunMemory> {
        let row = RowMemory::new(Value::map_from([("q", Value::from("hi"))]), Value::empty_map());
        let memory = RunMemory::new("run", vec![row]);
        memory.init_step(0, "s").unwrap();
        Arc::new(memory)
    }

    #[tokio::test]
    async fn test_read_renders_and_records_input() {
        let memory = memory();
        let template = Value::map_from([("text", Value::from("${variable.q}!"))]);
        let job = memory_job(&memory, 0, "s", &template, None, &CancellationToken::new());

        let input = job.input.read().await.unwrap();
        assert_eq!(input, Value::map_from([("text", Value::from("hi!"))]));
        assert_eq!(memory.step_data(0, "s", StepField::Input).unwrap(), input);
    }

    #[tokio::test]
    async fn test_unresolvable_input_fails_read() {
        let memory = memory();
        let template = Value::from("${nope.output}");
        let job = memory_job(&memory, 0, "s", &template, None, &CancellationToken::new());
        let err = job.input.read().await.unwrap_err();
        assert!(err.to_string().starts_with("reference not correct: 'nope.output'"));
    }

    #[tokio::test]
    async fn test_error_marks_parent() {
        let memory = memory();
        let parent_memory = memory.clone();
        parent_memory.init_step(0, "loop").unwrap();
        let parent = ParentLink {
            memory: parent_memory,
            index: 0,
            step_id: "loop".to_string(),
        };
        let job = memory_job(&memory, 0, "s", &Value::Null, Some(&parent), &CancellationToken::new());

        job.output.write(Value::Int(1)).await.unwrap();
        job.error.error(RecipeflowError::execution("boom")).await;

        assert_eq!(memory.step_data(0, "s", StepField::Output).unwrap(), Value::Int(1));
        assert!(memory.status(0, "s", StatusKind::Errored).unwrap());
        assert_eq!(memory.error_message(0, "loop").unwrap(), "boom");
    }
}
