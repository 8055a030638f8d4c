//! Run memory: one independently locked row per batch element.

use super::row::RowMemory;
use super::status::{StatusKind, StepStatus};
use super::step::{StepField, StepMemory};
use crate::errors::{MemoryError, Result};
use crate::events::{
    ComponentEventData, EventSink, MemoryEvent, MessageError, NoOpEventSink, PipelineEventData,
    PipelineStatus,
};
use crate::template::{render, traverse_binding};
use crate::value::Value;
use chrono::Utc;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Memory of a whole run.
pub struct RunMemory {
    id: String,
    rows: Vec<RwLock<RowMemory>>,
    output_template: Option<Value>,
    streaming: AtomicBool,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for RunMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunMemory")
            .field("id", &self.id)
            .field("batch_size", &self.rows.len())
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

impl RunMemory {
    /// Creates run memory from prepared rows.
    pub fn new(id: impl Into<String>, rows: Vec<RowMemory>) -> Self {
        Self {
            id: id.into(),
            rows: rows.into_iter().map(RwLock::new).collect(),
            output_template: None,
            streaming: AtomicBool::new(false),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the sink memory events are sent to.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the pipeline output template re-rendered on streaming writes.
    #[must_use]
    pub fn with_output_template(mut self, template: Value) -> Self {
        self.output_template = Some(template);
        self
    }

    /// Returns the run ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.rows.len()
    }

    /// Starts sending events to the sink.
    pub fn enable_streaming(&self) {
        self.streaming.store(true, Ordering::SeqCst);
    }

    /// Returns true when events are being sent.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Returns the pipeline output template, if any.
    #[must_use]
    pub fn output_template(&self) -> Option<&Value> {
        self.output_template.as_ref()
    }

    fn row(&self, index: usize) -> Result<&RwLock<RowMemory>, MemoryError> {
        self.rows.get(index).ok_or(MemoryError::RowOutOfRange {
            index,
            size: self.rows.len(),
        })
    }

    /// Locks a row for reading.
    pub fn read_row(&self, index: usize) -> Result<RwLockReadGuard<'_, RowMemory>> {
        Ok(self.row(index)?.read())
    }

    fn write_row(&self, index: usize) -> Result<RwLockWriteGuard<'_, RowMemory>> {
        Ok(self.row(index)?.write())
    }

    fn with_step_mut<T>(
        &self,
        index: usize,
        step_id: &str,
        f: impl FnOnce(&mut StepMemory) -> T,
    ) -> Result<T> {
        let mut row = self.write_row(index)?;
        let step = row
            .steps
            .get_mut(step_id)
            .ok_or_else(|| MemoryError::StepNotFound(step_id.to_string()))?;
        Ok(f(step))
    }

    fn with_step<T>(&self, index: usize, step_id: &str, f: impl FnOnce(&StepMemory) -> T) -> Result<T> {
        let row = self.read_row(index)?;
        let step = row
            .steps
            .get(step_id)
            .ok_or_else(|| MemoryError::StepNotFound(step_id.to_string()))?;
        Ok(f(step))
    }

    /// Resets a step's memory in a row.
    pub fn init_step(&self, index: usize, step_id: &str) -> Result<()> {
        self.write_row(index)?
            .steps
            .insert(step_id.to_string(), StepMemory::default());
        Ok(())
    }

    /// Copies a step's memory into a row, replacing what was there.
    pub fn put_step(&self, index: usize, step_id: &str, memory: StepMemory) -> Result<()> {
        self.write_row(index)?
            .steps
            .insert(step_id.to_string(), memory);
        Ok(())
    }

    /// Returns a copy of a step's memory.
    pub fn step(&self, index: usize, step_id: &str) -> Result<StepMemory> {
        self.with_step(index, step_id, Clone::clone)
    }

    /// Writes a step data field. Input and output writes emit events.
    pub fn set_step_data(&self, index: usize, step_id: &str, field: StepField, value: Value) -> Result<()> {
        let status = self.with_step_mut(index, step_id, |step| {
            step.set_field(field, value.clone());
            step.status
        })?;

        match field {
            StepField::Input => {
                self.send_component_event(MemoryEvent::ComponentInputUpdated, index, step_id, status, |d| {
                    d.input = Some(value);
                });
            }
            StepField::Output => {
                self.send_component_event(MemoryEvent::ComponentOutputUpdated, index, step_id, status, |d| {
                    d.output = Some(value);
                });
            }
            StepField::Element | StepField::Setup => {}
        }
        Ok(())
    }

    /// Reads a step data field.
    pub fn step_data(&self, index: usize, step_id: &str, field: StepField) -> Result<Value> {
        self.with_step(index, step_id, |step| step.field(field).cloned())?
            .ok_or_else(|| MemoryError::PipelineDataNotFound(format!("{step_id}.{field}")).into())
    }

    /// Writes a status flag and emits a status event.
    pub fn set_status(&self, index: usize, step_id: &str, kind: StatusKind, value: bool) -> Result<()> {
        let status = self.with_step_mut(index, step_id, |step| {
            step.status.set(kind, value);
            step.status
        })?;
        self.send_component_event(MemoryEvent::ComponentStatusUpdated, index, step_id, status, |_| {});
        Ok(())
    }

    /// Reads a status flag.
    pub fn status(&self, index: usize, step_id: &str, kind: StatusKind) -> Result<bool> {
        self.with_step(index, step_id, |step| step.status.get(kind))
    }

    /// Reads all status flags.
    pub fn step_status(&self, index: usize, step_id: &str) -> Result<StepStatus> {
        self.with_step(index, step_id, |step| step.status)
    }

    /// Writes a step error message and emits an error event.
    pub fn set_error_message(&self, index: usize, step_id: &str, message: impl Into<String>) -> Result<()> {
        let message = message.into();
        let status = self.with_step_mut(index, step_id, |step| {
            step.error.message.clone_from(&message);
            step.status
        })?;
        self.send_component_event(MemoryEvent::ComponentErrorUpdated, index, step_id, status, |d| {
            d.error = Some(MessageError { message });
        });
        Ok(())
    }

    /// Reads a step error message.
    pub fn error_message(&self, index: usize, step_id: &str) -> Result<String> {
        self.with_step(index, step_id, |step| step.error.message.clone())
    }

    /// Marks a step errored for a row and records the message.
    pub fn record_error(&self, index: usize, step_id: &str, message: impl Into<String>) -> Result<()> {
        self.set_status(index, step_id, StatusKind::Errored, true)?;
        self.set_error_message(index, step_id, message)
    }

    /// Stores the rendered pipeline output of a row.
    pub fn set_pipeline_output(&self, index: usize, output: Value) -> Result<()> {
        self.write_row(index)?.output = Some(output.clone());

        if self.is_streaming() {
            let data = PipelineEventData {
                update_time: Utc::now(),
                batch_index: index,
                status: PipelineStatus {
                    started: true,
                    ..PipelineStatus::default()
                },
                output,
            };
            self.send(MemoryEvent::PipelineOutputUpdated, &data);
        }
        Ok(())
    }

    /// Reads the rendered pipeline output of a row.
    pub fn pipeline_output(&self, index: usize) -> Result<Value> {
        self.read_row(index)?
            .output
            .clone()
            .ok_or_else(|| MemoryError::PipelineDataNotFound("output".to_string()).into())
    }

    /// Binds a name in a row.
    pub fn set_binding(&self, index: usize, name: impl Into<String>, value: Value) -> Result<()> {
        self.write_row(index)?.bindings.insert(name.into(), value);
        Ok(())
    }

    /// Resolves a reference path in a row.
    pub fn get(&self, index: usize, path: &str) -> Result<Value> {
        let row = self.read_row(index)?;
        Ok(traverse_binding(&*row, path)?)
    }

    /// Returns the composed view of a row.
    pub fn snapshot(&self, index: usize) -> Result<Value> {
        Ok(self.read_row(index)?.to_value())
    }

    /// Renders a template against a row.
    pub fn render(&self, index: usize, template: &Value, allow_unresolved: bool) -> Result<Value> {
        let row = self.read_row(index)?;
        Ok(render(template, &*row, allow_unresolved)?)
    }

    /// Re-renders the pipeline output of a row while streaming.
    pub fn refresh_pipeline_output(&self, index: usize) -> Result<()> {
        if !self.is_streaming() {
            return Ok(());
        }
        let Some(template) = self.output_template.as_ref() else {
            return Ok(());
        };
        let output = self.render(index, template, true)?;
        self.set_pipeline_output(index, output)
    }

    fn send_component_event(
        &self,
        event: MemoryEvent,
        index: usize,
        step_id: &str,
        status: StepStatus,
        fill: impl FnOnce(&mut ComponentEventData),
    ) {
        if !self.is_streaming() {
            return;
        }
        let mut data = ComponentEventData {
            update_time: Utc::now(),
            component_id: step_id.to_string(),
            batch_index: index,
            status,
            input: None,
            output: None,
            error: None,
        };
        fill(&mut data);
        self.send(event, &data);
    }

    fn send<T: serde::Serialize>(&self, event: MemoryEvent, data: &T) {
        match serde_json::to_value(data) {
            Ok(payload) => self.sink.try_emit(event.as_str(), Some(payload)),
            Err(err) => warn!(run_id = %self.id, event = %event, error = %err, "dropping memory event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RecipeflowError;
    use crate::events::CollectingEventSink;
    use pretty_assertions::assert_eq;

    fn memory(rows: usize) -> RunMemory {
        let rows = (0..rows)
            .map(|i| RowMemory::new(Value::map_from([("n", Value::from(i as i64))]), Value::empty_map()))
            .collect();
        let memory = RunMemory::new("run-1", rows);
        for i in 0..memory.batch_size() {
            memory.init_step(i, "a").unwrap();
        }
        memory
    }

    #[test]
    fn test_step_data_round_trip() {
        let memory = memory(2);
        memory
            .set_step_data(1, "a", StepField::Output, Value::map_from([("x", Value::Int(5))]))
            .unwrap();
        assert_eq!(memory.get(1, "a.output.x").unwrap(), Value::Int(5));
        assert_eq!(memory.get(0, "a.output").unwrap(), Value::empty_map());
    }

    #[test]
    fn test_unknown_row_and_step() {
        let memory = memory(1);
        assert!(matches!(
            memory.status(3, "a", StatusKind::Started),
            Err(RecipeflowError::Memory(MemoryError::RowOutOfRange { index: 3, size: 1 }))
        ));
        let err = memory.set_status(0, "zzz", StatusKind::Started, true).unwrap_err();
        assert_eq!(err.to_string(), "component zzz not exist");
    }

    #[test]
    fn test_record_error() {
        let memory = memory(1);
        memory.record_error(0, "a", "boom").unwrap();
        assert!(memory.status(0, "a", StatusKind::Errored).unwrap());
        assert!(!memory.status(0, "a", StatusKind::Completed).unwrap());
        assert_eq!(memory.error_message(0, "a").unwrap(), "boom");
    }

    #[test]
    fn test_events_only_while_streaming() {
        let sink = Arc::new(CollectingEventSink::new());
        let memory = memory(1).with_sink(sink.clone());

        memory.set_status(0, "a", StatusKind::Started, true).unwrap();
        assert!(sink.is_empty());

        memory.enable_streaming();
        memory.set_status(0, "a", StatusKind::Completed, true).unwrap();
        memory
            .set_step_data(0, "a", StepField::Input, Value::map_from([("q", Value::from("x"))]))
            .unwrap();
        memory.set_error_message(0, "a", "bad").unwrap();

        assert_eq!(
            sink.event_names_for("a"),
            vec![
                "COMPONENT_STATUS_UPDATED",
                "COMPONENT_INPUT_UPDATED",
                "COMPONENT_ERROR_UPDATED"
            ]
        );
        let status = &sink.payloads_of("COMPONENT_STATUS_UPDATED")[0];
        assert_eq!(status["status"]["completed"], true);
        assert_eq!(status["batchIndex"], 0);
        let error = &sink.payloads_of("COMPONENT_ERROR_UPDATED")[0];
        assert_eq!(error["error"]["message"], "bad");
    }

    #[test]
    fn test_streaming_refreshes_pipeline_output() {
        let sink = Arc::new(CollectingEventSink::new());
        let memory = memory(1)
            .with_sink(sink.clone())
            .with_output_template(Value::map_from([("answer", Value::from("${a.output.x}"))]));
        memory.enable_streaming();

        memory.refresh_pipeline_output(0).unwrap();
        assert_eq!(
            memory.pipeline_output(0).unwrap(),
            Value::map_from([("answer", Value::Null)])
        );

        memory
            .set_step_data(0, "a", StepField::Output, Value::map_from([("x", Value::Int(1))]))
            .unwrap();
        memory.refresh_pipeline_output(0).unwrap();
        assert_eq!(
            memory.pipeline_output(0).unwrap(),
            Value::map_from([("answer", Value::Int(1))])
        );
        assert_eq!(sink.payloads_of("PIPELINE_OUTPUT_UPDATED").len(), 2);
    }
}
