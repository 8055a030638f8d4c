//! Memory events.
//!
//! While streaming is enabled, run memory reports every status, input,
//! output and error change of a step, and every pipeline output update, to
//! an [`EventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::memory::StepStatus;
use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Names of the events emitted by run memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryEvent {
    /// A step status flag changed.
    ComponentStatusUpdated,
    /// A step input was written.
    ComponentInputUpdated,
    /// A step output was written.
    ComponentOutputUpdated,
    /// A step error message was written.
    ComponentErrorUpdated,
    /// The pipeline output of a row was rendered.
    PipelineOutputUpdated,
}

impl MemoryEvent {
    /// Returns the wire name of the event.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ComponentStatusUpdated => "COMPONENT_STATUS_UPDATED",
            Self::ComponentInputUpdated => "COMPONENT_INPUT_UPDATED",
            Self::ComponentOutputUpdated => "COMPONENT_OUTPUT_UPDATED",
            Self::ComponentErrorUpdated => "COMPONENT_ERROR_UPDATED",
            Self::PipelineOutputUpdated => "PIPELINE_OUTPUT_UPDATED",
        }
    }
}

impl fmt::Display for MemoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageError {
    /// The error message.
    pub message: String,
}

/// Payload of component events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentEventData {
    /// When the change happened.
    pub update_time: DateTime<Utc>,
    /// The step the event is about.
    #[serde(rename = "componentID")]
    pub component_id: String,
    /// The row the event is about.
    pub batch_index: usize,
    /// Status flags after the change.
    pub status: StepStatus,
    /// New input, for input events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// New output, for output events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// New error, for error events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MessageError>,
}

/// Pipeline status flags carried by pipeline events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    /// The run has started.
    pub started: bool,
    /// The run has errored.
    pub errored: bool,
    /// The run has completed.
    pub completed: bool,
}

/// Payload of pipeline output events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEventData {
    /// When the change happened.
    pub update_time: DateTime<Utc>,
    /// The row the event is about.
    pub batch_index: usize,
    /// Pipeline status flags.
    pub status: PipelineStatus,
    /// Rendered output.
    pub output: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_component_payload_shape() {
        let data = ComponentEventData {
            update_time: Utc::now(),
            component_id: "a".to_string(),
            batch_index: 1,
            status: StepStatus::default(),
            input: None,
            output: Some(Value::map_from([("x", Value::Int(1))])),
            error: None,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["componentID"], "a");
        assert_eq!(json["batchIndex"], 1);
        assert_eq!(json["status"]["completed"], false);
        assert_eq!(json["output"]["x"], 1);
        assert!(json.get("input").is_none());
        assert!(json.get("updateTime").is_some());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(MemoryEvent::PipelineOutputUpdated.to_string(), "PIPELINE_OUTPUT_UPDATED");
        assert_eq!(MemoryEvent::ComponentErrorUpdated.as_str(), "COMPONENT_ERROR_UPDATED");
    }
}
