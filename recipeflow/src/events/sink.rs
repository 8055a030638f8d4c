//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Receiver of run memory events.
///
/// Sinks are handed to [`RunMemory`](crate::memory::RunMemory) and are fed
/// only while streaming is enabled.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    ///
    /// # Arguments
    ///
    /// * `event_type` - The event name (e.g., `COMPONENT_STATUS_UPDATED`)
    /// * `data` - Optional event payload
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>);

    /// Emits an event without blocking. Must never panic.
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// Writes events to the tracing subscriber.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level. Anything other than
    /// `DEBUG` logs at `INFO`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event_type: &str, data: Option<&serde_json::Value>) {
        let component_id = data
            .and_then(|d| d.get("componentID"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("-");
        let batch_index = data
            .and_then(|d| d.get("batchIndex"))
            .and_then(serde_json::Value::as_u64);

        if self.level == Level::DEBUG {
            debug!(event_type, component_id, batch_index, event_data = ?data, "memory event");
        } else {
            info!(event_type, component_id, batch_index, "memory event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// Keeps every event in memory, for tests and streaming bridges.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<(String, Option<serde_json::Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<serde_json::Value>)> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the payloads of events with the given name.
    #[must_use]
    pub fn payloads_of(&self, event_type: &str) -> Vec<serde_json::Value> {
        self.events
            .read()
            .iter()
            .filter(|(t, _)| t == event_type)
            .filter_map(|(_, d)| d.clone())
            .collect()
    }

    /// Returns the names of events about one step, in emission order.
    #[must_use]
    pub fn event_names_for(&self, component_id: &str) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter(|(_, d)| {
                d.as_ref()
                    .and_then(|d| d.get("componentID"))
                    .and_then(serde_json::Value::as_str)
                    == Some(component_id)
            })
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }

    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        self.events.write().push((event_type.to_string(), data));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn test_noop_and_logging_sinks_accept_events() {
        NoOpEventSink.emit("X", None).await;
        let sink = LoggingEventSink::debug();
        sink.emit("COMPONENT_STATUS_UPDATED", Some(json!({"componentID": "a"}))).await;
        sink.try_emit("PIPELINE_OUTPUT_UPDATED", None);
    }

    #[tokio::test]
    async fn test_collecting_sink_filters() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("COMPONENT_STATUS_UPDATED", Some(json!({"componentID": "a"}))).await;
        sink.try_emit("COMPONENT_OUTPUT_UPDATED", Some(json!({"componentID": "b"})));
        sink.try_emit("COMPONENT_STATUS_UPDATED", Some(json!({"componentID": "b"})));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.payloads_of("COMPONENT_STATUS_UPDATED").len(), 2);
        assert_eq!(
            sink.event_names_for("b"),
            vec!["COMPONENT_OUTPUT_UPDATED", "COMPONENT_STATUS_UPDATED"]
        );

        sink.clear();
        assert!(sink.is_empty());
    }
}
