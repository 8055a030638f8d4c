//! Span attributes and timing for runs and steps.

use crate::config::{ConditionSemantics, ExecutionMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{info_span, Span};

/// Span attributes for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSpanAttributes {
    /// Run ID.
    pub run_id: String,
    /// Number of rows.
    pub batch_size: usize,
    /// Number of top-level steps.
    pub step_count: usize,
    /// Job dispatch mode.
    pub execution_mode: Option<String>,
    /// Condition semantics.
    pub condition_semantics: Option<String>,
    /// Trigger ID the run is persisted under.
    pub trigger_id: Option<String>,
}

impl RunSpanAttributes {
    /// Creates attributes for a run.
    #[must_use]
    pub fn new(run_id: impl Into<String>, batch_size: usize, step_count: usize) -> Self {
        Self {
            run_id: run_id.into(),
            batch_size,
            step_count,
            ..Self::default()
        }
    }

    /// Sets the dispatch mode and condition semantics.
    #[must_use]
    pub fn with_modes(mut self, mode: ExecutionMode, semantics: ConditionSemantics) -> Self {
        self.execution_mode = Some(format!("{mode:?}").to_lowercase());
        self.condition_semantics = Some(format!("{semantics:?}").to_lowercase());
        self
    }

    /// Sets the trigger ID.
    #[must_use]
    pub fn with_trigger_id(mut self, trigger_id: Option<&str>) -> Self {
        self.trigger_id = trigger_id.map(str::to_string);
        self
    }

    /// Converts to flat span attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("run.id".to_string(), self.run_id.clone());
        attrs.insert("run.batch_size".to_string(), self.batch_size.to_string());
        attrs.insert("run.step_count".to_string(), self.step_count.to_string());
        if let Some(ref v) = self.execution_mode {
            attrs.insert("run.execution_mode".to_string(), v.clone());
        }
        if let Some(ref v) = self.condition_semantics {
            attrs.insert("run.condition_semantics".to_string(), v.clone());
        }
        if let Some(ref v) = self.trigger_id {
            attrs.insert("run.trigger_id".to_string(), v.clone());
        }
        attrs
    }

    /// Opens the run span.
    #[must_use]
    pub fn span(&self) -> Span {
        info_span!(
            "recipe.run",
            run_id = %self.run_id,
            batch_size = self.batch_size,
            step_count = self.step_count,
            execution_mode = self.execution_mode.as_deref().unwrap_or_default(),
        )
    }
}

/// Span attributes for one step of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepSpanAttributes {
    /// Step ID.
    pub step_id: String,
    /// Component type.
    pub component_type: String,
    /// Task.
    pub task: Option<String>,
    /// Wave the step runs in.
    pub group: Option<usize>,
    /// Number of rows the step runs for.
    pub started_rows: Option<usize>,
}

impl StepSpanAttributes {
    /// Creates attributes for a step.
    #[must_use]
    pub fn new(step_id: impl Into<String>, component_type: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            component_type: component_type.into(),
            ..Self::default()
        }
    }

    /// Sets the task.
    #[must_use]
    pub fn with_task(mut self, task: &str) -> Self {
        self.task = (!task.is_empty()).then(|| task.to_string());
        self
    }

    /// Sets the wave.
    #[must_use]
    pub fn with_group(mut self, group: usize) -> Self {
        self.group = Some(group);
        self
    }

    /// Converts to flat span attributes.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        attrs.insert("step.id".to_string(), self.step_id.clone());
        attrs.insert("step.component_type".to_string(), self.component_type.clone());
        if let Some(ref v) = self.task {
            attrs.insert("step.task".to_string(), v.clone());
        }
        if let Some(v) = self.group {
            attrs.insert("step.group".to_string(), v.to_string());
        }
        if let Some(v) = self.started_rows {
            attrs.insert("step.started_rows".to_string(), v.to_string());
        }
        attrs
    }

    /// Opens the step span.
    #[must_use]
    pub fn span(&self) -> Span {
        info_span!(
            "recipe.step",
            step_id = %self.step_id,
            component_type = %self.component_type,
            task = self.task.as_deref().unwrap_or_default(),
            group = self.group.unwrap_or_default(),
        )
    }
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
