//! Step definitions.

use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The step type that runs a nested step map once per element.
pub const ITERATOR_TYPE: &str = "iterator";

/// Steps keyed by ID, in declaration order.
pub type StepMap = IndexMap<String, Step>;

/// A single configured unit of work in a recipe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Component type (`iterator` for iterator steps).
    #[serde(rename = "type")]
    pub step_type: String,
    /// Task of the component to run.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub task: String,
    /// Input template. For iterators, a template string yielding a sequence.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    /// Condition template; the step is skipped when it evaluates to false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Setup template shared by the batch.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub setup: Value,
    /// Free-form metadata, ignored by execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,

    /// Nested steps of an iterator.
    #[serde(default, rename = "component", skip_serializing_if = "IndexMap::is_empty")]
    pub steps: StepMap,
    /// Iterator range, `[start, stop, step]` or `{start, stop, step}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Value>,
    /// Name the iteration index is bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    /// Iterator outputs: key to per-iteration template.
    #[serde(
        default,
        rename = "output-elements",
        alias = "outputElements",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub output_elements: IndexMap<String, String>,
}

impl Step {
    /// Creates a regular step.
    #[must_use]
    pub fn new(step_type: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            step_type: step_type.into(),
            task: task.into(),
            ..Self::default()
        }
    }

    /// Creates an iterator step over a sequence template.
    #[must_use]
    pub fn iterator(input: impl Into<String>) -> Self {
        Self {
            step_type: ITERATOR_TYPE.to_string(),
            input: Value::String(input.into()),
            ..Self::default()
        }
    }

    /// Creates an iterator step over a range.
    #[must_use]
    pub fn iterator_range(range: Value) -> Self {
        Self {
            step_type: ITERATOR_TYPE.to_string(),
            range: Some(range),
            ..Self::default()
        }
    }

    /// Sets the input template.
    #[must_use]
    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    /// Sets the condition.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Sets the setup template.
    #[must_use]
    pub fn with_setup(mut self, setup: Value) -> Self {
        self.setup = setup;
        self
    }

    /// Adds a nested step (iterators only).
    #[must_use]
    pub fn with_nested_step(mut self, id: impl Into<String>, step: Self) -> Self {
        self.steps.insert(id.into(), step);
        self
    }

    /// Sets the iteration index name.
    #[must_use]
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Adds an output element (iterators only).
    #[must_use]
    pub fn with_output_element(mut self, key: impl Into<String>, template: impl Into<String>) -> Self {
        self.output_elements.insert(key.into(), template.into());
        self
    }

    /// Returns true for iterator steps.
    #[must_use]
    pub fn is_iterator(&self) -> bool {
        self.step_type == ITERATOR_TYPE
    }

    /// Returns the condition if it is set and not blank.
    #[must_use]
    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Returns the iterator input template, if the iterator iterates over one.
    #[must_use]
    pub fn iterator_input(&self) -> Option<&str> {
        self.input.as_str().filter(|s| !s.is_empty())
    }
}
