//! Per-step memory.

use super::status::StepStatus;
use crate::value::{Map, Path, PathError, PathSegment, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data fields of a step's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepField {
    /// Rendered input.
    Input,
    /// Output written by the component.
    Output,
    /// Current iteration element (iterators).
    Element,
    /// Rendered setup.
    Setup,
}

impl StepField {
    /// Returns the field name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Element => "element",
            Self::Setup => "setup",
        }
    }
}

impl fmt::Display for StepField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded for a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    /// Empty until the step fails.
    pub message: String,
}

/// Memory of one step for one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMemory {
    /// Rendered input.
    pub input: Value,
    /// Output.
    pub output: Value,
    /// Current element (iterators only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<Value>,
    /// Rendered setup.
    pub setup: Value,
    /// Error.
    pub error: StepError,
    /// Status flags.
    pub status: StepStatus,
}

impl Default for StepMemory {
    fn default() -> Self {
        Self {
            input: Value::empty_map(),
            output: Value::empty_map(),
            element: None,
            setup: Value::empty_map(),
            error: StepError::default(),
            status: StepStatus::default(),
        }
    }
}

impl StepMemory {
    /// Reads a data field.
    #[must_use]
    pub fn field(&self, field: StepField) -> Option<&Value> {
        match field {
            StepField::Input => Some(&self.input),
            StepField::Output => Some(&self.output),
            StepField::Element => self.element.as_ref(),
            StepField::Setup => Some(&self.setup),
        }
    }

    /// Writes a data field.
    pub fn set_field(&mut self, field: StepField, value: Value) {
        match field {
            StepField::Input => self.input = value,
            StepField::Output => self.output = value,
            StepField::Element => self.element = Some(value),
            StepField::Setup => self.setup = value,
        }
    }

    /// Returns the whole memory as a map value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(6);
        map.insert("input".into(), self.input.clone());
        map.insert("output".into(), self.output.clone());
        if let Some(element) = &self.element {
            map.insert("element".into(), element.clone());
        }
        map.insert("setup".into(), self.setup.clone());
        map.insert(
            "error".into(),
            Value::map_from([("message", Value::from(self.error.message.as_str()))]),
        );
        map.insert("status".into(), self.status.to_value());
        Value::Map(map)
    }

    /// Resolves a path relative to this step (`output.text`, `status.completed`).
    pub fn resolve(&self, path: &Path) -> Result<Value, PathError> {
        let Some(first) = path.first() else {
            return Ok(self.to_value());
        };
        let root = match first {
            PathSegment::Key(k) => match k.as_str() {
                "input" => &self.input,
                "output" => &self.output,
                "setup" => &self.setup,
                "element" => self
                    .element
                    .as_ref()
                    .ok_or_else(|| PathError::KeyNotFound(k.clone()))?,
                "error" | "status" => return self.to_value().lookup(path).cloned(),
                _ => return Err(PathError::KeyNotFound(k.clone())),
            },
            PathSegment::Index(index) => {
                return Err(PathError::NotAnArray {
                    index: *index,
                    found: "map",
                })
            }
        };
        root.lookup(&path.rest()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_shape() {
        let step = StepMemory::default();
        let value = step.to_value();
        assert_eq!(value.get("input"), Some(&Value::empty_map()));
        assert_eq!(value.lookup_str("error.message").unwrap(), &Value::from(""));
        assert_eq!(value.lookup_str("status.started").unwrap(), &Value::Bool(false));
        assert!(value.get("element").is_none());
    }

    #[test]
    fn test_resolve() {
        let mut step = StepMemory::default();
        step.set_field(StepField::Output, Value::map_from([("text", Value::from("hi"))]));
        step.status.completed = true;

        let resolve = |p: &str| step.resolve(&Path::parse(p).unwrap());
        assert_eq!(resolve("output.text").unwrap(), Value::from("hi"));
        assert_eq!(resolve("status.completed").unwrap(), Value::Bool(true));
        assert_eq!(resolve("element"), Err(PathError::KeyNotFound("element".into())));
        assert!(resolve("unknown").is_err());
    }
}
