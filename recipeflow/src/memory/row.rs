//! Memory of one batch row.

use super::step::StepMemory;
use crate::template::{ReferenceScope, SECRET_SEGMENT, VARIABLE_SEGMENT};
use crate::value::{Map, Path, PathError, PathSegment, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Everything a row's templates can reference.
///
/// References resolve by first segment: `variable`, `secret`, a step ID,
/// then a binding name (iterator elements and indexes). Inside an
/// iteration, `[name]` in a reference is replaced by the iteration index
/// bound to `name` before the reference is parsed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowMemory {
    /// Bound variables.
    pub variables: Value,
    /// Secrets.
    pub secrets: Value,
    /// System variables passed to component executions.
    pub system: Value,
    /// Step memories.
    pub steps: IndexMap<String, StepMemory>,
    /// Extra names bound in the row.
    pub bindings: Map,
    /// Iteration indexes substituted for `[name]` in references.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub indexes: IndexMap<String, i64>,
    /// Rendered pipeline output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl RowMemory {
    /// Creates a row with variables and secrets.
    #[must_use]
    pub fn new(variables: Value, secrets: Value) -> Self {
        Self {
            variables,
            secrets,
            system: Value::empty_map(),
            ..Self::default()
        }
    }

    /// Sets the system variables.
    #[must_use]
    pub fn with_system(mut self, system: Value) -> Self {
        self.system = system;
        self
    }

    /// Binds an iteration index, usable as `${name}` and as `[name]`.
    pub fn bind_index(&mut self, name: impl Into<String>, index: i64) {
        let name = name.into();
        self.bindings.insert(name.clone(), Value::Int(index));
        self.indexes.insert(name, index);
    }

    /// Replaces every `[name]` of a bound index with `[n]`.
    #[must_use]
    pub fn substitute_indexes<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut out = Cow::Borrowed(text);
        for (name, index) in &self.indexes {
            let pattern = format!("[{name}]");
            if out.contains(&pattern) {
                out = Cow::Owned(out.replace(&pattern, &format!("[{index}]")));
            }
        }
        out
    }

    /// Returns the composed view used by condition evaluation.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::with_capacity(self.steps.len() + self.bindings.len() + 2);
        map.insert(VARIABLE_SEGMENT.to_string(), self.variables.clone());
        map.insert(SECRET_SEGMENT.to_string(), self.secrets.clone());
        for (id, step) in &self.steps {
            map.insert(id.clone(), step.to_value());
        }
        for (name, value) in &self.bindings {
            map.entry(name.clone()).or_insert_with(|| value.clone());
        }
        Value::Map(map)
    }
}

impl ReferenceScope for RowMemory {
    fn resolve(&self, path: &Path) -> Result<Value, PathError> {
        let Some(first) = path.first() else {
            return Ok(self.to_value());
        };
        let PathSegment::Key(name) = first else {
            return Err(PathError::Syntax {
                path: path.to_string(),
                reason: "reference must start with a name",
            });
        };

        let rest = path.rest();
        match name.as_str() {
            VARIABLE_SEGMENT => self.variables.lookup(&rest).cloned(),
            SECRET_SEGMENT => self.secrets.lookup(&rest).cloned(),
            _ => {
                if let Some(step) = self.steps.get(name) {
                    step.resolve(&rest)
                } else if let Some(binding) = self.bindings.get(name) {
                    binding.lookup(&rest).cloned()
                } else {
                    Err(PathError::KeyNotFound(name.clone()))
                }
            }
        }
    }

    fn rewrite<'a>(&self, reference: &'a str) -> Cow<'a, str> {
        self.substitute_indexes(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StepField;
    use crate::template::render;
    use pretty_assertions::assert_eq;

    fn row() -> RowMemory {
        let mut row = RowMemory::new(
            Value::map_from([("prompt", Value::from("hi"))]),
            Value::map_from([("token", Value::from("abc"))]),
        );
        let mut step = StepMemory::default();
        step.set_field(StepField::Output, Value::map_from([("text", Value::from("HI"))]));
        row.steps.insert("upper".to_string(), step);
        row.bindings.insert(
            "loop".to_string(),
            Value::map_from([("element", Value::from("e0"))]),
        );
        row.bindings.insert("i".to_string(), Value::Int(0));
        row
    }

    #[test]
    fn test_resolves_by_first_segment() {
        let row = row();
        let get = |p: &str| row.resolve(&Path::parse(p).unwrap());
        assert_eq!(get("variable.prompt").unwrap(), Value::from("hi"));
        assert_eq!(get("secret.token").unwrap(), Value::from("abc"));
        assert_eq!(get("upper.output.text").unwrap(), Value::from("HI"));
        assert_eq!(get("loop.element").unwrap(), Value::from("e0"));
        assert_eq!(get("i").unwrap(), Value::Int(0));
        assert_eq!(get("nope.x"), Err(PathError::KeyNotFound("nope".into())));
    }

    #[test]
    fn test_render_against_row() {
        let template = Value::from("${upper.output.text} ${variable.prompt} #${i}");
        assert_eq!(render(&template, &row(), false).unwrap(), Value::from("HI hi #0"));
    }

    #[test]
    fn test_index_substitution() {
        let mut row = row();
        row.bindings.insert(
            "items".to_string(),
            Value::Array(vec![Value::from("zero"), Value::from("one")]),
        );
        row.bind_index("j", 1);

        assert_eq!(row.substitute_indexes("${items[j]} [i]"), "${items[1]} [i]");
        let template = Value::from("${items[j]}#${j}");
        assert_eq!(render(&template, &row, false).unwrap(), Value::from("one#1"));
    }

    #[test]
    fn test_composed_view() {
        let view = row().to_value();
        assert_eq!(view.lookup_str("upper.status.completed").unwrap(), &Value::Bool(false));
        assert_eq!(view.lookup_str("loop.element").unwrap(), &Value::from("e0"));
        assert_eq!(view.lookup_str("variable.prompt").unwrap(), &Value::from("hi"));
    }
}
