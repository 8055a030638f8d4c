//! Recipe model: the declarative definition of a pipeline.
//!
//! A recipe is usually authored in YAML:
//!
//! ```yaml
//! variable:
//!   prompt:
//!     type: string
//! component:
//!   upper:
//!     type: text
//!     task: TASK_UPPER
//!     input:
//!       text: ${variable.prompt}
//! output:
//!   answer:
//!     value: ${upper.output.text}
//! ```

mod step;

pub use step::{Step, StepMap, ITERATOR_TYPE};

use crate::errors::{Result, ValidationError};
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A declared pipeline variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Format hint (`string`, `number`, `image/*`, ...).
    #[serde(default, rename = "type", alias = "instillFormat", skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Value used when a trigger row does not provide one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Whether a row must provide the variable.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
}

/// A named pipeline output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Template rendered after the run, e.g. `${step.output.text}`.
    #[serde(default)]
    pub value: String,
}

/// A full pipeline definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    /// Recipe format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Declared variables.
    #[serde(default, rename = "variable")]
    pub variables: IndexMap<String, Variable>,
    /// Declared secrets: name to external reference.
    #[serde(default, rename = "secret")]
    pub secrets: IndexMap<String, String>,
    /// Steps, in declaration order.
    #[serde(default, rename = "component")]
    pub steps: StepMap,
    /// Named outputs.
    #[serde(default, rename = "output")]
    pub outputs: IndexMap<String, Output>,
}

impl Recipe {
    /// Creates an empty recipe.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a YAML recipe.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let recipe: Self = serde_yaml::from_str(yaml)?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Parses a JSON recipe.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let recipe: Self = serde_json::from_str(json)?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Adds a step.
    #[must_use]
    pub fn with_step(mut self, id: impl Into<String>, step: Step) -> Self {
        self.steps.insert(id.into(), step);
        self
    }

    /// Adds a variable.
    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, variable: Variable) -> Self {
        self.variables.insert(name.into(), variable);
        self
    }

    /// Adds an output rendered from a template.
    #[must_use]
    pub fn with_output(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.outputs.insert(
            name.into(),
            Output {
                value: template.into(),
                ..Output::default()
            },
        );
        self
    }

    /// Returns the output templates as a map value.
    #[must_use]
    pub fn output_template(&self) -> Value {
        Value::map_from(
            self.outputs
                .iter()
                .map(|(k, o)| (k.clone(), Value::String(o.value.clone()))),
        )
    }

    /// Checks that step IDs are unique across the recipe and its iterators.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for (id, step) in &self.steps {
            if !seen.insert(id.as_str()) {
                duplicates.push(id.clone());
            }
            for nested_id in step.steps.keys() {
                if !seen.insert(nested_id.as_str()) {
                    duplicates.push(nested_id.clone());
                }
            }
        }

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(
                "recipe",
                duplicates
                    .into_iter()
                    .map(|id| format!("recipe: duplicate step id '{id}'"))
                    .collect(),
            )
            .into())
        }
    }

    /// Builds one row of variable bindings from trigger data.
    ///
    /// Declared defaults are applied first and the row's own values win.
    /// Undeclared keys in the row are kept.
    pub fn bind_variables(&self, row: &Value) -> Result<Value> {
        let mut bound = IndexMap::new();
        for (name, variable) in &self.variables {
            if let Some(default) = &variable.default {
                bound.insert(name.clone(), default.clone());
            }
        }
        if let Some(entries) = row.as_map() {
            for (k, v) in entries {
                bound.insert(k.clone(), v.clone());
            }
        }

        let missing: Vec<String> = self
            .variables
            .iter()
            .filter(|(name, variable)| variable.required && !bound.contains_key(*name))
            .map(|(name, _)| format!("variable: missing required variable '{name}'"))
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::new("variable", missing).into());
        }

        Ok(Value::Map(bound))
    }
}
