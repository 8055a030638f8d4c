//! JSON Schema validation of job inputs and outputs.

use crate::errors::ValidationError;
use crate::value::Value;
use jsonschema::JSONSchema;
use std::fmt;

/// A compiled schema bound to what it validates ("input", "output").
pub struct CompiledSchema {
    target: String,
    schema: JSONSchema,
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    /// Compiles a schema.
    pub fn compile(target: impl Into<String>, schema: &Value) -> Result<Self, ValidationError> {
        let target = target.into();
        let json = serde_json::Value::from(schema.clone());
        let compiled = JSONSchema::compile(&json)
            .map_err(|err| ValidationError::invalid_schema(target.clone(), err))?;
        Ok(Self {
            target,
            schema: compiled,
        })
    }

    /// Compiles an optional schema. Missing and empty schemas accept
    /// anything.
    pub fn compile_optional(
        target: impl Into<String>,
        schema: Option<&Value>,
    ) -> Result<Option<Self>, ValidationError> {
        match schema {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Map(map)) if map.is_empty() => Ok(None),
            Some(schema) => Self::compile(target, schema).map(Some),
        }
    }

    /// Returns what this schema validates.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Validates a value, reporting one message per violation.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let instance = serde_json::Value::from(value.clone());
        let result = self.schema.validate(&instance);
        let Err(errors) = result else {
            return Ok(());
        };
        let messages = errors
            .map(|err| {
                let path = err.instance_path.to_string();
                if path.is_empty() {
                    format!("{}: {err}", self.target)
                } else {
                    format!("{}{path}: {err}", self.target)
                }
            })
            .collect();
        Err(ValidationError::new(self.target.clone(), messages))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> CompiledSchema {
        let schema = Value::from(json!({
            "type": "object",
            "required": ["text"],
            "properties": {
                "text": {"type": "string"},
                "n": {"type": "integer"}
            }
        }));
        CompiledSchema::compile("input", &schema).unwrap()
    }

    #[test]
    fn test_valid_value() {
        let value = Value::from(json!({"text": "hi", "n": 2}));
        assert!(schema().validate(&value).is_ok());
    }

    #[test]
    fn test_messages_carry_target_and_path() {
        let err = schema()
            .validate(&Value::from(json!({"n": "two"})))
            .unwrap_err();
        assert_eq!(err.target, "input");
        assert_eq!(err.messages.len(), 2);
        assert!(err.messages.iter().any(|m| m.starts_with("input/n: ")));
        assert!(err.messages.iter().any(|m| m.starts_with("input: ") && m.contains("text")));
    }

    #[test]
    fn test_invalid_schema() {
        let bad = Value::from(json!({"type": 12}));
        let err = CompiledSchema::compile("output", &bad).unwrap_err();
        assert!(err.to_string().starts_with("output: invalid schema"));
    }

    #[test]
    fn test_optional_empty_schema() {
        assert!(CompiledSchema::compile_optional("input", None).unwrap().is_none());
        assert!(CompiledSchema::compile_optional("input", Some(&Value::empty_map()))
            .unwrap()
            .is_none());
    }
}
