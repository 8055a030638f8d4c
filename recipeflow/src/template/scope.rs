//! Reference resolution.

use crate::errors::ReferenceError;
use crate::value::{Path, PathError, Value};
use std::borrow::Cow;

/// Something `${...}` references can be resolved against.
pub trait ReferenceScope {
    /// Resolves a parsed path, returning an owned value.
    fn resolve(&self, path: &Path) -> Result<Value, PathError>;

    /// Rewrites a raw reference before it is parsed.
    fn rewrite<'a>(&self, reference: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(reference)
    }
}

impl ReferenceScope for Value {
    fn resolve(&self, path: &Path) -> Result<Value, PathError> {
        self.lookup(path).cloned()
    }
}

/// Resolves `path` against the scope.
///
/// When the structured lookup fails, the path is parsed as a JSON literal
/// (`${42}`, `${"text"}`). If that also fails the original lookup error is
/// reported.
pub fn traverse_binding<S>(scope: &S, path: &str) -> Result<Value, ReferenceError>
where
    S: ReferenceScope + ?Sized,
{
    let rewritten = scope.rewrite(path);
    let lookup = Path::parse(&rewritten).and_then(|p| scope.resolve(&p));
    match lookup {
        Ok(v) => Ok(v),
        Err(err) => serde_json::from_str::<Value>(path)
            .map_err(|_| ReferenceError::new(path, err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_traverse_binding_prefers_lookup() {
        let scope = Value::from(json!({"true": "shadowed", "a": {"b": [10, 20]}}));
        assert_eq!(traverse_binding(&scope, "a.b[1]").unwrap(), Value::Int(20));
        assert_eq!(traverse_binding(&scope, "true").unwrap(), Value::from("shadowed"));
    }

    #[test]
    fn test_traverse_binding_literal_fallback() {
        let scope = Value::empty_map();
        assert_eq!(traverse_binding(&scope, "false").unwrap(), Value::Bool(false));
        assert_eq!(traverse_binding(&scope, "[1, 2]").unwrap(), json!([1, 2]).into());
    }

    #[test]
    fn test_traverse_binding_error_keeps_reason() {
        let scope = Value::from(json!({"a": {"b": 1}}));
        let err = traverse_binding(&scope, "a.c").unwrap_err();
        assert_eq!(err.path, "a.c");
        assert_eq!(err.reason, "key 'c' not found");
    }
}
