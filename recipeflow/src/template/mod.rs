//! `${...}` reference rendering.
//!
//! Templates are [`Value`] trees whose string leaves may contain references
//! such as `${step.output.text}` or `${variable.prompt}`. Rendering resolves
//! each reference against a [`ReferenceScope`], usually one row of run memory.

mod scope;

pub use scope::{traverse_binding, ReferenceScope};

use crate::errors::ReferenceError;
use crate::value::{Map, Value};

/// Marker returned in place of the platform-wide secret.
pub const SECRET_KEYWORD: &str = "__INSTILL_SECRET";

/// Name of the platform-wide secret under `secret.`.
pub const GLOBAL_SECRET_KEY: &str = "INSTILL_SECRET";

/// First path segment under which secrets are exposed.
pub const SECRET_SEGMENT: &str = "secret";

/// First path segment under which variables are exposed.
pub const VARIABLE_SEGMENT: &str = "variable";

/// Returns the reference inside `s` when `s` is a single `${...}` span.
#[must_use]
pub fn single_reference(s: &str) -> Option<&str> {
    if s.starts_with("${") && s.ends_with('}') && s.matches("${").count() == 1 {
        Some(s[2..s.len() - 1].trim())
    } else {
        None
    }
}

/// Renders a template tree.
///
/// Map entries whose value is null are dropped. With `allow_unresolved`, a
/// string leaf whose reference cannot be resolved renders to null instead
/// of failing.
pub fn render<S>(template: &Value, scope: &S, allow_unresolved: bool) -> Result<Value, ReferenceError>
where
    S: ReferenceScope + ?Sized,
{
    match template {
        Value::String(s) => render_string(s, scope, allow_unresolved),
        Value::Map(map) => {
            let mut rendered = Map::with_capacity(map.len());
            for (k, v) in map {
                if v.is_null() {
                    continue;
                }
                rendered.insert(k.clone(), render(v, scope, allow_unresolved)?);
            }
            Ok(Value::Map(rendered))
        }
        Value::Array(items) => items
            .iter()
            .map(|v| render(v, scope, allow_unresolved))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other.clone()),
    }
}

fn resolve<S>(reference: &str, scope: &S, allow_unresolved: bool) -> Result<Option<Value>, ReferenceError>
where
    S: ReferenceScope + ?Sized,
{
    match traverse_binding(scope, reference) {
        Ok(v) => Ok(Some(v)),
        Err(_) if allow_unresolved => Ok(None),
        Err(e) => Err(e),
    }
}

fn render_string<S>(s: &str, scope: &S, allow_unresolved: bool) -> Result<Value, ReferenceError>
where
    S: ReferenceScope + ?Sized,
{
    if let Some(reference) = single_reference(s) {
        if reference == format!("{SECRET_SEGMENT}.{GLOBAL_SECRET_KEY}") {
            return Ok(Value::from(SECRET_KEYWORD));
        }
        return Ok(resolve(reference, scope, allow_unresolved)?.unwrap_or_default());
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    loop {
        let Some(start) = rest.find("${") else {
            out.push_str(rest);
            break;
        };
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let Some(end) = rest.find('}') else {
            // Unclosed span: kept verbatim.
            out.push_str(rest);
            break;
        };

        let reference = rest[2..end].trim();
        match resolve(reference, scope, allow_unresolved)? {
            Some(Value::String(text)) => out.push_str(&text),
            Some(other) => out.push_str(&other.to_json_string()),
            None => return Ok(Value::Null),
        }
        rest = &rest[end + 1..];
    }

    Ok(Value::String(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scope() -> Value {
        Value::from(json!({
            "variable": {"prompt": "hello", "n": 3},
            "secret": {"key": "s3cr3t"},
            "a": {"output": {"text": "x", "items": [1, 2]}},
            "b": {"output": {"text": "y"}},
        }))
    }

    #[test]
    fn test_render_without_references_is_identity() {
        let template = Value::from(json!({"a": "plain", "b": [1, true, 2.5], "c": {"d": "e"}}));
        assert_eq!(render(&template, &scope(), false).unwrap(), template);
    }

    #[test]
    fn test_single_reference_returns_native_value() {
        let s = scope();
        assert_eq!(
            render(&Value::from("${a.output.items}"), &s, false).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(render(&Value::from("${ variable.n }"), &s, false).unwrap(), Value::Int(3));
    }

    #[test]
    fn test_mixed_text_concatenates() {
        let s = scope();
        assert_eq!(
            render(&Value::from("${a.output.text}${b.output.text}"), &s, false).unwrap(),
            Value::from("xy")
        );
        assert_eq!(
            render(&Value::from("n=${variable.n} items=${a.output.items}"), &s, false).unwrap(),
            Value::from("n=3 items=[1,2]")
        );
    }

    #[test]
    fn test_global_secret_returns_keyword() {
        assert_eq!(
            render(&Value::from("${secret.INSTILL_SECRET}"), &scope(), false).unwrap(),
            Value::from(SECRET_KEYWORD)
        );
    }

    #[test]
    fn test_unclosed_span_kept_verbatim() {
        assert_eq!(
            render(&Value::from("value ${a.output.text} and ${oops"), &scope(), false).unwrap(),
            Value::from("value x and ${oops")
        );
    }

    #[test]
    fn test_null_map_entries_dropped() {
        let template = Value::map_from([("keep", Value::from("${variable.prompt}")), ("drop", Value::Null)]);
        assert_eq!(
            render(&template, &scope(), false).unwrap(),
            Value::map_from([("keep", Value::from("hello"))])
        );
    }

    #[test]
    fn test_unresolved_reference() {
        let s = scope();
        let err = render(&Value::from("${missing.output}"), &s, false).unwrap_err();
        assert_eq!(err.to_string(), "reference not correct: 'missing.output'");

        assert_eq!(render(&Value::from("${missing.output}"), &s, true).unwrap(), Value::Null);
        assert_eq!(render(&Value::from("x ${missing} y"), &s, true).unwrap(), Value::Null);
    }

    #[test]
    fn test_json_literal_fallback() {
        let s = scope();
        assert_eq!(render(&Value::from("${42}"), &s, false).unwrap(), Value::Int(42));
        assert_eq!(render(&Value::from(r#"${"quoted"}"#), &s, false).unwrap(), Value::from("quoted"));
    }
}
