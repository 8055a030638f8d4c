//! Rewriting of `${...}` spans into plain expression syntax.

use crate::errors::ExpressionError;
use crate::value::{Path, PathSegment};
use indexmap::IndexMap;

/// Identifier the whole memory view is bound to by [`sanitize_path`].
pub const MEMORY_IDENT: &str = "memory";

enum Segment {
    Text(String),
    Reference(String),
}

/// Splits `src` into literal text and trimmed `${...}` contents.
fn split_references(src: &str) -> Result<Vec<Segment>, ExpressionError> {
    let mut segments = Vec::new();
    let mut rest = src;

    loop {
        let Some(start) = rest.find("${") else {
            if !rest.is_empty() {
                segments.push(Segment::Text(rest.to_string()));
            }
            return Ok(segments);
        };
        if start > 0 {
            segments.push(Segment::Text(rest[..start].to_string()));
        }
        let end = rest[start..]
            .find('}')
            .map(|i| start + i)
            .ok_or(ExpressionError::UnclosedReference)?;
        let reference = rest[start + 2..end].trim();
        if reference.is_empty() {
            return Err(ExpressionError::EmptyReference);
        }
        segments.push(Segment::Reference(reference.to_string()));
        rest = &rest[end + 1..];
    }
}

fn parse_reference(reference: &str) -> Result<Path, ExpressionError> {
    Path::parse(reference).map_err(|e| ExpressionError::syntax(0, e.to_string()))
}

fn quote(key: &str) -> String {
    format!("\"{}\"", key.replace('\\', "\\\\").replace('"', "\\\""))
}

fn write_segments(out: &mut String, segments: &[PathSegment], prefer_dots: bool) {
    for segment in segments {
        match segment {
            PathSegment::Key(k) if prefer_dots && is_identifier(k) => {
                out.push('.');
                out.push_str(k);
            }
            PathSegment::Key(k) => {
                out.push('[');
                out.push_str(&quote(k));
                out.push(']');
            }
            PathSegment::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Rewrites `${a.b[0]}` into `memory["a"]["b"][0]`.
///
/// References with no text between them are joined with `concat(...)`.
pub fn sanitize_path(src: &str) -> Result<String, ExpressionError> {
    let segments = split_references(src)?;
    let mut out = String::with_capacity(src.len() + 16);
    let mut run: Vec<String> = Vec::new();

    let flush = |run: &mut Vec<String>, out: &mut String| match run.len() {
        0 => {}
        1 => out.push_str(&run.remove(0)),
        _ => {
            out.push_str("concat(");
            out.push_str(&run.join(", "));
            out.push(')');
            run.clear();
        }
    };

    for segment in &segments {
        match segment {
            Segment::Reference(reference) => {
                let path = parse_reference(reference)?;
                let mut converted = MEMORY_IDENT.to_string();
                write_segments(&mut converted, path.segments(), false);
                run.push(converted);
            }
            Segment::Text(text) => {
                flush(&mut run, &mut out);
                out.push_str(text);
            }
        }
    }
    flush(&mut run, &mut out);

    Ok(out)
}

/// A condition rewritten for the lenient evaluator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedCondition {
    /// Expression text with first segments replaced by `var0`, `var1`, ...
    pub expression: String,
    /// Generated name to original first segment.
    pub variables: IndexMap<String, String>,
}

/// Replaces the first segment of every `${...}` reference with a generated
/// name. The same first segment always maps to the same name.
pub fn sanitize_condition(src: &str) -> Result<SanitizedCondition, ExpressionError> {
    let mut expression = String::with_capacity(src.len());
    let mut variables: IndexMap<String, String> = IndexMap::new();

    for segment in split_references(src)? {
        match segment {
            Segment::Text(text) => expression.push_str(&text),
            Segment::Reference(reference) => {
                let path = parse_reference(&reference)?;
                let Some(PathSegment::Key(source)) = path.first() else {
                    return Err(ExpressionError::syntax(
                        0,
                        format!("reference '{reference}' must start with a name"),
                    ));
                };
                let name = match variables.iter().find(|(_, src)| *src == source) {
                    Some((name, _)) => name.clone(),
                    None => {
                        let name = format!("var{}", variables.len());
                        variables.insert(name.clone(), source.clone());
                        name
                    }
                };
                expression.push_str(&name);
                write_segments(&mut expression, path.rest().segments(), true);
            }
        }
    }

    Ok(SanitizedCondition {
        expression,
        variables,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_sanitize_path() {
        let cases = [
            ("${foo}", r#"memory["foo"]"#),
            ("${foo.bar[0].baz}", r#"memory["foo"]["bar"][0]["baz"]"#),
            ("${foo[0][1]}", r#"memory["foo"][0][1]"#),
            ("${  foo.bar  }", r#"memory["foo"]["bar"]"#),
            ("${foo.123.bar}", r#"memory["foo"]["123"]["bar"]"#),
            ("${foo.bar-baz.qux}", r#"memory["foo"]["bar-baz"]["qux"]"#),
            (
                "${foo} && (${bar} || ${baz}) && !${qux}",
                r#"memory["foo"] && (memory["bar"] || memory["baz"]) && !memory["qux"]"#,
            ),
            (
                "${foo}${bar} == ${baz}",
                r#"concat(memory["foo"], memory["bar"]) == memory["baz"]"#,
            ),
            ("1 + 2", "1 + 2"),
        ];
        for (input, expected) in cases {
            assert_eq!(sanitize_path(input).unwrap(), expected, "input: {input}");
        }
    }

    #[test]
    fn test_sanitize_path_errors() {
        assert_eq!(sanitize_path("${}"), Err(ExpressionError::EmptyReference));
        assert_eq!(sanitize_path("${ }"), Err(ExpressionError::EmptyReference));
        assert_eq!(sanitize_path("${foo"), Err(ExpressionError::UnclosedReference));
    }

    #[test]
    fn test_sanitize_condition_reuses_names() {
        let sanitized =
            sanitize_condition("${a.output.n} > 1 && ${b.output.flag} || ${a.output.my-key}").unwrap();
        assert_eq!(
            sanitized.expression,
            r#"var0.output.n > 1 && var1.output.flag || var0.output["my-key"]"#
        );
        assert_eq!(sanitized.variables.get("var0"), Some(&"a".to_string()));
        assert_eq!(sanitized.variables.get("var1"), Some(&"b".to_string()));
    }
}
