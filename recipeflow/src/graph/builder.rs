//! Reference scanning.

use super::DependencyGraph;
use crate::recipe::{Step, StepMap};
use crate::value::Value;
use std::collections::HashSet;

/// Returns the first path segment of every `${...}` span in `text`.
///
/// The segment ends at the first `.` or `[`. Scanning stops at a `${` that
/// has no closing brace.
#[must_use]
pub fn find_reference_parents(text: &str) -> Vec<String> {
    let mut parents = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        rest = &rest[start..];
        let Some(end) = rest.find('}') else {
            break;
        };
        let reference = rest[2..end].trim();
        let first = reference
            .find(['.', '['])
            .map_or(reference, |i| &reference[..i])
            .trim();
        if !first.is_empty() {
            parents.push(first.to_string());
        }
        rest = &rest[end + 1..];
    }

    parents
}

fn collect_from_value(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(find_reference_parents(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_from_value(v, out)),
        Value::Map(map) => {
            for (k, v) in map {
                out.extend(find_reference_parents(k));
                collect_from_value(v, out);
            }
        }
        _ => {}
    }
}

/// References made by a single step's own templates.
fn step_references(step: &Step) -> Vec<String> {
    let mut parents = Vec::new();
    if let Some(condition) = step.condition() {
        parents.extend(find_reference_parents(condition));
    }
    collect_from_value(&step.input, &mut parents);
    collect_from_value(&step.setup, &mut parents);
    if let Some(range) = &step.range {
        collect_from_value(range, &mut parents);
    }
    parents
}

/// Builds the dependency graph of a step map.
///
/// Nested iterator step IDs are known IDs. References made inside an
/// iterator to the iterator itself or to its own nested steps are dropped;
/// the remaining ones become edges onto the iterator.
#[must_use]
pub fn build_graph(steps: &StepMap) -> DependencyGraph {
    let mut known: HashSet<&str> = HashSet::new();
    for (id, step) in steps {
        known.insert(id);
        known.extend(step.steps.keys().map(String::as_str));
    }

    let mut graph = DependencyGraph::new(steps.keys().cloned());

    for (id, step) in steps {
        let mut parents = step_references(step);

        if step.is_iterator() {
            let internal: HashSet<&str> = std::iter::once(id.as_str())
                .chain(step.steps.keys().map(String::as_str))
                .collect();
            for nested in step.steps.values() {
                parents.extend(
                    step_references(nested)
                        .into_iter()
                        .filter(|p| !internal.contains(p.as_str())),
                );
                parents.extend(
                    nested
                        .output_elements
                        .values()
                        .flat_map(|t| find_reference_parents(t))
                        .filter(|p| !internal.contains(p.as_str())),
                );
            }
            parents.extend(
                step.output_elements
                    .values()
                    .flat_map(|t| find_reference_parents(t))
                    .filter(|p| !internal.contains(p.as_str())),
            );
        }

        for parent in parents {
            if known.contains(parent.as_str()) {
                graph.add_edge(&parent, id);
            }
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Step;
    use pretty_assertions::assert_eq;

    fn step_with_text(text: &str) -> Step {
        Step::new("text", "TASK").with_input(Value::map_from([("text", Value::from(text))]))
    }

    #[test]
    fn test_find_reference_parents() {
        assert_eq!(
            find_reference_parents("${ a.output.x } and ${b[0]} and ${variable.v}"),
            vec!["a", "b", "variable"]
        );
        assert_eq!(find_reference_parents("no refs"), Vec::<String>::new());
        assert_eq!(find_reference_parents("${a.x} ${unclosed"), vec!["a"]);
        assert_eq!(find_reference_parents("${ }"), Vec::<String>::new());
    }

    #[test]
    fn test_build_graph_edges_from_input_and_condition() {
        let steps: StepMap = [
            ("a".to_string(), step_with_text("${variable.prompt}")),
            ("b".to_string(), step_with_text("${a.output.text}")),
            (
                "c".to_string(),
                step_with_text("${b.output.text}").with_condition("${a.output.ok} == true"),
            ),
        ]
        .into_iter()
        .collect();

        let graph = build_graph(&steps);
        assert_eq!(graph.upstream_of("a"), Vec::<String>::new());
        assert_eq!(graph.upstream_of("b"), vec!["a"]);
        let mut upstream_c = graph.upstream_of("c");
        upstream_c.sort();
        assert_eq!(upstream_c, vec!["a", "b"]);
    }

    #[test]
    fn test_iterator_hoists_external_references() {
        let iterator = Step::iterator("${a.output.items}")
            .with_nested_step("inner", step_with_text("${loop.element} ${inner.output.x} ${b.output.text}"))
            .with_output_element("result", "${inner.output.text}");
        let steps: StepMap = [
            ("a".to_string(), step_with_text("x")),
            ("b".to_string(), step_with_text("y")),
            ("loop".to_string(), iterator),
        ]
        .into_iter()
        .collect();

        let graph = build_graph(&steps);
        let mut upstream = graph.upstream_of("loop");
        upstream.sort();
        assert_eq!(upstream, vec!["a", "b"]);

        let groups = graph.sort().unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].steps, vec!["loop"]);
    }

    #[test]
    fn test_reference_into_iterator_from_outside_is_not_a_dag() {
        let iterator =
            Step::iterator("${variable.items}").with_nested_step("inner", step_with_text("${loop.element}"));
        let steps: StepMap = [
            ("loop".to_string(), iterator),
            ("after".to_string(), step_with_text("${inner.output.text}")),
        ]
        .into_iter()
        .collect();

        let err = build_graph(&steps).sort().unwrap_err();
        assert_eq!(err.to_string(), "not a valid dag");
        assert_eq!(err.steps, vec!["after"]);
    }
}
