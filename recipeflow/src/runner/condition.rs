//! Per-row selection of the rows a step runs for.

use crate::config::ConditionSemantics;
use crate::errors::Result;
use crate::expr::eval_condition;
use crate::memory::{RunMemory, StatusKind};
use tracing::debug;

/// Rows a step runs for: entry `j` is the row of the step's `j`-th job.
pub type ConditionMap = Vec<usize>;

/// Decides, row by row, whether a step runs.
///
/// A row is skipped when any upstream step was skipped or errored in it, or
/// when the condition evaluates to false. A condition that fails to
/// evaluate marks the step errored for that row. Every other row is marked
/// started and returned.
pub fn process_condition(
    memory: &RunMemory,
    step_id: &str,
    upstream_ids: &[String],
    condition: Option<&str>,
    semantics: ConditionSemantics,
) -> Result<ConditionMap> {
    let mut selected = Vec::with_capacity(memory.batch_size());

    'rows: for index in 0..memory.batch_size() {
        for upstream in upstream_ids {
            let status = memory.step_status(index, upstream)?;
            if status.skipped || status.errored {
                debug!(step_id, upstream = %upstream, batch_index = index, "upstream did not complete");
                memory.set_status(index, step_id, StatusKind::Skipped, true)?;
                continue 'rows;
            }
        }

        if let Some(condition) = condition {
            let (condition, view) = {
                let row = memory.read_row(index)?;
                (row.substitute_indexes(condition).into_owned(), row.to_value())
            };
            match eval_condition(&condition, &view, semantics) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(step_id, batch_index = index, "condition is false");
                    memory.set_status(index, step_id, StatusKind::Skipped, true)?;
                    continue;
                }
                Err(err) => {
                    debug!(step_id, batch_index = index, error = %err, "condition failed");
                    memory.record_error(index, step_id, err.to_string())?;
                    continue;
                }
            }
        }

        memory.set_status(index, step_id, StatusKind::Started, true)?;
        selected.push(index);
    }

    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{RowMemory, StepField};
    use crate::value::Value;
    use pretty_assertions::assert_eq;

    fn memory() -> RunMemory {
        let rows = (0..4)
            .map(|n| RowMemory::new(Value::map_from([("n", Value::from(n))]), Value::empty_map()))
            .collect();
        let memory = RunMemory::new("run", rows);
        for index in 0..4 {
            memory.init_step(index, "up").unwrap();
            memory.init_step(index, "down").unwrap();
        }
        memory
    }

    #[test]
    fn test_no_condition_selects_every_row() {
        let memory = memory();
        let map = process_condition(&memory, "down", &[], None, ConditionSemantics::Strict).unwrap();
        assert_eq!(map, vec![0, 1, 2, 3]);
        assert!(memory.status(2, "down", StatusKind::Started).unwrap());
    }

    #[test]
    fn test_condition_per_row() {
        let memory = memory();
        let map = process_condition(
            &memory,
            "down",
            &[],
            Some("${variable.n} % 2 == 0"),
            ConditionSemantics::Strict,
        )
        .unwrap();

        assert_eq!(map, vec![0, 2]);
        assert!(memory.status(1, "down", StatusKind::Skipped).unwrap());
        assert!(!memory.status(1, "down", StatusKind::Started).unwrap());
    }

    #[test]
    fn test_upstream_skip_and_error_propagate() {
        let memory = memory();
        memory.set_status(0, "up", StatusKind::Skipped, true).unwrap();
        memory.record_error(1, "up", "boom").unwrap();
        memory
            .set_step_data(2, "up", StepField::Output, Value::map_from([("ok", Value::Bool(true))]))
            .unwrap();
        memory.set_status(2, "up", StatusKind::Completed, true).unwrap();

        let map = process_condition(&memory, "down", &["up".to_string()], None, ConditionSemantics::Strict)
            .unwrap();

        assert_eq!(map, vec![2, 3]);
        assert!(memory.status(0, "down", StatusKind::Skipped).unwrap());
        assert!(memory.status(1, "down", StatusKind::Skipped).unwrap());
        assert!(!memory.status(1, "down", StatusKind::Errored).unwrap());
    }

    #[test]
    fn test_condition_error_marks_row_errored() {
        let memory = memory();
        let map = process_condition(
            &memory,
            "down",
            &[],
            Some("${variable.n} / 0 == 1"),
            ConditionSemantics::Strict,
        )
        .unwrap();

        assert!(map.is_empty());
        assert!(memory.status(0, "down", StatusKind::Errored).unwrap());
        assert_eq!(memory.error_message(0, "down").unwrap(), "division by zero");
    }

    #[test]
    fn test_legacy_semantics() {
        let memory = memory();
        let map = process_condition(
            &memory,
            "down",
            &[],
            Some("${missing.value} == nil || ${variable.n} > 2"),
            ConditionSemantics::Legacy,
        )
        .unwrap();
        assert_eq!(map, vec![0, 1, 2, 3]);
    }
}
