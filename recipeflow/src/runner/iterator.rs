//! Iterator steps: working out the iterations, building the child memory
//! they run in, and collecting their output elements.

use crate::errors::{IteratorError, Result};
use crate::memory::{RowMemory, RunMemory, StepMemory};
use crate::recipe::Step;
use crate::value::{Map, Value};

/// What an iterator row iterates over.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Iteration {
    /// Elements of the rendered input sequence.
    Elements(Vec<Value>),
    /// Values of a numeric range.
    Range(Vec<i64>),
}

impl Iteration {
    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Elements(items) => items.len(),
            Self::Range(values) => values.len(),
        }
    }
}

const RANGE_START: &str = "start";
const RANGE_STOP: &str = "stop";
const RANGE_STEP: &str = "step";

fn range_int(value: Option<&Value>) -> Result<i64, IteratorError> {
    value.and_then(Value::as_integer).ok_or(IteratorError::Range)
}

/// Expands an iterator range.
///
/// `template` is the range as written in the recipe and decides the form:
/// a sequence `[start, stop[, step]]` or a map `{start, stop, step?}`.
/// Values are read from `rendered`. Without a step the range counts up by
/// one and must not be descending.
pub fn parse_range(template: &Value, rendered: &Value) -> Result<Vec<i64>, IteratorError> {
    let (start, stop, step) = match template {
        Value::Array(items) => {
            if !(2..=3).contains(&items.len()) {
                return Err(IteratorError::RangeForm);
            }
            let Value::Array(values) = rendered else {
                return Err(IteratorError::Range);
            };
            let step = if items.len() == 3 {
                Some(range_int(values.get(2))?)
            } else {
                None
            };
            (range_int(values.first())?, range_int(values.get(1))?, step)
        }
        Value::Map(_) => {
            let Value::Map(values) = rendered else {
                return Err(IteratorError::Range);
            };
            let start = values.get(RANGE_START).ok_or(IteratorError::MissingStart)?;
            let stop = values.get(RANGE_STOP).ok_or(IteratorError::MissingStop)?;
            let step = values
                .get(RANGE_STEP)
                .map(|s| range_int(Some(s)))
                .transpose()?;
            (range_int(Some(start))?, range_int(Some(stop))?, step)
        }
        _ => return Err(IteratorError::Range),
    };

    let Some(step) = step else {
        if start > stop {
            return Err(IteratorError::StopBeforeStart);
        }
        return Ok((start..stop).collect());
    };

    if step == 0 {
        return Err(IteratorError::ZeroStep);
    }
    let mut values = Vec::new();
    if start > stop {
        if step > 0 {
            return Err(IteratorError::StepShouldBeNegative);
        }
        let mut n = start;
        while n > stop {
            values.push(n);
            n = n.saturating_add(step);
        }
    } else if start < stop {
        if step < 0 {
            return Err(IteratorError::StepShouldBePositive);
        }
        let mut n = start;
        while n < stop {
            values.push(n);
            n = n.saturating_add(step);
        }
    }
    Ok(values)
}

/// Works out the iterations of an iterator step for one row.
///
/// The input, when set, wins over the range.
pub(crate) fn prepare_iteration(memory: &RunMemory, index: usize, step: &Step) -> Result<Iteration> {
    if let Some(input) = step.iterator_input() {
        let rendered = memory.render(index, &Value::from(input), false)?;
        return match rendered {
            Value::Array(items) => Ok(Iteration::Elements(items)),
            other => Err(IteratorError::InputNotArray(other.type_name()).into()),
        };
    }

    let Some(range) = &step.range else {
        return Err(IteratorError::NoSource.into());
    };
    let rendered = memory.render(index, range, false)?;
    Ok(Iteration::Range(parse_range(range, &rendered)?))
}

/// Builds the memory an iterator row's nested steps run in.
///
/// Every iteration is a child row carrying the parent row's variables,
/// secrets, system variables and the memory of the iterator's upstream
/// steps. Input iteration stores the element on the iterator's own step
/// memory (`${iterator.element}`) and binds `index_name` to the position;
/// range iteration binds `index_name` to the range value.
pub(crate) fn child_memory(
    memory: &RunMemory,
    index: usize,
    iterator_id: &str,
    step: &Step,
    upstream_ids: &[String],
    iteration: &Iteration,
    index_name: &str,
) -> Result<RunMemory> {
    let template = {
        let row = memory.read_row(index)?;
        let mut template = RowMemory::new(row.variables.clone(), row.secrets.clone())
            .with_system(row.system.clone());
        for upstream in upstream_ids {
            if let Some(upstream_memory) = row.steps.get(upstream) {
                template.steps.insert(upstream.clone(), upstream_memory.clone());
            }
        }
        for nested_id in step.steps.keys() {
            template.steps.insert(nested_id.clone(), StepMemory::default());
        }
        template
    };

    let rows = match iteration {
        Iteration::Elements(items) => items
            .iter()
            .enumerate()
            .map(|(position, element)| {
                let mut row = template.clone();
                let mut iterator_memory = StepMemory::default();
                iterator_memory.element = Some(element.clone());
                row.steps.insert(iterator_id.to_string(), iterator_memory);
                row.bind_index(index_name, i64::try_from(position).unwrap_or(i64::MAX));
                row
            })
            .collect(),
        Iteration::Range(values) => values
            .iter()
            .map(|&value| {
                let mut row = template.clone();
                row.bind_index(index_name, value);
                row
            })
            .collect(),
    };

    let child_id = format!("{}:{index}:component:{iterator_id}:iteration", memory.id());
    Ok(RunMemory::new(child_id, rows))
}

/// Renders every output element template once per iteration.
///
/// References that do not resolve in an iteration render as null.
pub(crate) fn collect_output_elements(child: &RunMemory, step: &Step) -> Result<Value> {
    let mut output = Map::with_capacity(step.output_elements.len());
    for (key, template) in &step.output_elements {
        let template = Value::from(template.as_str());
        let mut elements = Vec::with_capacity(child.batch_size());
        for iteration in 0..child.batch_size() {
            elements.push(child.render(iteration, &template, true)?);
        }
        output.insert(key.clone(), Value::Array(elements));
    }
    Ok(Value::Map(output))
}
