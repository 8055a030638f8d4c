//! Error types for recipe execution.
//!
//! The taxonomy follows how far a failure reaches: graph and usage errors
//! abort a whole run or wave, while reference, expression, validation and
//! execution errors are confined to a single step or job.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = RecipeflowError> = std::result::Result<T, E>;

/// The main error type for recipe execution.
#[derive(Debug, Clone, Error)]
pub enum RecipeflowError {
    /// The dependency structure of a recipe is invalid.
    #[error("{0}")]
    Graph(#[from] GraphError),

    /// A template reference could not be resolved.
    #[error("{0}")]
    Reference(#[from] ReferenceError),

    /// A condition or expression failed to parse or evaluate.
    #[error("{0}")]
    Expression(#[from] ExpressionError),

    /// Data did not conform to a declared schema.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A component failed while executing a job.
    #[error("{0}")]
    Execution(String),

    /// The batch-wide usage gate rejected a wave.
    #[error("{0}")]
    Usage(#[from] UsageError),

    /// An iterator could not work out what to iterate over.
    #[error("{0}")]
    Iterator(#[from] IteratorError),

    /// Run memory was addressed with an unknown row or step.
    #[error("{0}")]
    Memory(#[from] MemoryError),

    /// The key-value backend failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// A component type is not available.
    #[error("{0}")]
    Registry(#[from] RegistryError),

    /// The run was cancelled.
    #[error("run cancelled: {0}")]
    Cancelled(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RecipeflowError {
    /// Creates an execution error from anything printable.
    #[must_use]
    pub fn execution(message: impl fmt::Display) -> Self {
        Self::Execution(message.to_string())
    }

    /// Returns true when the error only affects a single step or job.
    #[must_use]
    pub const fn is_job_level(&self) -> bool {
        matches!(
            self,
            Self::Reference(_)
                | Self::Expression(_)
                | Self::Validation(_)
                | Self::Execution(_)
                | Self::Iterator(_)
        )
    }

    /// Returns a short, stable name for the error class.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Graph(_) => "GraphError",
            Self::Reference(_) => "ReferenceError",
            Self::Expression(_) => "ExpressionError",
            Self::Validation(_) => "ValidationError",
            Self::Execution(_) => "ExecutionError",
            Self::Usage(_) => "UsageError",
            Self::Iterator(_) => "IteratorError",
            Self::Memory(_) => "MemoryError",
            Self::Store(_) => "StoreError",
            Self::Registry(_) => "RegistryError",
            Self::Cancelled(_) => "Cancelled",
            Self::Serialization(_) => "SerializationError",
        }
    }
}

impl From<serde_json::Error> for RecipeflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for RecipeflowError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for RecipeflowError {
    fn from(err: anyhow::Error) -> Self {
        // Keep typed errors that travelled through a component boundary.
        match err.downcast::<Self>() {
            Ok(inner) => inner,
            Err(other) => Self::Execution(format!("{other:#}")),
        }
    }
}

/// Metadata about an error for better diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Error code (e.g., "GRAPH-001-CYCLE").
    pub code: String,
    /// Short summary of the error.
    pub summary: String,
    /// Hint for fixing the error.
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default)]
    pub context: HashMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::Value::String(self.code.clone()));
        map.insert("summary".to_string(), serde_json::Value::String(self.summary.clone()));

        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::Value::String(hint.clone()));
        }
        if !self.context.is_empty() {
            let context_map: serde_json::Map<String, serde_json::Value> = self
                .context
                .iter()
                .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                .collect();
            map.insert("context".to_string(), serde_json::Value::Object(context_map));
        }

        map
    }
}

/// Error raised when the step graph cannot be scheduled.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct GraphError {
    /// The error message.
    pub message: String,
    /// Steps that could not be placed in any wave.
    pub steps: Vec<String>,
    /// Diagnostic info.
    pub error_info: ErrorInfo,
}

impl GraphError {
    /// Creates the error returned when the graph contains a cycle.
    #[must_use]
    pub fn not_a_dag(mut unplaced: Vec<String>) -> Self {
        unplaced.sort();
        let info = ErrorInfo::new(
            "GRAPH-001-CYCLE",
            format!("Steps form a dependency cycle: {}", unplaced.join(", ")),
        )
        .with_fix_hint("Remove one of the references in the cycle, or reference a step outside the iterator that contains it.");

        Self {
            message: "not a valid dag".to_string(),
            steps: unplaced,
            error_info: info,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("steps".to_string(), serde_json::json!(self.steps));
        let info: serde_json::Map<String, serde_json::Value> =
            self.error_info.to_dict().into_iter().collect();
        map.insert("error_info".to_string(), serde_json::Value::Object(info));
        map
    }
}

/// Error raised when a template path does not resolve.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("reference not correct: '{path}'")]
pub struct ReferenceError {
    /// The offending path, without the surrounding `${}`.
    pub path: String,
    /// Why the structured lookup failed.
    pub reason: String,
}

impl ReferenceError {
    /// Creates a new reference error.
    #[must_use]
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Which operand of a binary operator an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Left-hand operand.
    Left,
    /// Right-hand operand.
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// Errors raised while parsing or evaluating an expression.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExpressionError {
    /// A `${` without a closing brace.
    #[error("unclosed ${{}} expression")]
    UnclosedReference,

    /// A `${}` span with nothing inside.
    #[error("empty expression in ${{}}")]
    EmptyReference,

    /// The expression text could not be parsed.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax {
        /// Byte offset into the (rewritten) expression.
        offset: usize,
        /// What the parser expected.
        message: String,
    },

    /// An identifier is not bound.
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    /// A map has no such key.
    #[error("undefined field: {0}")]
    UndefinedField(String),

    /// Array index outside the array.
    #[error("array index out of bounds")]
    IndexOutOfBounds,

    /// Integer index applied to something that is not an array.
    #[error("cannot index non-array value")]
    IndexNonArray,

    /// String index applied to something that is not a map.
    #[error("cannot index non-map value")]
    IndexNonMap,

    /// Field selection on something that is not a map.
    #[error("cannot select from non-map value")]
    SelectNonMap,

    /// Index expression that is neither an integer nor a string.
    #[error("invalid index of type {0}")]
    InvalidIndex(&'static str),

    /// Integer or float division by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Modulo by zero.
    #[error("modulo by zero")]
    ModuloByZero,

    /// Integer arithmetic left the i64 range.
    #[error("integer overflow")]
    Overflow,

    /// `&&` / `||` operand that is not a boolean.
    #[error("{0} operand must be boolean")]
    NotBoolean(Side),

    /// `%` operand that is a non-integral float.
    #[error("{0} operand must be integer")]
    NotInteger(Side),

    /// Operator applied to operand types it does not support.
    #[error("unsupported operator {op} for {operands}")]
    UnsupportedOperator {
        /// The operator text.
        op: String,
        /// Operand type names.
        operands: String,
    },

    /// Call of anything but `concat`.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// `concat` with fewer than two arguments.
    #[error("concat requires at least 2 arguments")]
    ConcatArity,

    /// `concat` argument that is not a string (1-based).
    #[error("concat argument {0} must be string")]
    ConcatArgument(usize),

    /// A condition evaluated to something other than a boolean.
    #[error("condition must evaluate to a boolean, got {0}")]
    NonBooleanCondition(&'static str),

    /// Catch-all of the lenient evaluator.
    #[error("condition error")]
    Condition,
}

impl ExpressionError {
    /// Creates a syntax error.
    #[must_use]
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            offset,
            message: message.into(),
        }
    }
}

/// Error raised when data does not conform to a JSON Schema.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{}", messages.join("; "))]
pub struct ValidationError {
    /// What was validated ("input", "output", "variable", ...).
    pub target: String,
    /// One message per violation, already prefixed with the target.
    pub messages: Vec<String>,
}

impl ValidationError {
    /// Creates a validation error for a target.
    #[must_use]
    pub fn new(target: impl Into<String>, messages: Vec<String>) -> Self {
        Self {
            target: target.into(),
            messages,
        }
    }

    /// Creates a validation error for a schema that does not compile.
    #[must_use]
    pub fn invalid_schema(target: impl Into<String>, reason: impl fmt::Display) -> Self {
        let target = target.into();
        let message = format!("{target}: invalid schema: {reason}");
        Self::new(target, vec![message])
    }
}

/// Error raised by the batch-wide usage gate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct UsageError {
    /// Which hook failed ("check" or "collect").
    pub phase: &'static str,
    /// The message reported by the handler.
    pub message: String,
}

impl UsageError {
    /// Creates a usage error raised by `check`.
    #[must_use]
    pub fn check(message: impl Into<String>) -> Self {
        Self {
            phase: "check",
            message: message.into(),
        }
    }

    /// Creates a usage error raised by `collect`.
    #[must_use]
    pub fn collect(message: impl Into<String>) -> Self {
        Self {
            phase: "collect",
            message: message.into(),
        }
    }
}

/// Errors raised while preparing the iterations of an iterator step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IteratorError {
    /// The range is neither a sequence nor a map, or holds non-integers.
    #[error("iterator range error")]
    Range,

    /// A range sequence without two or three entries.
    #[error("iterator range error, must be in the form [start, stop[, step]]")]
    RangeForm,

    /// A range map without `start`.
    #[error("iterator range error, `start` is missing")]
    MissingStart,

    /// A range map without `stop`.
    #[error("iterator range error, `stop` is missing")]
    MissingStop,

    /// A descending range without an explicit step.
    #[error("iterator range error, the `stop` should be larger then `start`")]
    StopBeforeStart,

    /// A zero step.
    #[error("iterator range error, the `step` should not be zero")]
    ZeroStep,

    /// A positive step on a descending range.
    #[error("iterator range error, the `step` should be negative")]
    StepShouldBeNegative,

    /// A negative step on an ascending range.
    #[error("iterator range error, the `step` should be positive")]
    StepShouldBePositive,

    /// The rendered input is not a sequence.
    #[error("iterator input must be an array, got {0}")]
    InputNotArray(&'static str),

    /// Neither `input` nor `range` is set.
    #[error("iterator needs either an input or a range")]
    NoSource,
}

/// Errors raised when addressing run memory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MemoryError {
    /// Batch index beyond the run's batch size.
    #[error("batch index {index} out of range (batch size {size})")]
    RowOutOfRange {
        /// Requested row.
        index: usize,
        /// Number of rows.
        size: usize,
    },

    /// Step memory was never initialised for the row.
    #[error("component {0} not exist")]
    StepNotFound(String),

    /// Pipeline-level data was never set for the row.
    #[error("{0} not exist")]
    PipelineDataNotFound(String),
}

/// Errors raised by key-value store backends.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The key is absent or expired.
    #[error("key not found: {0}")]
    NotFound(String),

    /// The backend rejected the operation.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors raised by the component registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// No component registered under the type.
    #[error("component type '{0}' is not registered")]
    UnknownComponent(String),

    /// The component refused to create an execution.
    #[error("creating execution for component '{component_id}': {reason}")]
    CreateExecution {
        /// The step ID the execution was for.
        component_id: String,
        /// The component's reason.
        reason: String,
    },
}
