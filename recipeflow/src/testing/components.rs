//! Fake components for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::component::{Component, ExecutionParams};
use crate::errors::RecipeflowError;
use crate::execution::{Execution, Job, JobExecution, JobHandler, UsageHandler};
use crate::value::Value;

/// Adapts a closure into a [`JobHandler`].
struct FnHandler<F>(F);

#[async_trait]
impl<F> JobHandler for FnHandler<F>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync,
{
    async fn handle(&self, input: Value, _job: &Job) -> anyhow::Result<Value> {
        (self.0)(input)
    }
}

fn job_execution<F>(params: &ExecutionParams, f: F) -> Box<dyn Execution>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Box::new(JobExecution::new(Arc::new(FnHandler(f))).with_mode(params.execution_mode))
}

/// Writes every input back as its output.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoComponent;

impl Component for EchoComponent {
    fn component_type(&self) -> &str {
        "echo"
    }

    fn create_execution(&self, params: &ExecutionParams) -> anyhow::Result<Box<dyn Execution>> {
        Ok(job_execution(params, Ok))
    }
}

/// Text operations with declared schemas.
///
/// Tasks: `TASK_UPPERCASE` turns `{text}` into `{text}` upper-cased and
/// `TASK_LENGTH` turns `{text}` into `{length}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextComponent;

impl TextComponent {
    /// Upper-cases the text.
    pub const TASK_UPPERCASE: &'static str = "TASK_UPPERCASE";
    /// Counts the characters of the text.
    pub const TASK_LENGTH: &'static str = "TASK_LENGTH";
}

fn text_of(input: &Value) -> anyhow::Result<&str> {
    input
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("input has no text"))
}

impl Component for TextComponent {
    fn component_type(&self) -> &str {
        "text"
    }

    fn input_schema(&self, _task: &str) -> Option<Value> {
        Some(Value::from(serde_json::json!({
            "type": "object",
            "required": ["text"],
            "properties": { "text": { "type": "string" } }
        })))
    }

    fn output_schema(&self, task: &str) -> Option<Value> {
        let schema = match task {
            Self::TASK_UPPERCASE => serde_json::json!({
                "type": "object",
                "required": ["text"],
                "properties": { "text": { "type": "string" } }
            }),
            Self::TASK_LENGTH => serde_json::json!({
                "type": "object",
                "required": ["length"],
                "properties": { "length": { "type": "integer" } }
            }),
            _ => return None,
        };
        Some(Value::from(schema))
    }

    fn create_execution(&self, params: &ExecutionParams) -> anyhow::Result<Box<dyn Execution>> {
        match params.task.as_str() {
            Self::TASK_UPPERCASE => Ok(job_execution(params, |input| {
                let text = text_of(&input)?.to_uppercase();
                Ok(Value::map_from([("text", Value::from(text))]))
            })),
            Self::TASK_LENGTH => Ok(job_execution(params, |input| {
                let length = i64::try_from(text_of(&input)?.chars().count())?;
                Ok(Value::map_from([("length", Value::Int(length))]))
            })),
            other => anyhow::bail!("unknown task '{other}'"),
        }
    }
}

/// Fails every job with a fixed message.
#[derive(Debug, Clone)]
pub struct FailingComponent {
    message: String,
}

impl FailingComponent {
    /// Creates a component whose jobs fail with `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingComponent {
    fn default() -> Self {
        Self::new("component failed")
    }
}

impl Component for FailingComponent {
    fn component_type(&self) -> &str {
        "fail"
    }

    fn create_execution(&self, params: &ExecutionParams) -> anyhow::Result<Box<dyn Execution>> {
        let message = self.message.clone();
        Ok(job_execution(params, move |_| Err(anyhow::anyhow!("{message}"))))
    }
}

/// Echoes its input, but panics on inputs with `panic: true`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanickingComponent;

impl Component for PanickingComponent {
    fn component_type(&self) -> &str {
        "panic"
    }

    fn create_execution(&self, params: &ExecutionParams) -> anyhow::Result<Box<dyn Execution>> {
        Ok(job_execution(params, |input| {
            if input.get("panic") == Some(&Value::Bool(true)) {
                panic!("component exploded");
            }
            Ok(input)
        }))
    }
}

/// Echoes its input and records what it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingComponent {
    params: Arc<Mutex<Vec<ExecutionParams>>>,
    inputs: Arc<Mutex<Vec<Value>>>,
}

impl RecordingComponent {
    /// Creates a new recording component.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the parameters of every created execution.
    #[must_use]
    pub fn recorded_params(&self) -> Vec<ExecutionParams> {
        self.params.lock().clone()
    }

    /// Returns every input handled, in handling order.
    #[must_use]
    pub fn recorded_inputs(&self) -> Vec<Value> {
        self.inputs.lock().clone()
    }

    /// Returns the number of created executions.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.params.lock().len()
    }
}

impl Component for RecordingComponent {
    fn component_type(&self) -> &str {
        "record"
    }

    fn create_execution(&self, params: &ExecutionParams) -> anyhow::Result<Box<dyn Execution>> {
        self.params.lock().push(params.clone());
        let inputs = self.inputs.clone();
        Ok(job_execution(params, move |input| {
            inputs.lock().push(input.clone());
            Ok(input)
        }))
    }
}

/// Echoes its input after a delay, giving up when the job is cancelled.
#[derive(Debug, Clone, Copy)]
pub struct SlowComponent {
    delay: Duration,
}

impl SlowComponent {
    /// Creates a component that takes `delay` per job.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

struct SlowHandler {
    delay: Duration,
}

#[async_trait]
impl JobHandler for SlowHandler {
    async fn handle(&self, input: Value, job: &Job) -> anyhow::Result<Value> {
        tokio::select! {
            () = tokio::time::sleep(self.delay) => Ok(input),
            () = job.cancel.cancelled() => {
                let reason = job.cancel.reason().unwrap_or_default();
                Err(RecipeflowError::Cancelled(reason).into())
            }
        }
    }
}

impl Component for SlowComponent {
    fn component_type(&self) -> &str {
        "slow"
    }

    fn create_execution(&self, params: &ExecutionParams) -> anyhow::Result<Box<dyn Execution>> {
        let handler = Arc::new(SlowHandler { delay: self.delay });
        Ok(Box::new(JobExecution::new(handler).with_mode(params.execution_mode)))
    }
}

/// Wraps a component with a usage handler.
pub struct MeteredComponent {
    inner: Arc<dyn Component>,
    usage: Arc<dyn UsageHandler>,
}

impl MeteredComponent {
    /// Meters every execution of `inner` with `usage`.
    #[must_use]
    pub fn new(inner: Arc<dyn Component>, usage: Arc<dyn UsageHandler>) -> Self {
        Self { inner, usage }
    }
}

impl Component for MeteredComponent {
    fn component_type(&self) -> &str {
        self.inner.component_type()
    }

    fn input_schema(&self, task: &str) -> Option<Value> {
        self.inner.input_schema(task)
    }

    fn output_schema(&self, task: &str) -> Option<Value> {
        self.inner.output_schema(task)
    }

    fn create_execution(&self, params: &ExecutionParams) -> anyhow::Result<Box<dyn Execution>> {
        self.inner.create_execution(params)
    }

    fn usage_handler(&self, _params: &ExecutionParams) -> Arc<dyn UsageHandler> {
        self.usage.clone()
    }
}
