//! Validation and usage accounting around a component execution.

use super::executor::Execution;
use super::job::{InputReader, Job, OutputWriter};
use super::schema::CompiledSchema;
use super::usage::{noop_usage_handler, UsageHandler};
use crate::errors::Result;
use crate::value::Value;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

/// Wraps an [`Execution`] with schema validation and usage accounting.
///
/// Every input is read and validated before anything runs, so that the
/// usage handler can check the whole batch at once. Jobs whose input cannot
/// be read or is invalid are reported on their error sink and left out of
/// the batch. Outputs are validated as they are written and collected once
/// the execution returns.
pub struct ExecutionWrapper {
    component_id: String,
    execution: Box<dyn Execution>,
    input_schema: Option<CompiledSchema>,
    output_schema: Option<Arc<CompiledSchema>>,
    usage: Arc<dyn UsageHandler>,
}

impl ExecutionWrapper {
    /// Wraps an execution with no schemas and a no-op usage handler.
    pub fn new(component_id: impl Into<String>, execution: Box<dyn Execution>) -> Self {
        Self {
            component_id: component_id.into(),
            execution,
            input_schema: None,
            output_schema: None,
            usage: noop_usage_handler(),
        }
    }

    /// Validates inputs against a schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Option<CompiledSchema>) -> Self {
        self.input_schema = schema;
        self
    }

    /// Validates outputs against a schema.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Option<CompiledSchema>) -> Self {
        self.output_schema = schema.map(Arc::new);
        self
    }

    /// Sets the usage handler.
    #[must_use]
    pub fn with_usage_handler(mut self, usage: Arc<dyn UsageHandler>) -> Self {
        self.usage = usage;
        self
    }

    /// Returns the step the execution belongs to.
    #[must_use]
    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    /// Runs the jobs.
    ///
    /// Returns an error only when the whole batch failed: the usage handler
    /// rejected it, the execution itself failed, or usage collection failed.
    pub async fn execute(&self, jobs: Vec<Job>) -> Result<()> {
        let mut inputs = Vec::with_capacity(jobs.len());
        let mut valid_jobs = Vec::with_capacity(jobs.len());

        for job in jobs {
            let input = match job.input.read().await {
                Ok(input) => input,
                Err(err) => {
                    job.error.error(err).await;
                    continue;
                }
            };
            if let Some(schema) = &self.input_schema {
                if let Err(err) = schema.validate(&input) {
                    debug!(component_id = %self.component_id, error = %err, "input rejected");
                    job.error.error(err.into()).await;
                    continue;
                }
            }
            inputs.push(input);
            valid_jobs.push(job);
        }

        self.usage.check(&inputs).await?;

        let writers: Vec<Arc<CapturingWriter>> = valid_jobs
            .iter()
            .map(|job| {
                Arc::new(CapturingWriter {
                    inner: job.output.clone(),
                    schema: self.output_schema.clone(),
                    last: Mutex::new(None),
                })
            })
            .collect();

        let wrapped = valid_jobs
            .iter()
            .zip(&inputs)
            .zip(&writers)
            .map(|((job, input), writer)| {
                Job::new(
                    Arc::new(ValidatedInput(input.clone())),
                    writer.clone(),
                    job.error.clone(),
                    job.cancel.clone(),
                )
            })
            .collect();

        if let Err(err) = self.execution.execute(wrapped).await {
            warn!(component_id = %self.component_id, error = %err, "execution failed");
            return Err(err.into());
        }

        let outputs: Vec<Option<Value>> = writers.iter().map(|w| w.last.lock().clone()).collect();
        self.usage.collect(&inputs, &outputs).await?;
        Ok(())
    }
}

struct ValidatedInput(Value);

#[async_trait]
impl InputReader for ValidatedInput {
    async fn read(&self) -> Result<Value> {
        Ok(self.0.clone())
    }
}

/// Validates outputs and remembers the last one written.
struct CapturingWriter {
    inner: Arc<dyn OutputWriter>,
    schema: Option<Arc<CompiledSchema>>,
    last: Mutex<Option<Value>>,
}

#[async_trait]
impl OutputWriter for CapturingWriter {
    async fn write(&self, output: Value) -> Result<()> {
        if let Some(schema) = &self.schema {
            schema.validate(&output)?;
        }
        *self.last.lock() = Some(output.clone());
        self.inner.write(output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionMode;
    use crate::errors::{RecipeflowError, UsageError};
    use crate::execution::executor::{JobExecution, JobHandler};
    use crate::execution::job::JobCell;
    use crate::execution::usage::MockUsageHandler;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl JobHandler for Upper {
        async fn handle(&self, input: Value, _job: &Job) -> anyhow::Result<Value> {
            let text = input.get("text").and_then(Value::as_str).unwrap_or_default();
            if text == "bad-output" {
                return Ok(Value::map_from([("text", Value::Int(1))]));
            }
            Ok(Value::map_from([("text", Value::from(text.to_uppercase()))]))
        }
    }

    struct Failing;

    #[async_trait]
    impl Execution for Failing {
        async fn execute(&self, _jobs: Vec<Job>) -> anyhow::Result<()> {
            anyhow::bail!("connector unavailable")
        }
    }

    fn text_schema(target: &str) -> Option<CompiledSchema> {
        let schema = Value::from(json!({
            "type": "object",
            "required": ["text"],
            "properties": {"text": {"type": "string"}}
        }));
        Some(CompiledSchema::compile(target, &schema).unwrap())
    }

    fn wrapper(usage: Arc<dyn UsageHandler>) -> ExecutionWrapper {
        let execution = JobExecution::new(Arc::new(Upper)).with_mode(ExecutionMode::Sequential);
        ExecutionWrapper::new("upper", Box::new(execution))
            .with_input_schema(text_schema("input"))
            .with_output_schema(text_schema("output"))
            .with_usage_handler(usage)
    }

    fn jobs(inputs: Vec<serde_json::Value>) -> (Vec<Job>, Vec<Arc<JobCell>>) {
        inputs.into_iter().map(|v| Job::detached(v.into())).unzip()
    }

    #[tokio::test]
    async fn test_validation_is_per_job() {
        let mut usage = MockUsageHandler::new();
        usage
            .expect_check()
            .withf(|inputs| inputs.len() == 2)
            .times(1)
            .returning(|_| Ok(()));
        usage
            .expect_collect()
            .withf(|inputs, outputs| {
                inputs.len() == 2 && outputs[0].is_some() && outputs[1].is_none()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let (jobs, cells) = jobs(vec![
            json!({"text": "hi"}),
            json!({"nope": 1}),
            json!({"text": "bad-output"}),
        ]);
        wrapper(Arc::new(usage)).execute(jobs).await.unwrap();

        assert_eq!(cells[0].output(), Some(Value::map_from([("text", Value::from("HI"))])));
        let input_err = cells[1].error_message().unwrap();
        assert!(input_err.starts_with("input: "), "{input_err}");
        let output_err = cells[2].error_message().unwrap();
        assert!(output_err.starts_with("output/text: "), "{output_err}");
        assert!(cells[2].output().is_none());
    }

    #[tokio::test]
    async fn test_check_failure_blocks_every_job() {
        let mut usage = MockUsageHandler::new();
        usage
            .expect_check()
            .times(1)
            .returning(|_| Err(UsageError::check("quota exceeded")));
        usage.expect_collect().never();

        let (jobs, cells) = jobs(vec![json!({"text": "a"}), json!({"text": "b"})]);
        let err = wrapper(Arc::new(usage)).execute(jobs).await.unwrap_err();

        assert!(matches!(err, RecipeflowError::Usage(ref e) if e.phase == "check"));
        assert_eq!(err.to_string(), "quota exceeded");
        assert!(cells.iter().all(|c| c.outputs().is_empty()));
    }

    #[tokio::test]
    async fn test_collect_failure_is_reported() {
        let mut usage = MockUsageHandler::new();
        usage.expect_check().returning(|_| Ok(()));
        usage
            .expect_collect()
            .returning(|_, _| Err(UsageError::collect("meter down")));

        let (jobs, cells) = jobs(vec![json!({"text": "a"})]);
        let err = wrapper(Arc::new(usage)).execute(jobs).await.unwrap_err();

        assert!(matches!(err, RecipeflowError::Usage(ref e) if e.phase == "collect"));
        assert_eq!(cells[0].output(), Some(Value::map_from([("text", Value::from("A"))])));
    }

    #[tokio::test]
    async fn test_execution_failure_is_batch_level() {
        let wrapper = ExecutionWrapper::new("x", Box::new(Failing));
        let (jobs, _cells) = jobs(vec![json!({})]);
        let err = wrapper.execute(jobs).await.unwrap_err();
        assert!(matches!(err, RecipeflowError::Execution(ref m) if m == "connector unavailable"));
    }
}
