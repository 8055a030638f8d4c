//! Job dispatch.

use super::job::Job;
use crate::config::ExecutionMode;
use crate::errors::RecipeflowError;
use crate::value::Value;
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tracing::{error, warn};

/// A component execution bound to one step: runs a batch of jobs.
///
/// Per-job failures go to each job's error sink. An `Err` return means the
/// whole batch failed.
#[async_trait]
pub trait Execution: Send + Sync {
    /// Runs the jobs.
    async fn execute(&self, jobs: Vec<Job>) -> anyhow::Result<()>;
}

/// Turns one input into one output.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Handles a job's input. The job is passed for its cancellation token.
    async fn handle(&self, input: Value, job: &Job) -> anyhow::Result<Value>;
}

/// An [`Execution`] that runs a [`JobHandler`] over every job.
pub struct JobExecution {
    handler: Arc<dyn JobHandler>,
    mode: ExecutionMode,
}

impl JobExecution {
    /// Creates an execution dispatching jobs concurrently.
    pub fn new(handler: Arc<dyn JobHandler>) -> Self {
        Self {
            handler,
            mode: ExecutionMode::Concurrent,
        }
    }

    /// Sets the dispatch mode.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

#[async_trait]
impl Execution for JobExecution {
    async fn execute(&self, jobs: Vec<Job>) -> anyhow::Result<()> {
        match self.mode {
            ExecutionMode::Sequential => execute_sequential(jobs, self.handler.as_ref()).await,
            ExecutionMode::Concurrent => execute_concurrent(jobs, self.handler.clone()).await,
        }
        Ok(())
    }
}

async fn run_job(job: &Job, handler: &dyn JobHandler) {
    let input = match job.input.read().await {
        Ok(input) => input,
        Err(err) => return job.error.error(err).await,
    };
    let output = match handler.handle(input, job).await {
        Ok(output) => output,
        Err(err) => return job.error.error(RecipeflowError::from(err)).await,
    };
    if let Err(err) = job.output.write(output).await {
        job.error.error(err).await;
    }
}

/// Runs jobs one at a time, in order. A failing job does not stop the next.
pub async fn execute_sequential(jobs: Vec<Job>, handler: &dyn JobHandler) {
    for job in &jobs {
        run_job(job, handler).await;
    }
}

/// Runs every job on its own task and waits for all of them.
///
/// A panicking job is reported on its own error sink as `panic: <message>`.
pub async fn execute_concurrent(jobs: Vec<Job>, handler: Arc<dyn JobHandler>) {
    let handles: Vec<_> = jobs
        .into_iter()
        .map(|job| {
            let sink = job.error.clone();
            let handler = handler.clone();
            let handle = tokio::spawn(async move { run_job(&job, handler.as_ref()).await });
            (handle, sink)
        })
        .collect();

    for (handle, sink) in handles {
        match handle.await {
            Ok(()) => {}
            Err(join_error) if join_error.is_panic() => {
                let message = panic_message(join_error.into_panic().as_ref());
                error!(panic = %message, "job panicked");
                sink.error(RecipeflowError::Execution(format!("panic: {message}")))
                    .await;
            }
            Err(join_error) => {
                warn!(error = %join_error, "job task aborted");
                sink.error(RecipeflowError::execution(join_error)).await;
            }
        }
    }
}

/// Extracts the message of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
