//! Jobs: one unit of component work for one batch row.

use crate::cancellation::CancellationToken;
use crate::errors::{RecipeflowError, Result};
use crate::value::Value;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;

/// Source of a job's input.
#[async_trait]
pub trait InputReader: Send + Sync {
    /// Reads the rendered input.
    async fn read(&self) -> Result<Value>;
}

/// Sink of a job's output.
#[async_trait]
pub trait OutputWriter: Send + Sync {
    /// Writes the output. May be called more than once.
    async fn write(&self, output: Value) -> Result<()>;
}

/// Sink of a job's error.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Records that the job failed.
    async fn error(&self, err: RecipeflowError);
}

/// A job handed to a component execution.
#[derive(Clone)]
pub struct Job {
    /// Input source.
    pub input: Arc<dyn InputReader>,
    /// Output sink.
    pub output: Arc<dyn OutputWriter>,
    /// Error sink.
    pub error: Arc<dyn ErrorHandler>,
    /// Cancellation of the run the job belongs to.
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

impl Job {
    /// Creates a job.
    pub fn new(
        input: Arc<dyn InputReader>,
        output: Arc<dyn OutputWriter>,
        error: Arc<dyn ErrorHandler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            input,
            output,
            error,
            cancel,
        }
    }

    /// Creates a job backed by in-memory cells, mostly useful in tests and
    /// for running a component outside a recipe.
    pub fn detached(input: Value) -> (Self, Arc<JobCell>) {
        let cell = Arc::new(JobCell::new(input));
        let job = Self::new(cell.clone(), cell.clone(), cell.clone(), CancellationToken::new());
        (job, cell)
    }
}

/// An in-memory input source, output sink and error sink.
#[derive(Debug, Default)]
pub struct JobCell {
    input: Value,
    outputs: Mutex<Vec<Value>>,
    errors: Mutex<Vec<RecipeflowError>>,
}

impl JobCell {
    /// Creates a cell holding an input.
    #[must_use]
    pub fn new(input: Value) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    /// The last output written.
    pub fn output(&self) -> Option<Value> {
        self.outputs.lock().last().cloned()
    }

    /// Every output written, in order.
    pub fn outputs(&self) -> Vec<Value> {
        self.outputs.lock().clone()
    }

    /// Every error recorded, in order.
    pub fn errors(&self) -> Vec<RecipeflowError> {
        self.errors.lock().clone()
    }

    /// The first error message recorded.
    pub fn error_message(&self) -> Option<String> {
        self.errors.lock().first().map(ToString::to_string)
    }
}

#[async_trait]
impl InputReader for JobCell {
    async fn read(&self) -> Result<Value> {
        Ok(self.input.clone())
    }
}

#[async_trait]
impl OutputWriter for JobCell {
    async fn write(&self, output: Value) -> Result<()> {
        self.outputs.lock().push(output);
        Ok(())
    }
}

#[async_trait]
impl ErrorHandler for JobCell {
    async fn error(&self, err: RecipeflowError) {
        self.errors.lock().push(err);
    }
}
