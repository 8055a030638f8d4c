//! Batch-wide usage accounting.

use crate::errors::UsageError;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;

/// Gate and meter around a batch of jobs.
///
/// `check` runs once before any job executes and `collect` once after every
/// output is written. Both see the whole batch.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageHandler: Send + Sync {
    /// Decides whether the batch may run.
    async fn check(&self, inputs: &[Value]) -> Result<(), UsageError>;

    /// Records what the batch consumed. `outputs` is aligned with `inputs`.
    async fn collect(&self, inputs: &[Value], outputs: &[Option<Value>]) -> Result<(), UsageError>;
}

/// Usage handler that accepts everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUsageHandler;

#[async_trait]
impl UsageHandler for NoopUsageHandler {
    async fn check(&self, _inputs: &[Value]) -> Result<(), UsageError> {
        Ok(())
    }

    async fn collect(&self, _inputs: &[Value], _outputs: &[Option<Value>]) -> Result<(), UsageError> {
        Ok(())
    }
}

/// Returns a shared no-op handler.
#[must_use]
pub fn noop_usage_handler() -> Arc<dyn UsageHandler> {
    Arc::new(NoopUsageHandler)
}
