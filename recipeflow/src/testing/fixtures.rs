//! Test fixtures for recipe runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::components::{
    EchoComponent, FailingComponent, PanickingComponent, SlowComponent, TextComponent,
};
use crate::component::ComponentRegistry;
use crate::config::EngineConfig;
use crate::errors::UsageError;
use crate::execution::UsageHandler;
use crate::runner::PipelineRunner;
use crate::value::Value;

/// A usage handler that records every call and can reject batches.
#[derive(Debug, Default)]
pub struct RecordingUsageHandler {
    checks: Mutex<Vec<Vec<Value>>>,
    collects: Mutex<Vec<(Vec<Value>, Vec<Option<Value>>)>>,
    reject: Option<String>,
}

impl RecordingUsageHandler {
    /// Creates a handler that accepts every batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handler whose check fails with `message`.
    #[must_use]
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            reject: Some(message.into()),
            ..Self::default()
        }
    }

    /// Returns the inputs of every check.
    #[must_use]
    pub fn checks(&self) -> Vec<Vec<Value>> {
        self.checks.lock().clone()
    }

    /// Returns the inputs and outputs of every collect.
    #[must_use]
    pub fn collects(&self) -> Vec<(Vec<Value>, Vec<Option<Value>>)> {
        self.collects.lock().clone()
    }
}

#[async_trait]
impl UsageHandler for RecordingUsageHandler {
    async fn check(&self, inputs: &[Value]) -> Result<(), UsageError> {
        self.checks.lock().push(inputs.to_vec());
        match &self.reject {
            Some(message) => Err(UsageError::check(message.clone())),
            None => Ok(()),
        }
    }

    async fn collect(&self, inputs: &[Value], outputs: &[Option<Value>]) -> Result<(), UsageError> {
        self.collects.lock().push((inputs.to_vec(), outputs.to_vec()));
        Ok(())
    }
}

/// A registry with every fake component: `echo`, `text`, `fail`, `panic`
/// and `slow` (50ms per job).
#[must_use]
pub fn test_registry() -> ComponentRegistry {
    ComponentRegistry::new()
        .with_component(Arc::new(EchoComponent))
        .with_component(Arc::new(TextComponent))
        .with_component(Arc::new(FailingComponent::default()))
        .with_component(Arc::new(PanickingComponent))
        .with_component(Arc::new(SlowComponent::new(Duration::from_millis(50))))
}

/// A runner over [`test_registry`].
#[must_use]
pub fn test_runner(config: EngineConfig) -> PipelineRunner {
    PipelineRunner::new(Arc::new(test_registry()), config)
}

/// Builds input rows from `(name, value)` pairs, one row per inner slice.
#[must_use]
pub fn input_rows<const N: usize>(rows: &[[(&str, Value); N]]) -> Vec<Value> {
    rows.iter()
        .map(|row| Value::map_from(row.iter().map(|(k, v)| (*k, v.clone()))))
        .collect()
}
