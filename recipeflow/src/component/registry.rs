//! Component registry.

use crate::config::{EngineConfig, ExecutionMode};
use crate::errors::{RegistryError, Result};
use crate::execution::{noop_usage_handler, CompiledSchema, Execution, ExecutionWrapper, UsageHandler};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// What a component needs to create an execution for one step.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionParams {
    /// The step ID.
    pub component_id: String,
    /// The task the step runs.
    pub task: String,
    /// Rendered setup shared by the batch.
    pub setup: Value,
    /// System variables of the run.
    pub system_variables: Value,
    /// How the execution should dispatch its jobs.
    pub execution_mode: ExecutionMode,
}

/// A component type.
pub trait Component: Send + Sync {
    /// The step `type` this component serves.
    fn component_type(&self) -> &str;

    /// JSON Schema of a task's input. `None` accepts anything.
    fn input_schema(&self, _task: &str) -> Option<Value> {
        None
    }

    /// JSON Schema of a task's output. `None` accepts anything.
    fn output_schema(&self, _task: &str) -> Option<Value> {
        None
    }

    /// Creates the execution for one step's batch.
    fn create_execution(&self, params: &ExecutionParams) -> anyhow::Result<Box<dyn Execution>>;

    /// Creates the usage handler for one step's batch.
    fn usage_handler(&self, _params: &ExecutionParams) -> Arc<dyn UsageHandler> {
        noop_usage_handler()
    }
}

/// Registry of component types.
#[derive(Default)]
pub struct ComponentRegistry {
    components: RwLock<IndexMap<String, Arc<dyn Component>>>,
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("types", &self.types())
            .finish()
    }
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component under its own type, replacing any previous one.
    pub fn register(&self, component: Arc<dyn Component>) {
        let component_type = component.component_type().to_string();
        self.components.write().insert(component_type, component);
    }

    /// Registers a component and returns the registry.
    #[must_use]
    pub fn with_component(self, component: Arc<dyn Component>) -> Self {
        self.register(component);
        self
    }

    /// Gets a component by type.
    pub fn get(&self, component_type: &str) -> Result<Arc<dyn Component>, RegistryError> {
        self.components
            .read()
            .get(component_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownComponent(component_type.to_string()))
    }

    /// Returns true when a type is registered.
    #[must_use]
    pub fn contains(&self, component_type: &str) -> bool {
        self.components.read().contains_key(component_type)
    }

    /// Lists registered types in registration order.
    pub fn types(&self) -> Vec<String> {
        self.components.read().keys().cloned().collect()
    }

    /// Builds the wrapped execution of one step.
    ///
    /// Schemas are compiled only when `config.validate_schemas` is set.
    pub fn prepare(
        &self,
        component_type: &str,
        params: &ExecutionParams,
        config: &EngineConfig,
    ) -> Result<ExecutionWrapper> {
        let component = self.get(component_type)?;
        let execution = component.create_execution(params).map_err(|err| {
            RegistryError::CreateExecution {
                component_id: params.component_id.clone(),
                reason: format!("{err:#}"),
            }
        })?;

        let mut wrapper = ExecutionWrapper::new(params.component_id.clone(), execution)
            .with_usage_handler(component.usage_handler(params));
        if config.validate_schemas {
            let input = component.input_schema(&params.task);
            let output = component.output_schema(&params.task);
            wrapper = wrapper
                .with_input_schema(CompiledSchema::compile_optional("input", input.as_ref())?)
                .with_output_schema(CompiledSchema::compile_optional("output", output.as_ref())?);
        }
        Ok(wrapper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RecipeflowError;
    use crate::execution::Job;
    use crate::testing::EchoComponent;
    use pretty_assertions::assert_eq;

    struct Refusing;

    impl Component for Refusing {
        fn component_type(&self) -> &str {
            "refusing"
        }

        fn create_execution(&self, _params: &ExecutionParams) -> anyhow::Result<Box<dyn Execution>> {
            anyhow::bail!("missing api key")
        }
    }

    fn params() -> ExecutionParams {
        ExecutionParams {
            component_id: "s".to_string(),
            task: "TASK".to_string(),
            setup: Value::empty_map(),
            system_variables: Value::empty_map(),
            execution_mode: ExecutionMode::Concurrent,
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = ComponentRegistry::new()
            .with_component(Arc::new(EchoComponent))
            .with_component(Arc::new(Refusing));

        assert!(registry.contains("echo"));
        assert_eq!(registry.types(), vec!["echo", "refusing"]);
        assert!(registry.get("echo").is_ok());
        assert_eq!(
            registry.get("nope").err(),
            Some(RegistryError::UnknownComponent("nope".into()))
        );
    }

    #[tokio::test]
    async fn test_prepare() {
        let registry = ComponentRegistry::new().with_component(Arc::new(EchoComponent));
        let wrapper = registry
            .prepare("echo", &params(), &EngineConfig::default())
            .unwrap();
        assert_eq!(wrapper.component_id(), "s");

        let (job, cell) = Job::detached(Value::map_from([("v", Value::Int(1))]));
        wrapper.execute(vec![job]).await.unwrap();
        assert_eq!(cell.output(), Some(Value::map_from([("v", Value::Int(1))])));
    }

    #[test]
    fn test_prepare_errors() {
        let registry = ComponentRegistry::new().with_component(Arc::new(Refusing));
        let config = EngineConfig::default();

        let err = registry.prepare("refusing", &params(), &config).err().unwrap();
        assert_eq!(err.to_string(), "creating execution for component 's': missing api key");

        let err = registry.prepare("echo", &params(), &config).err().unwrap();
        assert!(matches!(err, RecipeflowError::Registry(RegistryError::UnknownComponent(_))));
    }
}
