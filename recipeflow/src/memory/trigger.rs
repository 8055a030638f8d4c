//! Trigger memory persistence.
//!
//! A run can be written to a [`KeyValueStore`] and loaded back by trigger
//! ID. Every key lives under `<prefix>:<trigger_id>:` and shares one expiry:
//!
//! ```text
//! <prefix>:<id>:recipe
//! <prefix>:<id>:secrets
//! <prefix>:<id>:vars
//! <prefix>:<id>:inputs:<row>
//! <prefix>:<id>:components:<step_id>:<row>
//! ```

use super::run::RunMemory;
use super::status::StepStatus;
use super::step::StepMemory;
use super::store::KeyValueStore;
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::recipe::Recipe;
use crate::value::Value;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

const SEG_RECIPE: &str = "recipe";
const SEG_SECRETS: &str = "secrets";
const SEG_VARS: &str = "vars";
const SEG_INPUTS: &str = "inputs";
const SEG_COMPONENTS: &str = "components";

/// Persisted memory of one step for one row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentItemMemory {
    /// Rendered input.
    #[serde(default)]
    pub input: Option<Value>,
    /// Output.
    #[serde(default)]
    pub output: Option<Value>,
    /// Iteration element.
    #[serde(default)]
    pub element: Option<Value>,
    /// Status flags.
    #[serde(default)]
    pub status: StepStatus,
}

impl From<&StepMemory> for ComponentItemMemory {
    fn from(step: &StepMemory) -> Self {
        Self {
            input: Some(step.input.clone()),
            output: Some(step.output.clone()),
            element: step.element.clone(),
            status: step.status,
        }
    }
}

/// The persisted view of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerMemory {
    /// Step memories per row, keyed by step ID.
    pub components: IndexMap<String, Vec<ComponentItemMemory>>,
    /// Bound variables per row.
    pub inputs: Vec<Value>,
    /// Secrets shared by the run.
    pub secrets: Value,
    /// System variables shared by the run.
    pub vars: Value,
}

impl TriggerMemory {
    /// Captures the persisted view of a run.
    pub fn from_run(memory: &RunMemory) -> Result<Self> {
        let mut trigger = Self {
            secrets: Value::empty_map(),
            vars: Value::empty_map(),
            ..Self::default()
        };
        for index in 0..memory.batch_size() {
            let row = memory.read_row(index)?;
            if index == 0 {
                trigger.secrets = row.secrets.clone();
                trigger.vars = row.system.clone();
            }
            trigger.inputs.push(row.variables.clone());
            for (id, step) in &row.steps {
                trigger
                    .components
                    .entry(id.clone())
                    .or_default()
                    .push(step.into());
            }
        }
        Ok(trigger)
    }

    /// Number of rows.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.inputs.len()
    }
}

/// Writes and loads [`TriggerMemory`] through a key-value store.
pub struct TriggerMemoryStore<S> {
    store: S,
    prefix: String,
    ttl: Duration,
}

impl<S: KeyValueStore> TriggerMemoryStore<S> {
    /// Creates a store with the default prefix and a one hour expiry.
    pub fn new(store: S) -> Self {
        let config = EngineConfig::default();
        Self {
            store,
            prefix: config.key_prefix.clone(),
            ttl: config.memory_ttl(),
        }
    }

    /// Creates a store using the prefix and expiry of a config.
    pub fn from_config(store: S, config: &EngineConfig) -> Self {
        Self {
            store,
            prefix: config.key_prefix.clone(),
            ttl: config.memory_ttl(),
        }
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the expiry of written keys.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn key(&self, trigger_id: &str, rest: &str) -> String {
        format!("{}:{trigger_id}:{rest}", self.prefix)
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: String, data: &T) -> Result<()> {
        let encoded = serde_json::to_string(data)?;
        self.store.set(&key, encoded, self.ttl).await?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let raw = self.store.get(key).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Writes the recipe, secrets, vars and per-row inputs of a run.
    pub async fn write(
        &self,
        trigger_id: &str,
        recipe: Option<&Recipe>,
        memory: &TriggerMemory,
    ) -> Result<()> {
        if let Some(recipe) = recipe {
            self.write_json(self.key(trigger_id, SEG_RECIPE), recipe).await?;
        }
        self.write_json(self.key(trigger_id, SEG_SECRETS), &memory.secrets)
            .await?;
        self.write_json(self.key(trigger_id, SEG_VARS), &memory.vars)
            .await?;
        for (index, input) in memory.inputs.iter().enumerate() {
            self.write_json(self.key(trigger_id, &format!("{SEG_INPUTS}:{index}")), input)
                .await?;
        }
        debug!(trigger_id, batch_size = memory.batch_size(), "wrote trigger memory");
        Ok(())
    }

    /// Writes one step's memory for every row.
    pub async fn write_component_memory(
        &self,
        trigger_id: &str,
        step_id: &str,
        items: &[ComponentItemMemory],
    ) -> Result<()> {
        for (index, item) in items.iter().enumerate() {
            let key = self.key(trigger_id, &format!("{SEG_COMPONENTS}:{step_id}:{index}"));
            self.write_json(key, item).await?;
        }
        Ok(())
    }

    /// Writes a whole run: the trigger memory and every step's memory.
    pub async fn write_run(
        &self,
        trigger_id: &str,
        recipe: Option<&Recipe>,
        memory: &TriggerMemory,
    ) -> Result<()> {
        self.write(trigger_id, recipe, memory).await?;
        for (step_id, items) in &memory.components {
            self.write_component_memory(trigger_id, step_id, items)
                .await?;
        }
        Ok(())
    }

    /// Loads the recipe written for a trigger.
    pub async fn load_recipe(&self, trigger_id: &str) -> Result<Recipe> {
        self.read_json(&self.key(trigger_id, SEG_RECIPE)).await
    }

    /// Loads a trigger's memory. The batch size and step IDs are discovered
    /// by scanning keys.
    pub async fn load_by_trigger_id(&self, trigger_id: &str) -> Result<TriggerMemory> {
        let inputs_prefix = self.key(trigger_id, &format!("{SEG_INPUTS}:"));
        let batch_size = self.store.scan(&inputs_prefix).await?.len();

        let components_prefix = self.key(trigger_id, &format!("{SEG_COMPONENTS}:"));
        let step_ids: BTreeSet<String> = self
            .store
            .scan(&components_prefix)
            .await?
            .iter()
            .filter_map(|key| key.strip_prefix(&components_prefix))
            .filter_map(|rest| rest.split(':').next())
            .map(str::to_string)
            .collect();

        let mut memory = TriggerMemory {
            secrets: self.read_json(&self.key(trigger_id, SEG_SECRETS)).await?,
            vars: self.read_json(&self.key(trigger_id, SEG_VARS)).await?,
            ..TriggerMemory::default()
        };
        for index in 0..batch_size {
            memory.inputs.push(
                self.read_json(&format!("{inputs_prefix}{index}"))
                    .await?,
            );
        }
        for step_id in step_ids {
            let mut items = Vec::with_capacity(batch_size);
            for index in 0..batch_size {
                items.push(
                    self.read_json(&format!("{components_prefix}{step_id}:{index}"))
                        .await?,
                );
            }
            memory.components.insert(step_id, items);
        }
        Ok(memory)
    }

    /// Deletes every key under a trigger.
    pub async fn purge(&self, trigger_id: &str) -> Result<()> {
        let keys = self.store.scan(&self.key(trigger_id, "")).await?;
        for key in &keys {
            self.store.delete(key).await?;
        }
        debug!(trigger_id, deleted = keys.len(), "purged trigger memory");
        Ok(())
    }
}
