//! Pipeline runner: drives a recipe's steps wave by wave over run memory.

use super::condition::process_condition;
use super::io::{memory_job, ParentLink};
use super::iterator::{child_memory, collect_output_elements, prepare_iteration};
use super::trace::{generate_traces, Trace};
use crate::cancellation::CancellationToken;
use crate::component::{ComponentRegistry, ExecutionParams};
use crate::config::EngineConfig;
use crate::errors::{RecipeflowError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::graph::{build_graph, DependencyGraph, StepGroup};
use crate::memory::{
    KeyValueStore, RowMemory, RunMemory, StatusKind, StepField, StepMemory, TriggerMemory,
    TriggerMemoryStore,
};
use crate::observability::{RunSpanAttributes, SpanTimer, StepSpanAttributes};
use crate::recipe::{Recipe, Step, StepMap};
use crate::value::{Map, Value};
use futures::future::{join_all, BoxFuture, FutureExt};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// The trigger data of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    /// One input row per batch element.
    pub inputs: Vec<Value>,
    /// Secrets, overlaid on the recipe's declared secrets.
    pub secrets: Value,
    /// System variables passed to every component execution.
    pub system_variables: Value,
    /// Whether memory events are sent while the run progresses.
    pub streaming: bool,
    /// When set and the runner has a trigger store, the run is persisted
    /// under this ID.
    pub trigger_id: Option<String>,
}

impl RunRequest {
    /// Creates a request for a batch of inputs.
    #[must_use]
    pub fn new(inputs: Vec<Value>) -> Self {
        Self {
            inputs,
            secrets: Value::empty_map(),
            system_variables: Value::empty_map(),
            streaming: false,
            trigger_id: None,
        }
    }

    /// Sets the secrets.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Value) -> Self {
        self.secrets = secrets;
        self
    }

    /// Sets the system variables.
    #[must_use]
    pub fn with_system_variables(mut self, system_variables: Value) -> Self {
        self.system_variables = system_variables;
        self
    }

    /// Enables memory events.
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Persists the run under a trigger ID.
    #[must_use]
    pub fn with_trigger_id(mut self, trigger_id: impl Into<String>) -> Self {
        self.trigger_id = Some(trigger_id.into());
        self
    }
}

/// A step that errored for one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    /// The step ID.
    #[serde(rename = "componentID")]
    pub component_id: String,
    /// The row.
    pub batch_index: usize,
    /// The recorded message.
    pub message: String,
}

/// The outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Run ID.
    pub run_id: String,
    /// Rendered pipeline outputs, one per row.
    pub outputs: Vec<Value>,
    /// Per-step traces of the top-level steps.
    pub traces: IndexMap<String, Trace>,
    /// Wall time of the run in milliseconds.
    pub duration_ms: f64,
    /// Every step error recorded in a top-level step.
    pub errors: Vec<RunError>,
    /// The final run memory.
    #[serde(skip)]
    pub memory: Arc<RunMemory>,
}

impl RunResult {
    /// Returns true when no step errored.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the output of a row.
    #[must_use]
    pub fn output(&self, index: usize) -> Option<&Value> {
        self.outputs.get(index)
    }

    /// Returns the trace of a step.
    #[must_use]
    pub fn trace(&self, step_id: &str) -> Option<&Trace> {
        self.traces.get(step_id)
    }
}

/// Runs recipes against a component registry.
///
/// Steps of one wave run concurrently and every step runs its rows as one
/// batch. Job-level failures are recorded in run memory and only skip the
/// affected rows of downstream steps. Graph errors, usage errors and
/// cancellation abort the run.
pub struct PipelineRunner {
    registry: Arc<ComponentRegistry>,
    config: EngineConfig,
    sink: Arc<dyn EventSink>,
    trigger_store: Option<TriggerMemoryStore<Arc<dyn KeyValueStore>>>,
}

impl fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("persists", &self.trigger_store.is_some())
            .finish_non_exhaustive()
    }
}

impl PipelineRunner {
    /// Creates a runner.
    pub fn new(registry: Arc<ComponentRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            sink: Arc::new(NoOpEventSink),
            trigger_store: None,
        }
    }

    /// Sets the sink streaming runs send memory events to.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Persists runs that carry a trigger ID into `store`.
    #[must_use]
    pub fn with_trigger_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.trigger_store = Some(TriggerMemoryStore::from_config(store, &self.config));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the component registry.
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// Returns the trigger store, if runs are persisted.
    pub fn trigger_store(&self) -> Option<&TriggerMemoryStore<Arc<dyn KeyValueStore>>> {
        self.trigger_store.as_ref()
    }

    /// Runs a recipe over a batch of inputs.
    pub async fn run(
        &self,
        recipe: &Recipe,
        inputs: Vec<Value>,
        secrets: Value,
        token: &CancellationToken,
    ) -> Result<RunResult> {
        self.execute(recipe, RunRequest::new(inputs).with_secrets(secrets), token)
            .await
    }

    /// Runs a recipe for a full request.
    pub async fn execute(
        &self,
        recipe: &Recipe,
        request: RunRequest,
        token: &CancellationToken,
    ) -> Result<RunResult> {
        let timer = SpanTimer::start("recipe.run");
        let run_id = Uuid::now_v7().to_string();

        let graph = build_graph(&recipe.steps);
        let groups = graph.sort()?;
        let memory = Arc::new(self.init_memory(&run_id, recipe, &request)?);

        let span = RunSpanAttributes::new(run_id.as_str(), memory.batch_size(), recipe.steps.len())
            .with_modes(self.config.execution_mode, self.config.condition_semantics)
            .with_trigger_id(request.trigger_id.as_deref())
            .span();

        let result: Result<RunResult> = async {
            info!(groups = groups.len(), "run started");
            let timings = self
                .run_groups(&memory, &recipe.steps, &graph, &groups, None, token)
                .await?;

            let template = recipe.output_template();
            let mut outputs = Vec::with_capacity(memory.batch_size());
            for index in 0..memory.batch_size() {
                let output = memory.render(index, &template, true)?;
                memory.set_pipeline_output(index, output.clone())?;
                outputs.push(output);
            }

            let mut traces = generate_traces(&memory, recipe.steps.keys(), true)?;
            for (step_id, trace) in &mut traces {
                if let Some(elapsed) = timings.get(step_id) {
                    trace.compute_time_ms = *elapsed;
                }
            }
            let errors = collect_errors(&memory, recipe.steps.keys())?;

            if let (Some(store), Some(trigger_id)) = (&self.trigger_store, request.trigger_id.as_deref()) {
                let trigger = TriggerMemory::from_run(&memory)?;
                store.write_run(trigger_id, Some(recipe), &trigger).await?;
            }

            let duration_ms = timer.finish();
            info!(duration_ms, errors = errors.len(), "run finished");
            Ok(RunResult {
                run_id: run_id.clone(),
                outputs,
                traces,
                duration_ms,
                errors,
                memory: memory.clone(),
            })
        }
        .instrument(span)
        .await;
        result
    }

    /// Runs a persisted trigger again from its stored recipe and inputs.
    pub async fn rerun(&self, trigger_id: &str, token: &CancellationToken) -> Result<RunResult> {
        let Some(store) = &self.trigger_store else {
            return Err(RecipeflowError::execution("runner has no trigger store"));
        };
        let recipe = store.load_recipe(trigger_id).await?;
        let trigger = store.load_by_trigger_id(trigger_id).await?;
        let request = RunRequest::new(trigger.inputs)
            .with_secrets(trigger.secrets)
            .with_system_variables(trigger.vars)
            .with_trigger_id(trigger_id);
        self.execute(&recipe, request, token).await
    }

    fn init_memory(&self, run_id: &str, recipe: &Recipe, request: &RunRequest) -> Result<RunMemory> {
        let mut secrets: Map = recipe
            .secrets
            .iter()
            .map(|(name, reference)| (name.clone(), Value::from(reference.as_str())))
            .collect();
        if let Some(provided) = request.secrets.as_map() {
            secrets.extend(provided.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let secrets = Value::Map(secrets);

        let rows = request
            .inputs
            .iter()
            .map(|input| {
                let mut row = RowMemory::new(recipe.bind_variables(input)?, secrets.clone())
                    .with_system(request.system_variables.clone());
                for step_id in recipe.steps.keys() {
                    row.steps.insert(step_id.clone(), StepMemory::default());
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>>>()?;

        let memory = RunMemory::new(run_id, rows)
            .with_sink(self.sink.clone())
            .with_output_template(recipe.output_template());
        if request.streaming {
            memory.enable_streaming();
        }
        Ok(memory)
    }

    /// Runs the groups in order and returns each step's wall time.
    async fn run_groups(
        &self,
        memory: &Arc<RunMemory>,
        steps: &StepMap,
        graph: &DependencyGraph,
        groups: &[StepGroup],
        parent: Option<&ParentLink>,
        token: &CancellationToken,
    ) -> Result<IndexMap<String, f64>> {
        let mut timings = IndexMap::with_capacity(steps.len());

        for group in groups {
            token.check()?;
            debug!(group = group.index, steps = ?group.steps, "running group");

            let runs = group
                .steps
                .iter()
                .filter_map(|id| steps.get(id).map(|step| (id, step)))
                .map(|(id, step)| {
                    let upstream = graph.upstream_of(id);
                    let span = StepSpanAttributes::new(id.as_str(), step.step_type.as_str())
                        .with_task(&step.task)
                        .with_group(group.index)
                        .span();
                    async move {
                        let timer = SpanTimer::start(id.as_str());
                        let result = self
                            .run_step(memory, id, step, &upstream, parent, token)
                            .await;
                        (id.clone(), timer.finish(), result)
                    }
                    .instrument(span)
                });

            for (id, elapsed, result) in join_all(runs).await {
                result?;
                timings.insert(id, elapsed);
            }

            if parent.is_none() {
                for index in 0..memory.batch_size() {
                    memory.refresh_pipeline_output(index)?;
                }
            }
        }

        Ok(timings)
    }

    async fn run_step(
        &self,
        memory: &Arc<RunMemory>,
        step_id: &str,
        step: &Step,
        upstream: &[String],
        parent: Option<&ParentLink>,
        token: &CancellationToken,
    ) -> Result<()> {
        let started = process_condition(
            memory,
            step_id,
            upstream,
            step.condition(),
            self.config.condition_semantics,
        )?;
        if started.is_empty() {
            debug!(step_id, "no rows to run");
            return Ok(());
        }

        if step.is_iterator() {
            let index_name = step
                .index
                .as_deref()
                .unwrap_or(&self.config.default_range_index);
            let runs = started.into_iter().map(|index| {
                self.run_iteration(memory, index, step_id, step, upstream, index_name, parent, token)
            });
            for result in join_all(runs).await {
                result?;
            }
            Ok(())
        } else {
            self.run_component(memory, &started, step_id, step, parent, token)
                .await
        }
    }

    async fn run_component(
        &self,
        memory: &Arc<RunMemory>,
        started: &[usize],
        step_id: &str,
        step: &Step,
        parent: Option<&ParentLink>,
        token: &CancellationToken,
    ) -> Result<()> {
        let mut rows = Vec::with_capacity(started.len());
        let mut setup = None;
        for &index in started {
            let rendered = if step.setup.is_null() {
                Ok(Value::empty_map())
            } else {
                memory.render(index, &step.setup, false)
            };
            match rendered {
                Ok(rendered) => {
                    memory.set_step_data(index, step_id, StepField::Setup, rendered.clone())?;
                    setup.get_or_insert(rendered);
                    rows.push(index);
                }
                Err(err) if err.is_job_level() => {
                    fail_row(memory, index, step_id, &err.to_string(), parent)?;
                }
                Err(err) => return Err(err),
            }
        }
        let Some(&first) = rows.first() else {
            return Ok(());
        };

        let params = ExecutionParams {
            component_id: step_id.to_string(),
            task: step.task.clone(),
            setup: setup.unwrap_or_else(Value::empty_map),
            system_variables: memory.read_row(first)?.system.clone(),
            execution_mode: self.config.execution_mode,
        };
        let wrapper = match self.registry.prepare(&step.step_type, &params, &self.config) {
            Ok(wrapper) => wrapper,
            Err(err) => {
                warn!(step_id, component_type = %step.step_type, error = %err, "cannot prepare step");
                let message = err.to_string();
                for &index in &rows {
                    fail_row(memory, index, step_id, &message, parent)?;
                }
                return Ok(());
            }
        };

        let jobs = rows
            .iter()
            .map(|&index| memory_job(memory, index, step_id, &step.input, parent, token))
            .collect();

        if let Err(err) = wrapper.execute(jobs).await {
            let message = err.to_string();
            for &index in &rows {
                if !memory.status(index, step_id, StatusKind::Errored)? {
                    fail_row(memory, index, step_id, &message, parent)?;
                }
            }
            return match err {
                RecipeflowError::Usage(_) | RecipeflowError::Cancelled(_) => Err(err),
                _ => Ok(()),
            };
        }

        for &index in &rows {
            if !memory.status(index, step_id, StatusKind::Errored)? {
                memory.set_status(index, step_id, StatusKind::Completed, true)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_iteration(
        &self,
        memory: &Arc<RunMemory>,
        index: usize,
        step_id: &str,
        step: &Step,
        upstream: &[String],
        index_name: &str,
        parent: Option<&ParentLink>,
        token: &CancellationToken,
    ) -> Result<()> {
        let iteration = match prepare_iteration(memory, index, step) {
            Ok(iteration) => iteration,
            Err(err) if err.is_job_level() => {
                debug!(step_id, batch_index = index, error = %err, "cannot iterate");
                return fail_row(memory, index, step_id, &err.to_string(), parent);
            }
            Err(err) => return Err(err),
        };
        debug!(step_id, batch_index = index, iterations = iteration.len(), "iterating");

        let child = Arc::new(child_memory(
            memory, index, step_id, step, upstream, &iteration, index_name,
        )?);
        let link = ParentLink {
            memory: memory.clone(),
            index,
            step_id: step_id.to_string(),
        };
        match self.run_nested(&child, &step.steps, &link, token).await {
            Ok(()) => {}
            Err(RecipeflowError::Graph(err)) => {
                return fail_row(memory, index, step_id, &err.to_string(), parent);
            }
            Err(err) => return Err(err),
        }

        let output = collect_output_elements(&child, step)?;
        memory.set_step_data(index, step_id, StepField::Output, output)?;
        if !memory.status(index, step_id, StatusKind::Errored)? {
            memory.set_status(index, step_id, StatusKind::Completed, true)?;
        }
        Ok(())
    }

    fn run_nested<'a>(
        &'a self,
        child: &'a Arc<RunMemory>,
        steps: &'a StepMap,
        link: &'a ParentLink,
        token: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let graph = build_graph(steps);
            let groups = graph.sort()?;
            self.run_groups(child, steps, &graph, &groups, Some(link), token)
                .await
                .map(|_| ())
        }
        .boxed()
    }
}

/// Marks a step errored for a row, and the iterator row it runs under.
fn fail_row(
    memory: &RunMemory,
    index: usize,
    step_id: &str,
    message: &str,
    parent: Option<&ParentLink>,
) -> Result<()> {
    memory.record_error(index, step_id, message)?;
    if let Some(parent) = parent {
        parent.record_error(message);
    }
    Ok(())
}

fn collect_errors<'a>(
    memory: &RunMemory,
    step_ids: impl IntoIterator<Item = &'a String>,
) -> Result<Vec<RunError>> {
    let mut errors = Vec::new();
    for step_id in step_ids {
        for index in 0..memory.batch_size() {
            let step = memory.step(index, step_id)?;
            if step.status.errored {
                errors.push(RunError {
                    component_id: step_id.clone(),
                    batch_index: index,
                    message: step.error.message,
                });
            }
        }
    }
    Ok(errors)
}
