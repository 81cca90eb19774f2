//! Task graph execution.
//!
//! A run takes a set of named tasks, each declaring the tasks it depends on,
//! validates that the dependency relation is a DAG, and then runs every task
//! exactly once, never before all of its dependencies have completed. Each
//! completion is written to a [`ResultContext`]; a task body only ever sees
//! the projection of that context onto its declared dependencies.
//!
//! A task may complete with [`TaskOutput::Absent`] to signal that it chose not
//! to act. Dependents still run and receive the marker. The first task error
//! ends the run: nothing that has not started yet is started afterwards.

use async_trait::async_trait;
use petgraph::algo::toposort;
use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Topo;
use petgraph::Direction;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::dag_flow_parallel::execute_parallel;
use super::events::{EventSink, LoggingEventSink, RuntimeEvent, RuntimeEventEnvelope};
use super::function_action::FnAction;
use crate::core::config::DagConfig;
use crate::core::errors::{DagError, GraphDefinitionError};

/// What a task produced when it completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskOutput {
    Value(Value),
    /// The task intentionally produced nothing.
    Absent,
}

impl TaskOutput {
    /// Serializes `value` into a completed output.
    pub fn from_serialize<T: Serialize>(task: &str, value: &T) -> Result<Self, DagError> {
        serde_json::to_value(value)
            .map(Self::Value)
            .map_err(|e| DagError::Serialization {
                task: task.to_string(),
                message: e.to_string(),
            })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent => None,
        }
    }
}

impl From<Value> for TaskOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Read-only view of the outputs a task declared it depends on.
#[derive(Debug, Clone)]
pub struct Dependencies {
    task: String,
    outputs: HashMap<String, TaskOutput>,
}

impl Dependencies {
    /// Name of the task receiving this view.
    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn output(&self, dependency: &str) -> Result<&TaskOutput, DagError> {
        self.outputs
            .get(dependency)
            .ok_or_else(|| DagError::UndeclaredDependency {
                task: self.task.clone(),
                dependency: dependency.to_string(),
            })
    }

    pub fn is_absent(&self, dependency: &str) -> Result<bool, DagError> {
        Ok(self.output(dependency)?.is_absent())
    }

    /// Decodes a dependency's value, `None` when it completed with the absence marker.
    pub fn get<T: DeserializeOwned>(&self, dependency: &str) -> Result<Option<T>, DagError> {
        match self.output(dependency)? {
            TaskOutput::Absent => Ok(None),
            TaskOutput::Value(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| DagError::DependencyDecode {
                    task: self.task.clone(),
                    dependency: dependency.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    /// Like [`Dependencies::get`], but the absence marker is an error.
    pub fn require<T: DeserializeOwned>(&self, dependency: &str) -> Result<T, DagError> {
        self.get(dependency)?
            .ok_or_else(|| DagError::AbsentDependency {
                task: self.task.clone(),
                dependency: dependency.to_string(),
            })
    }
}

/// Unit of work of a task.
#[async_trait]
pub trait TaskAction<E>: Send + Sync {
    async fn run(&self, dependencies: Dependencies) -> Result<TaskOutput, E>;
}

/// A unit of work plus the names of the tasks it depends on.
pub struct Task<E> {
    pub dependencies: Vec<String>,
    pub action: Arc<dyn TaskAction<E>>,
}

impl<E> Clone for Task<E> {
    fn clone(&self) -> Self {
        Self {
            dependencies: self.dependencies.clone(),
            action: self.action.clone(),
        }
    }
}

impl<E> fmt::Debug for Task<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl<E: Send + 'static> Task<E> {
    pub fn new<I, S>(dependencies: I, action: impl TaskAction<E> + 'static) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            action: Arc::new(action),
        }
    }

    /// Builds a task from an async closure over its dependency view.
    pub fn from_fn<I, S, F, Fut>(dependencies: I, func: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutput, E>> + Send + 'static,
    {
        Self::new(dependencies, FnAction::new(func))
    }
}

/// Accumulated outputs of a run, keyed by task name.
///
/// Entries are written once, when the task completes, and never replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultContext {
    outputs: BTreeMap<String, TaskOutput>,
}

impl ResultContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.outputs.contains_key(task)
    }

    pub fn get(&self, task: &str) -> Option<&TaskOutput> {
        self.outputs.get(task)
    }

    /// The task's value, `None` if it is missing or completed absent.
    pub fn value(&self, task: &str) -> Option<&Value> {
        self.get(task).and_then(TaskOutput::as_value)
    }

    pub fn get_as<T: DeserializeOwned>(&self, task: &str) -> Result<Option<T>, DagError> {
        match self.value(task) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| DagError::Serialization {
                    task: task.to_string(),
                    message: e.to_string(),
                }),
        }
    }

    pub fn is_absent(&self, task: &str) -> bool {
        self.get(task).is_some_and(TaskOutput::is_absent)
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    pub fn into_inner(self) -> BTreeMap<String, TaskOutput> {
        self.outputs
    }

    /// Records a completion. Returns false, leaving the entry untouched, if
    /// the task already completed.
    pub(crate) fn commit(&mut self, task: &str, output: TaskOutput) -> bool {
        if self.outputs.contains_key(task) {
            return false;
        }
        self.outputs.insert(task.to_string(), output);
        true
    }

    pub(crate) fn project(&self, task: &str, dependencies: &[String]) -> Dependencies {
        let outputs = dependencies
            .iter()
            .filter_map(|dep| self.outputs.get(dep).map(|out| (dep.clone(), out.clone())))
            .collect();
        Dependencies {
            task: task.to_string(),
            outputs,
        }
    }
}

/// A validated, immutable set of tasks.
pub struct TaskGraph<E> {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
    tasks: Vec<Task<E>>,
}

impl<E> fmt::Debug for TaskGraph<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskGraph")
            .field("tasks", &self.graph.node_weights().collect::<Vec<_>>())
            .finish()
    }
}

impl<E> TaskGraph<E> {
    /// Validates and indexes `tasks`, preserving their iteration order.
    pub fn new<I, S>(tasks: I) -> Result<Self, GraphDefinitionError>
    where
        I: IntoIterator<Item = (S, Task<E>)>,
        S: Into<String>,
    {
        let mut graph = DiGraph::<String, ()>::new();
        let mut indices = HashMap::new();
        let mut ordered = Vec::new();

        for (name, task) in tasks {
            let name = name.into();
            if indices.contains_key(&name) {
                return Err(GraphDefinitionError::DuplicateTask { task: name });
            }
            let index = graph.add_node(name.clone());
            indices.insert(name, index);
            ordered.push(task);
        }

        if ordered.is_empty() {
            return Err(GraphDefinitionError::Empty);
        }

        validate_task_dependencies(&graph, &indices, &ordered)?;

        for (position, task) in ordered.iter().enumerate() {
            let dependent = NodeIndex::new(position);
            for dependency in &task.dependencies {
                graph.update_edge(indices[dependency], dependent, ());
            }
        }

        validate_dag_structure(&graph)?;

        Ok(Self {
            graph,
            indices,
            tasks: ordered,
        })
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, task: &str) -> bool {
        self.indices.contains_key(task)
    }

    /// Task names in declaration order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.graph.node_weights().map(String::as_str)
    }

    pub fn dependencies(&self, task: &str) -> Option<&[String]> {
        let index = self.indices.get(task)?;
        Some(&self.tasks[index.index()].dependencies)
    }

    /// Tasks that declare `task` as a dependency.
    pub fn dependents(&self, task: &str) -> Vec<&str> {
        let Some(&index) = self.indices.get(task) else {
            return Vec::new();
        };
        let mut dependents: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .collect();
        dependents.sort();
        dependents
            .into_iter()
            .map(|idx| self.graph[idx].as_str())
            .collect()
    }

    /// Groups tasks by their distance from a root: level 0 has no
    /// dependencies, level n depends on something at level n - 1.
    pub fn levels(&self) -> Vec<Vec<String>> {
        let mut levels: Vec<Vec<NodeIndex>> = Vec::new();
        let mut node_levels: HashMap<NodeIndex, usize> = HashMap::new();

        let mut topo = Topo::new(&self.graph);
        while let Some(index) = topo.next(&self.graph) {
            let level = self
                .graph
                .neighbors_directed(index, Direction::Incoming)
                .map(|dep| node_levels.get(&dep).copied().unwrap_or(0) + 1)
                .max()
                .unwrap_or(0);
            node_levels.insert(index, level);

            while levels.len() <= level {
                levels.push(Vec::new());
            }
            levels[level].push(index);
        }

        levels
            .into_iter()
            .map(|mut level| {
                level.sort();
                level
                    .into_iter()
                    .map(|idx| self.graph[idx].clone())
                    .collect()
            })
            .collect()
    }

    /// Graphviz rendering, edges pointing from dependency to dependent.
    pub fn to_dot(&self) -> String {
        format!(
            "{:?}",
            Dot::with_config(&self.graph, &[DotConfig::EdgeNoLabel])
        )
    }

    pub(crate) fn task_at(&self, index: NodeIndex) -> &Task<E> {
        &self.tasks[index.index()]
    }

    pub(crate) fn name_at(&self, index: NodeIndex) -> &str {
        &self.graph[index]
    }

    pub(crate) fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }
}

/// Validates the dependencies of the tasks.
fn validate_task_dependencies<E>(
    graph: &DiGraph<String, ()>,
    indices: &HashMap<String, NodeIndex>,
    tasks: &[Task<E>],
) -> Result<(), GraphDefinitionError> {
    for (position, task) in tasks.iter().enumerate() {
        for dependency in &task.dependencies {
            if !indices.contains_key(dependency) {
                return Err(GraphDefinitionError::UnknownDependency {
                    task: graph[NodeIndex::new(position)].clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Validates the structure of the DAG.
fn validate_dag_structure(graph: &DiGraph<String, ()>) -> Result<(), GraphDefinitionError> {
    toposort(graph, None)
        .map(|_| ())
        .map_err(|cycle| GraphDefinitionError::Cycle {
            task: graph[cycle.node_id()].clone(),
        })
}

/// Bookkeeping for a single run: which tasks have started, and the context
/// built so far. Owned by one executor loop, so context writes never race.
pub(crate) struct RunState<'g, E> {
    graph: &'g TaskGraph<E>,
    run_id: String,
    started: Vec<bool>,
    context: ResultContext,
    sink: Option<Arc<dyn EventSink>>,
}

impl<'g, E: fmt::Display> RunState<'g, E> {
    fn new(graph: &'g TaskGraph<E>, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self {
            graph,
            run_id: uuid::Uuid::new_v4().to_string(),
            started: vec![false; graph.len()],
            context: ResultContext::new(),
            sink,
        }
    }

    pub(crate) fn run_id(&self) -> &str {
        &self.run_id
    }

    pub(crate) fn completed(&self) -> usize {
        self.context.len()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.context.len() == self.graph.len()
    }

    fn is_ready(&self, index: NodeIndex) -> bool {
        !self.started[index.index()]
            && self
                .graph
                .task_at(index)
                .dependencies
                .iter()
                .all(|dep| self.context.contains(dep))
    }

    /// Not-yet-started tasks whose dependencies have all completed, in
    /// declaration order.
    pub(crate) fn ready(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&idx| self.is_ready(idx))
            .collect()
    }

    /// Marks a task started and hands out its body and dependency view.
    pub(crate) fn start(&mut self, index: NodeIndex) -> (Arc<dyn TaskAction<E>>, Dependencies) {
        self.started[index.index()] = true;
        let name = self.graph.name_at(index);
        let task = self.graph.task_at(index);
        debug!(run_id = %self.run_id, task = name, "Starting task");
        self.emit(RuntimeEvent::TaskStarted {
            task: name.to_string(),
        });
        (
            task.action.clone(),
            self.context.project(name, &task.dependencies),
        )
    }

    pub(crate) fn complete(&mut self, index: NodeIndex, output: TaskOutput, started: Instant) {
        let name = self.graph.name_at(index);
        let absent = output.is_absent();
        if !self.context.commit(name, output) {
            warn!(run_id = %self.run_id, task = name, "Ignoring second completion of task");
            return;
        }
        debug!(run_id = %self.run_id, task = name, absent, "Task completed");
        self.emit(RuntimeEvent::TaskCompleted {
            task: name.to_string(),
            absent,
            duration_ms: started.elapsed().as_millis() as u64,
        });
    }

    pub(crate) fn fail(&self, index: NodeIndex, err: &E) {
        let name = self.graph.name_at(index);
        error!(run_id = %self.run_id, task = name, error = %err, "Task failed");
        self.emit(RuntimeEvent::TaskFailed {
            task: name.to_string(),
            error: err.to_string(),
        });
    }

    pub(crate) fn finish(self, success: bool) -> ResultContext {
        self.emit(RuntimeEvent::RunFinished {
            success,
            completed: self.context.len(),
        });
        self.context
    }

    fn emit(&self, event: RuntimeEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(&RuntimeEventEnvelope::new(&self.run_id, event));
        }
    }
}

/// Runs task graphs. Holds no per-run state, so one executor can drive any
/// number of independent runs.
#[derive(Clone, Default)]
pub struct DagExecutor {
    pub config: DagConfig,
    event_sink: Option<Arc<dyn EventSink>>,
}

impl fmt::Debug for DagExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagExecutor")
            .field("config", &self.config)
            .field("event_sink", &self.event_sink.is_some())
            .finish()
    }
}

impl DagExecutor {
    pub fn new(config: DagConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            event_sink: None,
        })
    }

    pub fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.event_sink = Some(sink);
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.set_event_sink(sink);
        self
    }

    /// The sink events of a run go to: the attached one, else the log, and
    /// none at all when events are disabled.
    fn active_sink(&self) -> Option<Arc<dyn EventSink>> {
        if !self.config.emit_events {
            return None;
        }
        Some(
            self.event_sink
                .clone()
                .unwrap_or_else(|| Arc::new(LoggingEventSink)),
        )
    }

    /// Validates `tasks` and runs them.
    ///
    /// Resolves with the full context once every task has completed, or with
    /// the first task error. Graph definition errors are reported before any
    /// task body runs.
    pub async fn execute<E, I, S>(&self, tasks: I) -> Result<ResultContext, E>
    where
        E: From<DagError> + fmt::Display + Send + 'static,
        I: IntoIterator<Item = (S, Task<E>)>,
        S: Into<String>,
    {
        let graph = TaskGraph::new(tasks).map_err(|e| {
            warn!("Rejecting task graph: {}", e);
            E::from(DagError::Definition(e))
        })?;
        self.execute_graph(&graph).await
    }

    /// Runs an already validated graph.
    pub async fn execute_graph<E>(&self, graph: &TaskGraph<E>) -> Result<ResultContext, E>
    where
        E: From<DagError> + fmt::Display + Send + 'static,
    {
        let state = RunState::new(graph, self.active_sink());
        for index in graph.node_indices() {
            state.emit(RuntimeEvent::TaskPlanned {
                task: graph.name_at(index).to_string(),
                dependencies: graph.task_at(index).dependencies.clone(),
            });
        }

        let span = info_span!("dag_run", run_id = %state.run_id(), task_count = graph.len());
        async move {
            if self.config.enable_parallel_execution {
                info!(
                    "Using parallel execution (max {} tasks in flight)",
                    self.config.max_parallel_tasks
                );
                execute_parallel(state, self.config.max_parallel_tasks).await
            } else {
                info!("Using sequential execution");
                execute_sequential(state).await
            }
        }
        .instrument(span)
        .await
    }
}

/// Runs one ready task at a time, recomputing readiness after every completion.
async fn execute_sequential<E>(mut state: RunState<'_, E>) -> Result<ResultContext, E>
where
    E: From<DagError> + fmt::Display + Send + 'static,
{
    while let Some(index) = state.ready().first().copied() {
        let (action, dependencies) = state.start(index);
        let started = Instant::now();
        match action.run(dependencies).await {
            Ok(output) => state.complete(index, output, started),
            Err(err) => {
                state.fail(index, &err);
                let completed = state.completed();
                state.finish(false);
                info!(completed, "Run aborted");
                return Err(err);
            }
        }
    }

    debug_assert!(state.is_finished(), "validated graph left tasks unstarted");
    info!(completed = state.completed(), "Run complete");
    Ok(state.finish(true))
}
