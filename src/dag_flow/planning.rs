//! Planning utilities for task graphs
//!
//! Provides a declarative builder for naming tasks and wiring their
//! dependencies before a run.

use std::future::Future;

use super::dag_flow::{Dependencies, Task, TaskAction, TaskGraph, TaskOutput};
use crate::core::errors::GraphDefinitionError;

/// A declarative plan builder for constructing task graphs
pub struct Plan<E> {
    tasks: Vec<(String, Task<E>)>,
}

impl<E> Default for Plan<E> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<E: Send + 'static> Plan<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task backed by a [`TaskAction`]
    pub fn task(
        mut self,
        name: impl Into<String>,
        dependencies: &[&str],
        action: impl TaskAction<E> + 'static,
    ) -> Self {
        self.tasks
            .push((name.into(), Task::new(dependencies.iter().copied(), action)));
        self
    }

    /// Add a task backed by an async closure
    pub fn step<F, Fut>(mut self, name: impl Into<String>, dependencies: &[&str], func: F) -> Self
    where
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutput, E>> + Send + 'static,
    {
        self.tasks
            .push((name.into(), Task::from_fn(dependencies.iter().copied(), func)));
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Validate the plan into an executable graph
    pub fn build(self) -> Result<TaskGraph<E>, GraphDefinitionError> {
        TaskGraph::new(self.tasks)
    }
}

impl<E> IntoIterator for Plan<E> {
    type Item = (String, Task<E>);
    type IntoIter = std::vec::IntoIter<(String, Task<E>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.tasks.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_declaration_order() {
        let graph = Plan::<anyhow::Error>::new()
            .step("first", &[], |_| async { Ok(TaskOutput::Absent) })
            .step("second", &["first"], |_| async { Ok(TaskOutput::Absent) })
            .build()
            .unwrap();

        assert_eq!(graph.task_names().collect::<Vec<_>>(), ["first", "second"]);
    }

    #[test]
    fn surfaces_definition_errors() {
        let err = Plan::<anyhow::Error>::new()
            .step("only", &["missing"], |_| async { Ok(TaskOutput::Absent) })
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphDefinitionError::UnknownDependency { .. }));
    }
}
