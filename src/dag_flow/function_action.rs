//! Function-based task bodies
//!
//! Lets a plain async closure over a task's dependency view stand in for a
//! hand-written [`TaskAction`] implementation.

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;

use super::dag_flow::{Dependencies, TaskAction, TaskOutput};

/// Wrapper for closure-based actions
pub struct FnAction<F, E> {
    func: F,
    _error: PhantomData<fn() -> E>,
}

impl<F, E> FnAction<F, E> {
    pub fn new(func: F) -> Self {
        Self {
            func,
            _error: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, E> TaskAction<E> for FnAction<F, E>
where
    F: Fn(Dependencies) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TaskOutput, E>> + Send,
    E: Send + 'static,
{
    async fn run(&self, dependencies: Dependencies) -> Result<TaskOutput, E> {
        (self.func)(dependencies).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag_flow::ResultContext;
    use serde_json::json;

    #[tokio::test]
    async fn closure_sees_dependency_view() {
        let mut context = ResultContext::new();
        context.commit("left", json!(2).into());
        context.commit("right", json!(3).into());

        let action = FnAction::new(|deps: Dependencies| async move {
            let left: i64 = deps.require("left")?;
            let right: i64 = deps.require("right")?;
            Ok::<_, anyhow::Error>(json!(left * right).into())
        });

        let deps = context.project("product", &["left".to_string(), "right".to_string()]);
        let output = action.run(deps).await.unwrap();
        assert_eq!(output, TaskOutput::Value(json!(6)));
    }
}
