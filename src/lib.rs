//! Paidflow - run named, interdependent async steps as a validated task graph.
//!
//! The [`dag_flow`] module holds the generic executor; [`services`] builds the
//! paid service flow (list, choose, request, optionally pay) on top of it.

// Core infrastructure modules
pub mod core;

pub mod dag_flow;
pub mod logging;
pub mod services;

// Re-exports for convenience
pub use crate::core::config::DagConfig;
pub use crate::core::errors::{
    CapabilityError, DagError, GraphDefinitionError, PaidServiceError, ValidationError,
};
pub use dag_flow::{
    DagExecutor, Dependencies, Plan, ResultContext, Task, TaskAction, TaskGraph, TaskOutput,
};
pub use logging::{init_tracing, TracingLogger};
pub use services::{use_paid_service, use_paid_service_with, PaidServiceArgs};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_diamond_graph() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = |deps: &[&str], value: i64| {
            let calls = calls.clone();
            Task::from_fn(deps.iter().copied(), move |_| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(json!(value).into())
                }
            })
        };

        let executor = DagExecutor::default();
        let context = executor
            .execute(vec![
                ("root", counted(&[], 1)),
                ("left", counted(&["root"], 2)),
                ("right", counted(&["root"], 3)),
                ("join", counted(&["left", "right"], 4)),
            ])
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(
            context.task_names().collect::<Vec<_>>(),
            ["join", "left", "right", "root"]
        );
        assert_eq!(context.value("join"), Some(&json!(4)));
    }
}
