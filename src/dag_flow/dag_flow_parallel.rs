use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::time::Instant;
use tracing::{debug, info};

use super::dag_flow::{ResultContext, RunState};
use crate::core::errors::DagError;

/// Executes the graph with up to `max_parallel` ready tasks in flight.
///
/// Tasks are polled cooperatively on the caller's task; the run state is only
/// touched between polls, so each completion is committed in isolation. After
/// the first failure nothing new is started; tasks already running are allowed
/// to finish and the error of the earliest-started failing task is returned.
pub(super) async fn execute_parallel<E>(
    mut state: RunState<'_, E>,
    max_parallel: usize,
) -> Result<ResultContext, E>
where
    E: From<DagError> + fmt::Display + Send + 'static,
{
    let max_parallel = max_parallel.max(1);
    let mut in_flight = FuturesUnordered::new();
    let mut launched: u64 = 0;
    let mut first_failure: Option<(u64, E)> = None;

    loop {
        if first_failure.is_none() {
            for index in state.ready() {
                if in_flight.len() >= max_parallel {
                    break;
                }
                let (action, dependencies) = state.start(index);
                let sequence = launched;
                launched += 1;
                in_flight.push(async move {
                    let started = Instant::now();
                    let result = action.run(dependencies).await;
                    (index, sequence, started, result)
                });
            }
            debug!(
                run_id = %state.run_id(),
                active_tasks = in_flight.len(),
                "Launched ready tasks"
            );
        }

        let Some((index, sequence, started, result)) = in_flight.next().await else {
            break;
        };

        match result {
            Ok(output) => state.complete(index, output, started),
            Err(err) => {
                state.fail(index, &err);
                let earlier = first_failure
                    .as_ref()
                    .is_some_and(|(seen, _)| *seen < sequence);
                if !earlier {
                    first_failure = Some((sequence, err));
                }
            }
        }
    }

    if let Some((_, err)) = first_failure {
        let completed = state.completed();
        state.finish(false);
        info!(completed, "Run aborted");
        return Err(err);
    }

    debug_assert!(state.is_finished(), "validated graph left tasks unstarted");
    info!(completed = state.completed(), "Run complete");
    Ok(state.finish(true))
}
