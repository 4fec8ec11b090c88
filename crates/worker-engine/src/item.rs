use std::sync::Arc;
use std::time::Duration;

use streamwork_common::{CommitBuilder, ComputationId, WorkItem};

use crate::diag::DiagGuard;
use crate::engine::Shared;

/// Binds a work item to an executor, runs it, and either appends a commit
/// request to the computation's output queue or hands the failure off to
/// the failure reporter.
///
/// Invoked on a pool thread; blocks that thread for the execution's
/// duration, and again inside the failure reporter's retry debounce sleep if
/// this call ends in a retryable failure.
pub(crate) fn execute_work_item(
    shared: &Arc<Shared>,
    computation_id: ComputationId,
    input_watermark_millis: i64,
    work_item: WorkItem,
) {
    let _diag = DiagGuard::enter(&shared.thread_roster, &computation_id, &work_item.key, work_item.work_token);

    let Some(entry) = shared.registry.lookup(&computation_id) else {
        // The descriptor arrives with the next lease; nothing to retry.
        tracing::warn!(computation_id = %computation_id, "unknown computation at execution time; dropping item");
        return;
    };

    let mut commit = CommitBuilder::new(work_item.key.clone(), work_item.work_token);

    let mut executor = match entry.executor_cache.acquire() {
        Some(executor) => executor,
        None => match shared.factory.create(&entry.descriptor, shared.state_fetcher.clone()) {
            Ok(mut executor) => {
                assert!(
                    executor.supports_restart(),
                    "freshly created executor for computation {computation_id} does not support restart"
                );
                // A freshly created executor always starts with progress
                // updates disabled until a real work item is bound.
                executor.set_progress_update_period(Duration::ZERO);
                executor
            }
            Err(err) => {
                tracing::error!(computation_id = %computation_id, error = %err, "executor construction failed");
                crate::failure::handle_failure(shared, computation_id, input_watermark_millis, work_item, err);
                return;
            }
        },
    };

    let result = executor
        .bind(&work_item, input_watermark_millis, shared.state_fetcher.as_ref())
        .and_then(|()| executor.execute(&mut commit));

    match result {
        Ok(raw_counters) => {
            let counters = crate::counters::translate_counters(raw_counters);
            let commit_request = commit.into_commit_request(counters);
            entry.output_queue.push(commit_request);
            entry.executor_cache.release(executor);
        }
        Err(err) => {
            // Never release an executor that failed binding or execution.
            drop(executor);
            crate::failure::handle_failure(shared, computation_id, input_watermark_millis, work_item, err);
        }
    }
}
