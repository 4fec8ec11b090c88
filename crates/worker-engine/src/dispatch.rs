use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use crate::engine::Shared;

/// Single dedicated low-priority thread driving leasing and submission.
/// Scheduling priority is a platform-specific affordance this implementation
/// does not set explicitly; see DESIGN.md.
pub(crate) fn run(shared: Arc<Shared>) {
    let mut backoff = shared.cfg.lease_backoff_initial;
    let mut last_pushback_log: Option<Instant> = None;

    while shared.running.load(Ordering::SeqCst) {
        if shared.memory_gate.is_pushback() {
            if last_pushback_log.map(|t| t.elapsed() >= shared.cfg.memory_pushback_log_throttle).unwrap_or(true) {
                tracing::warn!("memory pushback engaged; deferring new leases");
                last_pushback_log = Some(Instant::now());
            }
            std::thread::sleep(shared.cfg.memory_pushback_poll);
            continue;
        }

        match shared.service.get_work(shared.client_id, shared.cfg.max_items_per_lease) {
            Ok(batches) if !batches.is_empty() => {
                backoff = shared.cfg.lease_backoff_initial;
                for batch in batches {
                    dispatch_batch(&shared, batch);
                }
            }
            Ok(_) => {
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(shared.cfg.lease_backoff_cap);
            }
            Err(err) => {
                tracing::warn!(error = %err, "get_work failed; backing off");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(shared.cfg.lease_backoff_cap);
            }
        }
    }
}

fn dispatch_batch(shared: &Arc<Shared>, batch: streamwork_common::ComputationWorkItems) {
    let computation_id = batch.computation_id;

    if !shared.registry.contains(&computation_id) {
        match shared.service.get_config(std::slice::from_ref(&computation_id)) {
            Ok(descriptors) if !descriptors.is_empty() => {
                for descriptor in descriptors {
                    shared.registry.register(descriptor);
                }
            }
            Ok(_) => {
                tracing::warn!(computation_id = %computation_id, "get_config returned no descriptor; dropping batch");
                return;
            }
            Err(err) => {
                tracing::warn!(computation_id = %computation_id, error = %err, "get_config failed; dropping batch");
                return;
            }
        }
    }

    // Watermarks arrive in microseconds; the internal time unit is
    // milliseconds, via truncating (floor) division.
    let input_watermark_millis = batch.input_data_watermark_micros / 1_000;

    for work_item in batch.work_items {
        let shared_for_task = shared.clone();
        let computation_id_for_task = computation_id.clone();
        let work_token = work_item.work_token;
        let submitted = shared.pool.execute(move || {
            crate::item::execute_work_item(&shared_for_task, computation_id_for_task, input_watermark_millis, work_item);
        });
        if submitted.is_err() {
            // Dropped silently: the lease will simply expire at the service
            // and be re-handed out.
            tracing::debug!(computation_id = %computation_id, work_token, "admission queue full; dropping lease locally");
        }
    }
}
