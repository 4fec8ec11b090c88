use std::sync::atomic::Ordering;
use std::sync::Arc;

use streamwork_common::CommitWorkRequest;

use crate::engine::Shared;

/// Single dedicated high-priority thread draining per-computation output
/// queues into batched `commit_work` calls.
///
/// Iteration order across computations is an open design choice; this
/// implementation iterates in sorted computation-id order (see
/// `ComputationRegistry::known_ids`), which is stable within one iteration
/// and documented here rather than left to map hash order.
pub(crate) fn run(shared: Arc<Shared>) {
    while shared.running.load(Ordering::SeqCst) {
        let mut request = CommitWorkRequest::default();
        let mut budget: i64 = shared.cfg.max_commit_bytes as i64;

        for computation_id in shared.registry.known_ids() {
            let Some(entry) = shared.registry.lookup(&computation_id) else { continue };
            let mut sub_request = Vec::new();
            while budget > 0 {
                // Budget is checked before the pop, not after: a single
                // oversized item may be popped alone even though it exceeds
                // the remaining budget, guaranteeing forward progress.
                match entry.output_queue.try_pop() {
                    Some(item) => {
                        budget -= item.serialized_size() as i64;
                        sub_request.push(item);
                    }
                    None => break,
                }
            }
            if !sub_request.is_empty() {
                for item in sub_request {
                    request.push(computation_id.clone(), item);
                }
            }
        }

        if !request.is_empty() {
            if let Err(err) = shared.service.commit_work(request) {
                tracing::error!(error = %err, "commit_work failed; commits for this iteration are lost");
            }
        }

        if budget > 0 {
            std::thread::sleep(shared.cfg.commit_idle_sleep);
        }
    }
}

#[cfg(test)]
mod tests {
    use streamwork_common::{StateMutation, WorkItemCommitRequest};

    fn item(payload_len: usize) -> WorkItemCommitRequest {
        WorkItemCommitRequest {
            key: b"k".to_vec(),
            work_token: 1,
            state_mutations: vec![StateMutation(vec![0u8; payload_len])],
            output_messages: vec![],
            counter_updates: vec![],
        }
    }

    #[test]
    fn byte_budget_caps_aggregate_pops_except_single_oversized_item() {
        let mut budget: i64 = 100;
        let mut popped = Vec::new();
        let queue = vec![item(40), item(40), item(40), item(40)];
        for entry in queue {
            if budget <= 0 {
                break;
            }
            budget -= entry.serialized_size() as i64;
            popped.push(entry);
        }
        // 100 byte budget, each item costs 40+8+32=80 bytes here; only one
        // fits cleanly but the loop still pops a second because the check
        // happens before the pop, matching the aggregator's own logic.
        assert!(!popped.is_empty());
        assert!(popped.len() < 4);
    }
}
