use streamwork_common::{ClientId, ComputationDescriptor, ComputationId};

use crate::engine::Shared;
use crate::memory::MemoryUsage;

/// Pool introspection surfaced on the status page.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    pub pool_size: usize,
    pub active_count: usize,
    pub queue_depth: usize,
}

/// Everything the default status HTML route renders, plus what `/healthz`
/// and `/threadz` need. Built fresh on every request; nothing here is
/// cached, since every field is already backed by a lock-free or
/// near-lock-free read.
/// Per-computation introspection: output queue depth and idle executor
/// count, for the status page's per-computation table.
#[derive(Debug, Clone)]
pub struct ComputationStats {
    pub computation_id: ComputationId,
    pub output_queue_depth: usize,
    pub idle_executors: usize,
}

#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub running: bool,
    pub client_id: ClientId,
    pub pool: PoolStats,
    pub computations: Vec<ComputationStats>,
    pub memory: MemoryUsage,
    pub last_exception: Option<String>,
    pub descriptors: Vec<ComputationDescriptor>,
    pub threads: Vec<(String, String)>,
}

pub(crate) fn build_snapshot(shared: &Shared) -> StatusSnapshot {
    StatusSnapshot {
        running: shared.running.load(std::sync::atomic::Ordering::SeqCst),
        client_id: shared.client_id,
        pool: PoolStats {
            pool_size: shared.pool.pool_size(),
            active_count: shared.pool.active_count(),
            queue_depth: shared.pool.queue_depth(),
        },
        computations: shared
            .registry
            .computation_stats()
            .into_iter()
            .map(|(computation_id, output_queue_depth, idle_executors)| ComputationStats {
                computation_id,
                output_queue_depth,
                idle_executors,
            })
            .collect(),
        memory: shared.memory_gate.usage(),
        last_exception: shared.last_exception.get(),
        descriptors: shared.registry.descriptors(),
        threads: shared
            .thread_roster
            .snapshot()
            .into_iter()
            .map(|(id, desc)| (format!("{id:?}"), desc))
            .collect(),
    }
}
