use std::sync::Arc;
use std::sync::Mutex;

use dashmap::DashMap;
use streamwork_common::{ComputationDescriptor, ComputationId, Executor, WorkItemCommitRequest};

/// Per-computation LIFO pool of idle executor/context pairs.
///
/// `acquire`/`release` are the only mutators and both are non-blocking, so
/// callers never park a pool thread waiting on this cache.
pub struct ExecutorCache {
    free_list: Mutex<Vec<Box<dyn Executor>>>,
}

impl ExecutorCache {
    fn new() -> Self {
        ExecutorCache { free_list: Mutex::new(Vec::new()) }
    }

    /// Pops a warm pair, or `None` if the free-list is empty. The caller is
    /// then responsible for creating a fresh one via the executor factory.
    pub fn acquire(&self) -> Option<Box<dyn Executor>> {
        self.free_list.lock().unwrap().pop()
    }

    /// Returns a pair that just completed a successful, restartable
    /// execution. Never called on a failure path.
    pub fn release(&self, pair: Box<dyn Executor>) {
        self.free_list.lock().unwrap().push(pair);
    }

    /// Drains and drops every idle pair, returning how many were closed.
    /// Dropping `Box<dyn Executor>` is the close: the trait carries no
    /// separate teardown method because nothing in the harness needs to
    /// observe a close failing.
    pub fn drain_and_close(&self) -> usize {
        let mut list = self.free_list.lock().unwrap();
        let n = list.len();
        list.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.free_list.lock().unwrap().len()
    }
}

/// Lock-free MPMC FIFO of commit requests awaiting batching, one per
/// computation. Execution actors append; the commit aggregator polls.
pub struct OutputQueue {
    tx: flume::Sender<WorkItemCommitRequest>,
    rx: flume::Receiver<WorkItemCommitRequest>,
}

impl OutputQueue {
    fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        OutputQueue { tx, rx }
    }

    pub fn push(&self, request: WorkItemCommitRequest) {
        // The receiver side is held by this same struct, so send only fails
        // if the queue itself has been torn down, which never happens while
        // the entry is reachable through the registry.
        let _ = self.tx.send(request);
    }

    pub fn try_pop(&self) -> Option<WorkItemCommitRequest> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }
}

/// Everything the registry guarantees is present together for a computation
/// id: its descriptor, its output queue, and its executor free-list.
pub struct ComputationEntry {
    pub descriptor: ComputationDescriptor,
    pub output_queue: OutputQueue,
    pub executor_cache: ExecutorCache,
}

/// Maps a computation id to its descriptor and collaterals.
///
/// `register` is idempotent (first registration for an id wins) and
/// initializes all three collaterals atomically with respect to readers:
/// once `lookup` observes an id, the output queue and executor cache for it
/// are guaranteed present too, because they all live behind one entry in one
/// map.
pub struct ComputationRegistry {
    entries: DashMap<ComputationId, Arc<ComputationEntry>>,
}

impl ComputationRegistry {
    pub fn new() -> Self {
        ComputationRegistry { entries: DashMap::new() }
    }

    /// Registers a descriptor, returning the (possibly pre-existing) entry.
    /// A second registration for the same id is a no-op: the first
    /// descriptor wins, per the open-question resolution in DESIGN.md.
    pub fn register(&self, descriptor: ComputationDescriptor) -> Arc<ComputationEntry> {
        self.entries
            .entry(descriptor.computation_id.clone())
            .or_insert_with(|| {
                Arc::new(ComputationEntry {
                    descriptor,
                    output_queue: OutputQueue::new(),
                    executor_cache: ExecutorCache::new(),
                })
            })
            .clone()
    }

    pub fn lookup(&self, id: &str) -> Option<Arc<ComputationEntry>> {
        self.entries.get(id).map(|e| e.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Snapshot of every known computation id, used by the dispatch loop to
    /// tell the service which computations this worker is assigned to lease
    /// for, and by the commit loop to decide iteration order.
    pub fn known_ids(&self) -> Vec<ComputationId> {
        let mut ids: Vec<ComputationId> = self.entries.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Per-computation `(output queue depth, idle executor count)`, for the
    /// status surface.
    pub fn computation_stats(&self) -> Vec<(ComputationId, usize, usize)> {
        let mut stats: Vec<(ComputationId, usize, usize)> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().output_queue.len(), e.value().executor_cache.len()))
            .collect();
        stats.sort_by(|a, b| a.0.cmp(&b.0));
        stats
    }

    pub fn descriptors(&self) -> Vec<ComputationDescriptor> {
        let mut out: Vec<ComputationDescriptor> =
            self.entries.iter().map(|e| e.value().descriptor.clone()).collect();
        out.sort_by(|a, b| a.computation_id.cmp(&b.computation_id));
        out
    }

    /// Drains and closes every idle executor pair across every computation,
    /// used during shutdown.
    pub fn drain_all_executor_caches(&self) {
        for entry in self.entries.iter() {
            entry.value().executor_cache.drain_and_close();
        }
    }
}

impl Default for ComputationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> ComputationDescriptor {
        ComputationDescriptor { computation_id: id.to_string(), payload: vec![] }
    }

    #[test]
    fn register_is_idempotent_first_wins() {
        let registry = ComputationRegistry::new();
        registry.register(ComputationDescriptor { computation_id: "c1".into(), payload: vec![1] });
        registry.register(ComputationDescriptor { computation_id: "c1".into(), payload: vec![2] });
        let entry = registry.lookup("c1").unwrap();
        assert_eq!(entry.descriptor.payload, vec![1]);
        assert_eq!(registry.known_ids(), vec!["c1".to_string()]);
    }

    #[test]
    fn lookup_guarantees_collaterals_present() {
        let registry = ComputationRegistry::new();
        registry.register(descriptor("c1"));
        let entry = registry.lookup("c1").unwrap();
        assert_eq!(entry.output_queue.len(), 0);
        assert_eq!(entry.executor_cache.len(), 0);
    }

    #[test]
    fn absent_computation_is_absent_everywhere() {
        let registry = ComputationRegistry::new();
        assert!(registry.lookup("nope").is_none());
        assert!(!registry.contains("nope"));
    }

    #[test]
    fn acquire_release_round_trips_free_list_depth() {
        let cache = ExecutorCache::new();
        assert_eq!(cache.len(), 0);
        struct NoopExecutor;
        impl Executor for NoopExecutor {
            fn supports_restart(&self) -> bool {
                true
            }
            fn set_progress_update_period(&mut self, _period: std::time::Duration) {}
            fn bind(
                &mut self,
                _work_item: &streamwork_common::WorkItem,
                _input_watermark_millis: i64,
                _state_fetcher: &dyn streamwork_common::StateFetcher,
            ) -> Result<(), streamwork_common::ExecutorError> {
                Ok(())
            }
            fn execute(
                &mut self,
                _commit: &mut streamwork_common::CommitBuilder,
            ) -> Result<Vec<streamwork_common::RawCounter>, streamwork_common::ExecutorError> {
                Ok(vec![])
            }
        }
        let pair: Box<dyn Executor> = Box::new(NoopExecutor);
        cache.release(pair);
        assert_eq!(cache.len(), 1);
        let pair = cache.acquire().unwrap();
        assert_eq!(cache.len(), 0);
        cache.release(pair);
        assert_eq!(cache.len(), 1);
    }
}
