use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use streamwork_common::{ClientId, ComputationDescriptor, ExecutorFactory, StateFetcher, WorkService};

use crate::config::EngineConfig;
use crate::diag::{LastExceptionCell, ThreadRoster};
use crate::memory::MemoryGate;
use crate::pool::BoundedWorkPool;
use crate::registry::ComputationRegistry;
use crate::status::StatusSnapshot;

/// Everything the dispatch loop, commit loop, and per-item executions share.
/// Held behind one `Arc` and cloned into each actor/task; nothing here is
/// mutated except through the interior-mutable collaborators it wraps (the
/// registry's maps, the pool's queues, the last-exception cell), so no actor
/// ever holds a lock across a suspension point.
pub(crate) struct Shared {
    pub(crate) cfg: EngineConfig,
    pub(crate) client_id: ClientId,
    pub(crate) registry: Arc<ComputationRegistry>,
    pub(crate) factory: Arc<dyn ExecutorFactory>,
    pub(crate) service: Arc<dyn WorkService>,
    pub(crate) state_fetcher: Arc<dyn StateFetcher>,
    pub(crate) pool: Arc<BoundedWorkPool>,
    pub(crate) memory_gate: MemoryGate,
    pub(crate) last_exception: LastExceptionCell,
    pub(crate) thread_roster: ThreadRoster,
    pub(crate) running: AtomicBool,
}

/// The running worker harness: dispatch loop, commit loop, bounded pool, and
/// their shared state, wired together. Construct with [`Engine::start`]
/// and tear down with [`Engine::stop`].
pub struct Engine {
    shared: Arc<Shared>,
    dispatch_thread: Option<JoinHandle<()>>,
    commit_thread: Option<JoinHandle<()>>,
}

impl Engine {
    /// Starts the dispatch and commit loops. `startup_descriptors` are
    /// pre-registered before either loop runs, for computations named on the
    /// command line.
    pub fn start(
        cfg: EngineConfig,
        factory: Arc<dyn ExecutorFactory>,
        service: Arc<dyn WorkService>,
        state_fetcher: Arc<dyn StateFetcher>,
        startup_descriptors: Vec<ComputationDescriptor>,
    ) -> Self {
        let registry = Arc::new(ComputationRegistry::new());
        for descriptor in startup_descriptors {
            registry.register(descriptor);
        }

        let pool = Arc::new(BoundedWorkPool::new(cfg.max_workers, cfg.max_queue, cfg.thread_idle_expiration));
        let memory_gate = MemoryGate::new(cfg.pushback_ratio);

        let shared = Arc::new(Shared {
            client_id: ClientId::random(),
            registry,
            factory,
            service,
            state_fetcher,
            pool,
            memory_gate,
            last_exception: LastExceptionCell::new(),
            thread_roster: ThreadRoster::new(),
            running: AtomicBool::new(true),
            cfg,
        });

        let dispatch_shared = shared.clone();
        let dispatch_thread = std::thread::Builder::new()
            .name("dispatch".to_string())
            .spawn(move || crate::dispatch::run(dispatch_shared))
            .expect("failed to spawn dispatch thread");

        let commit_shared = shared.clone();
        let commit_thread = std::thread::Builder::new()
            .name("commit".to_string())
            .spawn(move || crate::commit::run(commit_shared))
            .expect("failed to spawn commit thread");

        Engine { shared, dispatch_thread: Some(dispatch_thread), commit_thread: Some(commit_thread) }
    }

    pub fn client_id(&self) -> ClientId {
        self.shared.client_id
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        crate::status::build_snapshot(&self.shared)
    }

    /// A cheap, `Clone`-able, `Send + Sync` handle exposing only status
    /// introspection — decoupled from the join handles `stop` needs, so it
    /// can be shared freely with the status HTTP server (e.g. as `axum`
    /// state) while the engine itself stays singly-owned for shutdown.
    pub fn handle(&self) -> EngineHandle {
        EngineHandle { shared: self.shared.clone() }
    }

    /// Performs the shutdown sequence: clear the running flag, join the
    /// dispatch thread, drain the bounded pool (bounded by `shutdown_grace`,
    /// a hard error past that), close every idle executor, then join the
    /// commit thread.
    ///
    /// In-flight work at shutdown may not be committed; the service will
    /// re-lease it. This does not stop the status HTTP server — that is the
    /// caller's responsibility, since the engine has no HTTP dependency.
    pub fn stop(mut self) {
        self.shared.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.dispatch_thread.take() {
            let _ = handle.join();
        }

        let deadline = std::time::Instant::now() + self.shared.cfg.shutdown_grace;
        while self.shared.pool.active_count() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        if self.shared.pool.active_count() > 0 {
            panic!("bounded work pool failed to drain within shutdown grace period");
        }

        self.shared.registry.drain_all_executor_caches();

        if let Some(handle) = self.commit_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
    }
}

/// A cloneable, read-only view onto a running [`Engine`]'s status
/// introspection. See [`Engine::handle`].
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
}

impl EngineHandle {
    pub fn status_snapshot(&self) -> StatusSnapshot {
        crate::status::build_snapshot(&self.shared)
    }
}
