use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A unit of work submitted to the pool: runs once on whichever thread picks
/// it up.
type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum PoolSubmitError {
    #[error("bounded admission queue is full")]
    QueueFull,
}

struct PoolState {
    thread_count: AtomicUsize,
    idle_count: AtomicUsize,
}

/// Fixed-capacity worker pool with a bounded admission queue and a second,
/// unbounded channel reserved for the retry path.
///
/// Threads are spawned on demand (up to `max_workers`) rather than all at
/// startup, and exit after sitting idle for `idle_expiration`; a later
/// submission simply spawns a replacement. This gives the "up to N workers,
/// idle ones reclaimed after 60s" contract without a separate reaper thread.
pub struct BoundedWorkPool {
    max_workers: usize,
    idle_expiration: Duration,
    bounded_tx: flume::Sender<Task>,
    bounded_rx: flume::Receiver<Task>,
    force_tx: flume::Sender<Task>,
    force_rx: flume::Receiver<Task>,
    state: Arc<PoolState>,
}

impl BoundedWorkPool {
    pub fn new(max_workers: usize, max_queue: usize, idle_expiration: Duration) -> Self {
        let (bounded_tx, bounded_rx) = flume::bounded(max_queue);
        let (force_tx, force_rx) = flume::unbounded();
        BoundedWorkPool {
            max_workers,
            idle_expiration,
            bounded_tx,
            bounded_rx,
            force_tx,
            force_rx,
            state: Arc::new(PoolState { thread_count: AtomicUsize::new(0), idle_count: AtomicUsize::new(0) }),
        }
    }

    /// Queue-bounded submission: used by the dispatch loop. Refuses
    /// admission synchronously when the bounded queue is full rather than
    /// blocking, so the dispatch loop can drop the lease and move on.
    pub fn execute<F>(&self, task: F) -> Result<(), PoolSubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.maybe_spawn_thread();
        self.bounded_tx
            .try_send(Box::new(task))
            .map_err(|_| PoolSubmitError::QueueFull)
    }

    /// Unbounded submission: used exclusively by the retry path so a retry
    /// can never be lost to a full queue.
    pub fn force_execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.maybe_spawn_thread();
        // The force channel is unbounded and never torn down while the pool
        // lives, so send cannot fail in practice.
        let _ = self.force_tx.send(Box::new(task));
    }

    fn maybe_spawn_thread(&self) {
        if self.state.idle_count.load(Ordering::SeqCst) > 0 {
            return;
        }
        let mut count = self.state.thread_count.load(Ordering::SeqCst);
        loop {
            if count >= self.max_workers {
                return;
            }
            match self.state.thread_count.compare_exchange_weak(
                count,
                count + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => count = observed,
            }
        }
        self.spawn_worker_thread();
    }

    fn spawn_worker_thread(&self) {
        let bounded_rx = self.bounded_rx.clone();
        let force_rx = self.force_rx.clone();
        let state = self.state.clone();
        let idle_expiration = self.idle_expiration;
        std::thread::spawn(move || {
            state.idle_count.fetch_add(1, Ordering::SeqCst);
            loop {
                // The retry path must never starve behind a saturated
                // bounded queue, so force tasks are drained first whenever
                // both are ready.
                let task = match force_rx.try_recv() {
                    Ok(task) => Some(task),
                    Err(flume::TryRecvError::Empty) => {
                        let sel = flume::Selector::new()
                            .recv(&force_rx, |r| r.ok())
                            .recv(&bounded_rx, |r| r.ok());
                        sel.wait_timeout(idle_expiration).ok().flatten()
                    }
                    Err(flume::TryRecvError::Disconnected) => None,
                };
                match task {
                    Some(task) => {
                        state.idle_count.fetch_sub(1, Ordering::SeqCst);
                        // A task panicking (e.g. the restart-support assertion
                        // in the per-item executor) must take the whole
                        // process down, not just this one pool thread: the
                        // default unwind would otherwise leave the pool
                        // silently short a worker while everything else kept
                        // running. catch_unwind lets us log before aborting.
                        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
                            tracing::error!("pool task panicked; aborting process");
                            std::process::abort();
                        }
                        state.idle_count.fetch_add(1, Ordering::SeqCst);
                    }
                    None => break,
                }
            }
            state.idle_count.fetch_sub(1, Ordering::SeqCst);
            state.thread_count.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn pool_size(&self) -> usize {
        self.state.thread_count.load(Ordering::SeqCst)
    }

    pub fn active_count(&self) -> usize {
        self.pool_size().saturating_sub(self.state.idle_count.load(Ordering::SeqCst))
    }

    pub fn queue_depth(&self) -> usize {
        self.bounded_tx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    #[test]
    fn execute_runs_submitted_tasks() {
        let pool = BoundedWorkPool::new(4, 4, Duration::from_millis(200));
        let (tx, rx) = flume::unbounded::<u32>();
        for i in 0..8 {
            loop {
                let tx = tx.clone();
                if pool.execute(move || { let _ = tx.send(i); }).is_ok() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        let mut seen = Vec::new();
        for _ in 0..8 {
            seen.push(rx.recv_timeout(Duration::from_secs(2)).unwrap());
        }
        seen.sort();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn execute_refuses_when_queue_full() {
        let pool = BoundedWorkPool::new(1, 1, Duration::from_secs(60));
        let gate = Arc::new((Mutex::new(()), std::sync::Condvar::new()));
        let gate_clone = gate.clone();
        // Occupy the single worker thread so the queue can fill up.
        pool.execute(move || {
            let (lock, cvar) = &*gate_clone;
            let guard = lock.lock().unwrap();
            let _ = cvar.wait_timeout(guard, Duration::from_secs(2));
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        pool.execute(|| {}).unwrap();
        let result = pool.execute(|| {});
        assert!(matches!(result, Err(PoolSubmitError::QueueFull)));
        let (_lock, cvar) = &*gate;
        cvar.notify_all();
    }

    #[test]
    fn force_execute_bypasses_full_queue() {
        let pool = BoundedWorkPool::new(2, 1, Duration::from_secs(60));
        let gate = Arc::new((Mutex::new(()), std::sync::Condvar::new()));
        let gate_clone = gate.clone();
        pool.execute(move || {
            let (lock, cvar) = &*gate_clone;
            let guard = lock.lock().unwrap();
            let _ = cvar.wait_timeout(guard, Duration::from_secs(2));
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        pool.execute(|| {}).unwrap();
        let ran = Arc::new(AtomicU32::new(0));
        let ran_clone = ran.clone();
        pool.force_execute(move || {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        });
        let (_lock, cvar) = &*gate;
        cvar.notify_all();
        for _ in 0..200 {
            if ran.load(Ordering::SeqCst) == 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
