use std::time::Duration;

/// Tunable constants governing the engine's hot-path behavior.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_workers: usize,
    pub thread_idle_expiration: Duration,
    pub max_queue: usize,
    pub max_commit_bytes: usize,
    pub pushback_ratio: f64,
    pub lease_backoff_initial: Duration,
    pub lease_backoff_cap: Duration,
    pub max_items_per_lease: usize,
    pub retry_debounce: Duration,
    pub memory_pushback_log_throttle: Duration,
    pub shutdown_grace: Duration,
    pub commit_idle_sleep: Duration,
    pub memory_pushback_poll: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_workers: 100,
            thread_idle_expiration: Duration::from_secs(60),
            max_queue: 100,
            max_commit_bytes: 32 * 1024 * 1024,
            pushback_ratio: 0.9,
            lease_backoff_initial: Duration::from_millis(1),
            lease_backoff_cap: Duration::from_millis(1000),
            max_items_per_lease: 100,
            retry_debounce: Duration::from_secs(10),
            memory_pushback_log_throttle: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5 * 60),
            commit_idle_sleep: Duration::from_millis(100),
            memory_pushback_poll: Duration::from_millis(10),
        }
    }
}
