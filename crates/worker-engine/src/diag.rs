use std::sync::Mutex;
use std::thread::ThreadId;

use base64::Engine as _;
use dashmap::DashMap;

/// Single mutable slot holding the most recent non-retryable-classification
/// failure, surfaced on the status page. Single-writer-last-wins: whichever
/// execution thread fails most recently overwrites it, no ordering promised
/// across threads.
#[derive(Default)]
pub struct LastExceptionCell {
    inner: Mutex<Option<String>>,
}

impl LastExceptionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, message: String) {
        *self.inner.lock().unwrap() = Some(message);
    }

    pub fn get(&self) -> Option<String> {
        self.inner.lock().unwrap().clone()
    }
}

/// Registry of what each pool thread is currently bound to, backing the
/// `/threadz` status route. Rust has no safe API to dump another thread's
/// call stack, so this substitutes the engine's own notion of "what is this
/// thread doing" — the computation/key/work-token it is currently bound to —
/// for the per-thread stack trace the source dumps.
#[derive(Default)]
pub struct ThreadRoster {
    entries: DashMap<ThreadId, String>,
}

impl ThreadRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<(ThreadId, String)> {
        self.entries.iter().map(|e| (*e.key(), e.value().clone())).collect()
    }
}

/// Marks this thread as bound to a work item for the duration of its scope,
/// clearing the marker via `Drop` so a panic mid-execution still clears it.
pub struct DiagGuard<'a> {
    roster: &'a ThreadRoster,
    thread_id: ThreadId,
}

impl<'a> DiagGuard<'a> {
    pub fn enter(roster: &'a ThreadRoster, computation_id: &str, key: &[u8], work_token: i64) -> Self {
        let thread_id = std::thread::current().id();
        let key_b64 = base64::engine::general_purpose::STANDARD.encode(key);
        roster.entries.insert(
            thread_id,
            format!("executing computation={computation_id} key={key_b64} work_token={work_token}"),
        );
        DiagGuard { roster, thread_id }
    }
}

impl Drop for DiagGuard<'_> {
    fn drop(&mut self) {
        self.roster.entries.remove(&self.thread_id);
    }
}
