use std::sync::Mutex;

use sysinfo::{MemoryRefreshKind, Pid, ProcessRefreshKind, RefreshKind, System};

/// A snapshot of the memory-pressure figures the status page reports.
#[derive(Debug, Clone, Copy)]
pub struct MemoryUsage {
    pub used_bytes: u64,
    pub max_bytes: u64,
    pub total_bytes: u64,
}

/// Memory-pressure gate for the dispatch loop.
///
/// There is no managed heap to measure in a native binary, so this
/// substitutes this process's resident set size against the system's total
/// memory as "used" and "max" — a monotone measure of memory pressure
/// relative to a ceiling. There is no garbage collector to hint at pushback
/// time, so that step is simply dropped; see DESIGN.md.
pub struct MemoryGate {
    pushback_ratio: f64,
    pid: Pid,
    sys: Mutex<System>,
}

impl MemoryGate {
    pub fn new(pushback_ratio: f64) -> Self {
        let pid = Pid::from_u32(std::process::id());
        let sys = System::new_with_specifics(
            RefreshKind::nothing()
                .with_memory(MemoryRefreshKind::nothing().with_ram())
                .with_processes(ProcessRefreshKind::nothing().with_memory()),
        );
        MemoryGate { pushback_ratio, pid, sys: Mutex::new(sys) }
    }

    pub fn usage(&self) -> MemoryUsage {
        let mut sys = self.sys.lock().unwrap();
        sys.refresh_memory();
        sys.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[self.pid]), true);
        let used_bytes = sys.process(self.pid).map(|p| p.memory()).unwrap_or(0);
        let total_bytes = sys.total_memory();
        MemoryUsage { used_bytes, max_bytes: total_bytes, total_bytes }
    }

    /// Whether the gate is currently engaged: `used > pushback_ratio * max`.
    pub fn is_pushback(&self) -> bool {
        let usage = self.usage();
        if usage.max_bytes == 0 {
            return false;
        }
        usage.used_bytes as f64 > self.pushback_ratio * usage.max_bytes as f64
    }
}
