//! Memory backpressure.
//!
//! The orchestrator consults a [`MemoryGate`] before starting a run and
//! before adding each built document to the write batch. When the gate
//! reports the ceiling as reached the run suspends with a resume point.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use bulksync_types::MemorySettings;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{debug, warn};

/// One resident-memory sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryReading {
    pub used_bytes: u64,
    pub ceiling_bytes: u64,
}

impl MemoryReading {
    pub fn exceeded(&self) -> bool {
        self.used_bytes >= self.ceiling_bytes
    }
}

/// Resident memory check.
pub trait MemoryGate: Send + Sync {
    /// Current usage against the ceiling, `None` when it cannot be measured.
    fn read(&self) -> Option<MemoryReading>;

    /// Whether the run should suspend now. Unmeasurable usage never suspends.
    fn is_exceeded(&self) -> bool {
        self.read().is_some_and(|r| r.exceeded())
    }
}

/// Gate that never trips.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMemoryLimit;

impl MemoryGate for NoMemoryLimit {
    fn read(&self) -> Option<MemoryReading> {
        None
    }
}

/// Gate reading this process's resident memory through `sysinfo`.
///
/// Refreshing process stats costs a syscall or two, so only every
/// `sample_every`-th check takes a fresh reading; the others reuse the
/// last one.
pub struct ProcessMemoryGate {
    ceiling_bytes: u64,
    pid: Option<Pid>,
    sample_every: usize,
    calls: AtomicUsize,
    state: Mutex<GateState>,
}

struct GateState {
    system: System,
    last: Option<MemoryReading>,
}

impl ProcessMemoryGate {
    /// Gate with an absolute ceiling.
    pub fn with_ceiling(ceiling_bytes: u64) -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                warn!(error = e, "Cannot determine current pid, memory gate disabled");
                None
            }
        };
        Self {
            ceiling_bytes,
            pid,
            sample_every: 1,
            calls: AtomicUsize::new(0),
            state: Mutex::new(GateState {
                system: System::new(),
                last: None,
            }),
        }
    }

    /// Build from settings; an absolute ceiling wins over the percent.
    pub fn from_settings(settings: &MemorySettings) -> Self {
        let ceiling = match settings.ceiling_bytes {
            Some(bytes) => bytes,
            None => {
                let mut system = System::new();
                system.refresh_memory();
                let total = system.total_memory();
                (total as f64 * settings.ceiling_percent / 100.0) as u64
            }
        };
        debug!(ceiling_bytes = ceiling, "Memory ceiling configured");
        Self::with_ceiling(ceiling)
    }

    /// Take a fresh reading only every `n` checks.
    pub fn with_sample_every(mut self, n: usize) -> Self {
        self.sample_every = n.max(1);
        self
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    fn sample(&self, state: &mut GateState) -> Option<MemoryReading> {
        let pid = self.pid?;
        state.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        let used_bytes = state.system.process(pid)?.memory();
        Some(MemoryReading {
            used_bytes,
            ceiling_bytes: self.ceiling_bytes,
        })
    }
}

impl MemoryGate for ProcessMemoryGate {
    fn read(&self) -> Option<MemoryReading> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().ok()?;
        if state.last.is_none() || call % self.sample_every == 0 {
            let reading = self.sample(&mut state);
            state.last = reading;
        }
        state.last
    }
}
