//! Progress reporting and cooperative cancellation

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Reconciliation phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    /// Not started
    #[default]
    Idle,
    /// Creating entries from the rename map
    Rename,
    /// Fingerprinting and patching entries
    Patch,
    /// Removing entries without a store record
    Prune,
    /// Persisting the archive
    Commit,
    /// Finished
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Rename => "rename",
            Phase::Patch => "patch",
            Phase::Prune => "prune",
            Phase::Commit => "commit",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    /// Current phase
    pub phase: Phase,
    /// Items finished in this phase
    pub completed: usize,
    /// Items in this phase
    pub total: usize,
    /// Last item finished
    pub current: String,
}

/// Callback invoked with a snapshot after each entry and at phase changes
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Shared progress counters
///
/// Updated only by the thread collecting entry results; any thread may read
/// a snapshot at any time.
#[derive(Debug, Default)]
pub struct Progress {
    phase: Mutex<Phase>,
    completed: AtomicUsize,
    total: AtomicUsize,
    current: Mutex<String>,
}

impl Progress {
    /// Create idle progress
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&self, phase: Phase, total: usize) -> ProgressSnapshot {
        *self.phase.lock() = phase;
        self.total.store(total, Ordering::Release);
        self.completed.store(0, Ordering::Release);
        self.current.lock().clear();
        self.snapshot()
    }

    pub(crate) fn advance(&self, current: &str) -> ProgressSnapshot {
        self.completed.fetch_add(1, Ordering::AcqRel);
        {
            let mut label = self.current.lock();
            label.clear();
            label.push_str(current);
        }
        self.snapshot()
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// Items finished in the current phase
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Items in the current phase
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Take a snapshot
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            phase: self.phase(),
            completed: self.completed(),
            total: self.total(),
            current: self.current.lock().clone(),
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a run
///
/// Workers check it between entries; entries already in flight finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create an unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
