use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for interception activity
#[derive(Debug, Default)]
pub struct BreakpointStats {
    pub evaluated: AtomicU64,
    pub matched: AtomicU64,
    pub held: AtomicU64,
    pub forwarded: AtomicU64,
    pub dropped: AtomicU64,
    pub predicate_failures: AtomicU64,
    pub ui_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub evaluated: u64,
    pub matched: u64,
    pub held: u64,
    pub forwarded: u64,
    pub dropped: u64,
    pub predicate_failures: u64,
    pub ui_failures: u64,
}

impl BreakpointStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            evaluated: self.evaluated.load(Ordering::Relaxed),
            matched: self.matched.load(Ordering::Relaxed),
            held: self.held.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            predicate_failures: self.predicate_failures.load(Ordering::Relaxed),
            ui_failures: self.ui_failures.load(Ordering::Relaxed),
        }
    }
}
