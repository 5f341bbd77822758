//! Global "break on everything" switches
//!
//! Read on every intercepted message without locking. A toggle racing with
//! an evaluation may or may not be seen by it.

use crate::message::Direction;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct BreakModes {
    break_on_all_requests: AtomicBool,
    break_on_all_responses: AtomicBool,
    stepping: AtomicBool,
}

/// Point-in-time copy of the switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakModesSnapshot {
    pub break_on_all_requests: bool,
    pub break_on_all_responses: bool,
    pub stepping: bool,
}

impl BreakModes {
    pub fn new(break_on_all_requests: bool, break_on_all_responses: bool) -> Self {
        Self {
            break_on_all_requests: AtomicBool::new(break_on_all_requests),
            break_on_all_responses: AtomicBool::new(break_on_all_responses),
            stepping: AtomicBool::new(false),
        }
    }

    pub fn break_on_all_requests(&self) -> bool {
        self.break_on_all_requests.load(Ordering::Acquire)
    }

    pub fn set_break_on_all_requests(&self, enabled: bool) {
        self.break_on_all_requests.store(enabled, Ordering::Release);
    }

    pub fn break_on_all_responses(&self) -> bool {
        self.break_on_all_responses.load(Ordering::Acquire)
    }

    pub fn set_break_on_all_responses(&self, enabled: bool) {
        self.break_on_all_responses.store(enabled, Ordering::Release);
    }

    pub fn is_stepping(&self) -> bool {
        self.stepping.load(Ordering::Acquire)
    }

    pub fn set_stepping(&self, enabled: bool) {
        self.stepping.store(enabled, Ordering::Release);
    }

    /// Break-all flag for the given direction
    pub fn breaks_on_all(&self, direction: Direction) -> bool {
        match direction {
            Direction::Request => self.break_on_all_requests(),
            Direction::Response => self.break_on_all_responses(),
        }
    }

    /// True when a global switch alone makes this direction a breakpoint
    pub fn forces_break(&self, direction: Direction) -> bool {
        self.breaks_on_all(direction) || self.is_stepping()
    }

    pub fn snapshot(&self) -> BreakModesSnapshot {
        BreakModesSnapshot {
            break_on_all_requests: self.break_on_all_requests(),
            break_on_all_responses: self.break_on_all_responses(),
            stepping: self.is_stepping(),
        }
    }
}
