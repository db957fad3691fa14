//! Test utilities for daemon types
//!
//! Provides a scripted [`ProcessChecker`] for coordinator and engine tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::running::{ActiveEmerges, EmergeKind, ProcessChecker};

/// A [`ProcessChecker`] that replays queued snapshots.
///
/// Once the queue is drained the last snapshot repeats. Clones share state,
/// so a test can keep a handle after moving the checker into the engine.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessChecker {
    inner: Arc<Mutex<FakeState>>,
}

#[derive(Debug, Default)]
struct FakeState {
    queue: VecDeque<ActiveEmerges>,
    current: ActiveEmerges,
    calls: usize,
}

impl FakeProcessChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checker that always reports `kinds` as running
    pub fn with_running(kinds: &[EmergeKind]) -> Self {
        let checker = Self::new();
        checker.set(active(kinds));
        checker
    }

    /// Replace the repeating snapshot and clear the queue
    pub fn set(&self, snapshot: ActiveEmerges) {
        let mut state = self.lock();
        state.queue.clear();
        state.current = snapshot;
    }

    /// Queue a snapshot for the next call
    pub fn push(&self, snapshot: ActiveEmerges) {
        self.lock().queue.push_back(snapshot);
    }

    /// Number of times the checker was queried
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProcessChecker for FakeProcessChecker {
    fn running(&mut self) -> ActiveEmerges {
        let mut state = self.lock();
        state.calls += 1;
        if let Some(next) = state.queue.pop_front() {
            state.current = next;
        }
        state.current
    }
}

/// Build a snapshot from a list of kinds
pub fn active(kinds: &[EmergeKind]) -> ActiveEmerges {
    let mut snapshot = ActiveEmerges::default();
    for &kind in kinds {
        snapshot.insert(kind);
    }
    snapshot
}
