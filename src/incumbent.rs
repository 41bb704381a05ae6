//! Shared incumbent: the best mapping length found so far, visible to all
//! worker threads.
//!
//! Only the *length* is shared on the hot path, as a single atomic word, so
//! pruning reads never contend on a lock. Each worker keeps its own copy of
//! its best mapping and publishes it into a mutex-guarded slot exactly once,
//! when it finishes; the winning mapping is reconstructed at the end by
//! picking any published mapping whose length equals the global maximum.
//! A worker always updates its local copy before raising the global length,
//! so the maximum is guaranteed to have a matching slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A matched vertex pair `(v, w)`: `v` from the first graph, `w` from the
/// second.
pub type VtxPair = (usize, usize);

/// Lock-free incumbent length plus the reconciliation slots for the
/// thread-local best mappings.
#[derive(Debug)]
pub struct Incumbent {
    best_len: AtomicUsize,
    slots: Mutex<Vec<Vec<VtxPair>>>,
}

impl Incumbent {
    /// Starts with an empty incumbent of length 0.
    pub fn new() -> Self {
        Self {
            best_len: AtomicUsize::new(0),
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Current best length. Relaxed is enough: a stale read only delays a
    /// prune, it never cuts a subtree that could still win.
    #[inline(always)]
    pub fn current_best_length(&self) -> usize {
        self.best_len.load(Ordering::Relaxed)
    }

    /// Raises the incumbent to `len` if it is an improvement. Returns true
    /// if this call moved the global value. The length only ever grows.
    pub fn try_update(&self, len: usize) -> bool {
        let mut seen = self.best_len.load(Ordering::Relaxed);
        loop {
            if len <= seen {
                return false;
            }
            match self.best_len.compare_exchange_weak(
                seen,
                len,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(now) => seen = now,
            }
        }
    }

    /// Publishes a worker's local best mapping at a join point.
    pub fn publish(&self, mapping: Vec<VtxPair>) {
        if mapping.is_empty() {
            return;
        }
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.push(mapping);
    }

    /// Consumes the tracker, returning a mapping whose length equals the
    /// final incumbent length, sorted by left vertex id.
    pub fn into_best(self) -> Vec<VtxPair> {
        let len = self.best_len.load(Ordering::Relaxed);
        let slots = self
            .slots
            .into_inner()
            .unwrap_or_else(|e| e.into_inner());
        let mut best = slots
            .into_iter()
            .find(|m| m.len() == len)
            .unwrap_or_default();
        best.sort_unstable_by_key(|&(v, _)| v);
        best
    }
}

impl Default for Incumbent {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
