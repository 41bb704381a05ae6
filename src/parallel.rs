//! Work distribution for the parallel search: positions, help tasks and the
//! position-ordered help queue.
//!
//! Near the root the search publishes each branch node it is about to
//! enumerate as a [`HelpTask`] keyed by its [`Position`] in the tree. Idle
//! helper threads pull the smallest pending position, clone the task's
//! snapshot and race the publisher over the node's branch indices through a
//! shared claim counter, so every branch is explored by exactly one thread.
//! The publisher blocks until the task's pending count drops to zero, which
//! keeps completion strictly nested and lets helpers reuse the publisher's
//! stack discipline unchanged.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::search::SearchState;

// ============================================================================
// Position
// ============================================================================

/// Address of a branch node in the search tree: the branch indices taken at
/// each level from the root down to the node.
///
/// The derived ordering is lexicographic with prefixes first, so the queue
/// hands out subtrees in the same left-to-right order the sequential search
/// would visit them.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position(Vec<u32>);

impl Position {
    /// The root of the search tree.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// The position reached by taking branch `i` from here.
    pub fn child(&self, i: usize) -> Self {
        let mut vals = self.0.clone();
        vals.push(i as u32);
        Self(vals)
    }
}

// ============================================================================
// HelpTask
// ============================================================================

/// One branch node offered to helper threads.
///
/// The snapshot is the publisher's state right after the branch vertex was
/// consumed; a helper clones it and replays the same ascending `w` scan,
/// so both threads see identical branch indices and the claim counter is
/// enough to divide them.
#[derive(Debug)]
pub struct HelpTask {
    /// Deep snapshot of the search state at the node.
    pub(crate) state: SearchState,
    /// The branch vertex already consumed from the snapshot's top domain.
    pub(crate) v: usize,
    /// Split-tree level of the node.
    pub(crate) level: usize,
    /// Number of branch indices at the node, the final one being "leave
    /// `v` unmatched".
    pub(crate) i_end: usize,
    /// The node's position, also its queue key.
    pub(crate) pos: Position,
    /// Next unclaimed branch index.
    pub(crate) claims: AtomicUsize,
    /// Helpers currently executing this task; guarded by the queue mutex.
    pending: AtomicUsize,
}

impl HelpTask {
    pub(crate) fn new(
        state: SearchState,
        v: usize,
        level: usize,
        i_end: usize,
        pos: Position,
    ) -> Self {
        Self {
            state,
            v,
            level,
            i_end,
            pos,
            claims: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
        }
    }
}

// ============================================================================
// HelpQueue
// ============================================================================

struct QueueInner {
    tasks: BTreeMap<Position, Arc<HelpTask>>,
    stop: bool,
}

/// Priority queue of pending help tasks, smallest position first, with the
/// wait-until-done handshake between a publisher and its helper.
pub struct HelpQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
}

impl HelpQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                tasks: BTreeMap::new(),
                stop: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Offers a task to the helpers and wakes them.
    pub fn submit(&self, task: Arc<HelpTask>) {
        let mut q = self.lock();
        q.tasks.insert(task.pos.clone(), task);
        self.cond.notify_all();
    }

    /// Blocks until a task is available and claims it, or returns `None`
    /// once the queue is shut down. A task is handed to at most one helper;
    /// its pending count is raised before the lock is released.
    pub fn take(&self) -> Option<Arc<HelpTask>> {
        let mut q = self.lock();
        loop {
            if q.stop {
                return None;
            }
            if let Some((_, task)) = q.tasks.pop_first() {
                task.pending.fetch_add(1, Ordering::Relaxed);
                return Some(task);
            }
            q = self
                .cond
                .wait(q)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Marks a taken task finished and wakes its waiting publisher.
    pub fn complete(&self, task: &HelpTask) {
        let _q = self.lock();
        if task.pending.fetch_sub(1, Ordering::Relaxed) == 1 {
            self.cond.notify_all();
        }
    }

    /// Called by the publisher after running its own share of the task:
    /// withdraws the task so no further helper picks it up, then blocks
    /// until any helper already executing it has finished.
    pub fn wait_done(&self, task: &HelpTask) {
        let mut q = self.lock();
        q.tasks.remove(&task.pos);
        while task.pending.load(Ordering::Relaxed) > 0 {
            q = self
                .cond
                .wait(q)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Wakes every blocked helper and makes further `take` calls return
    /// `None`.
    pub fn shutdown(&self) {
        let mut q = self.lock();
        q.stop = true;
        self.cond.notify_all();
    }
}

impl Default for HelpQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bidomain::DomainStore;
    use crate::graph::Graph;
    use std::thread;

    fn dummy_task(pos: Position) -> Arc<HelpTask> {
        let g = Graph::new(0);
        let state = SearchState {
            store: DomainStore::seed(&g, &g),
            current: Vec::new(),
        };
        Arc::new(HelpTask::new(state, 0, 0, 0, pos))
    }

    #[test]
    fn position_order_is_leftmost_first() {
        let root = Position::root();
        let a = root.child(0);
        let b = root.child(1);
        assert!(root < a);
        assert!(a < b);
        // A parent precedes all of its descendants.
        assert!(a < a.child(7));
        assert!(a.child(7) < b);
    }

    #[test]
    fn take_returns_smallest_position() {
        let queue = HelpQueue::new();
        let late = dummy_task(Position::root().child(3));
        let early = dummy_task(Position::root().child(1));
        queue.submit(Arc::clone(&late));
        queue.submit(Arc::clone(&early));
        let first = queue.take().unwrap();
        assert_eq!(first.pos, early.pos);
        let second = queue.take().unwrap();
        assert_eq!(second.pos, late.pos);
    }

    #[test]
    fn wait_done_returns_when_untaken() {
        let queue = HelpQueue::new();
        let task = dummy_task(Position::root().child(0));
        queue.submit(Arc::clone(&task));
        // Nobody took it; withdrawing must not block.
        queue.wait_done(&task);
        queue.shutdown();
        assert!(queue.take().is_none());
    }

    #[test]
    fn publisher_blocks_until_helper_completes() {
        let queue = HelpQueue::new();
        let task = dummy_task(Position::root().child(0));
        thread::scope(|s| {
            let helper = s.spawn(|| {
                // The publisher may withdraw the task before we get to it,
                // so treat both outcomes as valid.
                while let Some(taken) = queue.take() {
                    queue.complete(&taken);
                }
            });
            queue.submit(Arc::clone(&task));
            queue.wait_done(&task);
            assert_eq!(task.pending.load(Ordering::Relaxed), 0);
            queue.shutdown();
            helper.join().unwrap();
        });
    }

    #[test]
    fn shutdown_unblocks_idle_helpers() {
        let queue = HelpQueue::new();
        thread::scope(|s| {
            let h = s.spawn(|| queue.take());
            queue.shutdown();
            assert!(h.join().unwrap().is_none());
        });
    }
}
