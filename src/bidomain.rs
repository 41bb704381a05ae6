//! Bidomain partition store: the shared index buffers, the frontier stack,
//! the pruning bound and the branching heuristics.
//!
//! A bidomain is a pair of index ranges, one into the left buffer and one
//! into the right buffer, whose vertices are mutually compatible: every
//! left vertex in the range may still be matched to every right vertex.
//! Partitioning on a newly matched pair `(v, w)` splits each range in place
//! with swaps, so the hot loop never allocates; child domains alias
//! subranges of their parent's ranges and the stack discipline guarantees
//! a parent's ranges hold the same vertex set (possibly reordered) once all
//! of its children have been popped.

use crate::graph::Graph;

// ============================================================================
// Bidomain
// ============================================================================

/// One label class of the current partition.
///
/// `left..left + left_len` and `right..right + right_len` are the live
/// ranges. Enumeration bookkeeping lives inline so that suspending and
/// resuming a branch is pop-only:
///
/// - while a vertex `v` is being enumerated, it is parked at
///   `left[left + left_len]` (just past the live range) and `right_len`
///   is one less than `initial_right_len`, with `right[right + right_len]`
///   acting as the reserved slot for the `w` currently under trial;
/// - `last_w` records the largest `w` tried so far, so the ascending scan
///   never repeats a candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bidomain {
    /// Start of the live range in the left buffer.
    pub left: usize,
    /// Start of the live range in the right buffer.
    pub right: usize,
    /// Number of live left vertices.
    pub left_len: usize,
    /// Number of live right vertices.
    pub right_len: usize,
    /// True if every vertex here is adjacent to the whole current mapping.
    pub adjacent: bool,
    /// Frontier depth this domain belongs to.
    pub depth: usize,
    /// `right_len` at creation; differs from `right_len` only while a
    /// vertex of this domain is mid-enumeration.
    pub initial_right_len: usize,
    /// Largest right vertex tried for the parked vertex, if any.
    pub last_w: Option<usize>,
}

impl Bidomain {
    /// True once every left vertex has been consumed and the right side
    /// has been fully restored.
    #[inline]
    pub fn exhausted(&self) -> bool {
        self.left_len == 0 && self.right_len == self.initial_right_len
    }

    /// True while a left vertex of this domain is parked mid-enumeration.
    #[inline]
    pub fn resuming(&self) -> bool {
        self.right_len != self.initial_right_len
    }
}

/// Swap-partitions `buf[start..start + len]` so entries satisfying `row`
/// come first, preserving their relative order. Returns how many do.
#[inline]
fn partition(buf: &mut [usize], start: usize, len: usize, row: &[bool]) -> usize {
    let mut k = 0;
    for j in 0..len {
        if row[buf[start + j]] {
            buf.swap(start + k, start + j);
            k += 1;
        }
    }
    k
}

// ============================================================================
// DomainStore
// ============================================================================

/// The frontier stack of bidomains plus the two shared index buffers they
/// slice into.
///
/// Cloning a store deep-copies everything; the parallel distributor hands
/// clones to worker threads so each searches its subtree on private state.
#[derive(Clone, Debug)]
pub struct DomainStore {
    pub(crate) left: Vec<usize>,
    pub(crate) right: Vec<usize>,
    pub(crate) domains: Vec<Bidomain>,
}

impl DomainStore {
    /// Builds the initial partition: one depth-0 bidomain per label shared
    /// by both graphs. Labels present on only one side yield no domain, so
    /// two graphs without a common label produce an empty store.
    pub fn seed(g0: &Graph, g1: &Graph) -> Self {
        let mut labels: Vec<u32> = g0.labels().iter().chain(g1.labels()).copied().collect();
        labels.sort_unstable();
        labels.dedup();

        let mut store = Self {
            left: Vec::with_capacity(g0.n()),
            right: Vec::with_capacity(g1.n()),
            domains: Vec::with_capacity(labels.len().max(g0.n().min(g1.n()))),
        };
        for label in labels {
            let l = store.left.len();
            let r = store.right.len();
            store.left.extend((0..g0.n()).filter(|&v| g0.label(v) == label));
            store.right.extend((0..g1.n()).filter(|&w| g1.label(w) == label));
            let left_len = store.left.len() - l;
            let right_len = store.right.len() - r;
            if left_len > 0 && right_len > 0 {
                store.domains.push(Bidomain {
                    left: l,
                    right: r,
                    left_len,
                    right_len,
                    adjacent: false,
                    depth: 0,
                    initial_right_len: right_len,
                    last_w: None,
                });
            } else {
                store.left.truncate(l);
                store.right.truncate(r);
            }
        }
        store
    }

    /// The bidomain on top of the stack.
    #[inline]
    pub fn top(&self) -> Option<&Bidomain> {
        self.domains.last()
    }

    /// Drops the top bidomain.
    #[inline]
    pub fn pop_top(&mut self) {
        self.domains.pop();
    }

    /// Drops every bidomain of the given frontier depth.
    pub fn pop_frontier(&mut self, depth: usize) {
        while self.domains.last().is_some_and(|bd| bd.depth == depth) {
            self.domains.pop();
        }
    }

    /// Upper bound on how many pairs the frontier at `depth` can still
    /// contribute.
    ///
    /// A suspended domain counts its parked vertex as matchable again, so
    /// the bound never under-estimates what the completed subtrees below
    /// it may achieve.
    pub fn bound(&self, depth: usize) -> usize {
        self.domains
            .iter()
            .rev()
            .take_while(|bd| bd.depth == depth)
            .map(|bd| {
                if bd.resuming() {
                    (bd.left_len + 1).min(bd.initial_right_len)
                } else {
                    bd.left_len.min(bd.right_len)
                }
            })
            .sum()
    }

    /// Picks the branching bidomain of the frontier at `depth` and swaps it
    /// to the top of the stack. Returns false if nothing is branchable
    /// (the frontier is empty, fully exhausted, or connected mode filtered
    /// every domain out).
    ///
    /// The choice minimizes `max(left_len, right_len)`, breaking ties by
    /// the smallest live left vertex id, which keeps the search order
    /// deterministic. A suspended domain shrank on both sides when its
    /// vertex was consumed, so it is strictly smaller than its siblings
    /// and is always re-picked until its enumeration finishes.
    pub fn select(&mut self, depth: usize, connected: bool) -> bool {
        let len = self.domains.len();
        let mut best: Option<(usize, usize, usize)> = None; // (score, tie id, index)
        for idx in (0..len).rev() {
            let bd = &self.domains[idx];
            if bd.depth != depth {
                break;
            }
            if bd.exhausted() {
                continue;
            }
            if connected && depth > 0 && !bd.adjacent {
                continue;
            }
            let score = bd.left_len.max(bd.right_len);
            let tie = if bd.left_len == 0 {
                // Mid-enumeration with no live left vertices: the parked
                // vertex sits just past the range.
                self.left[bd.left]
            } else {
                self.left[bd.left..bd.left + bd.left_len]
                    .iter()
                    .copied()
                    .min()
                    .unwrap_or(usize::MAX)
            };
            if best.is_none_or(|(s, t, _)| (score, tie) < (s, t)) {
                best = Some((score, tie, idx));
            }
        }
        match best {
            Some((_, _, idx)) => {
                self.domains.swap(idx, len - 1);
                true
            }
            None => false,
        }
    }

    /// Takes the branch vertex from the top bidomain.
    ///
    /// A fresh domain yields its smallest live left vertex, parking it just
    /// past the live range and shrinking both sides (the lost right slot
    /// becomes the reserved trial slot). A suspended domain yields its
    /// parked vertex unchanged.
    pub fn consume_v(&mut self) -> usize {
        let idx = self.domains.len() - 1;
        let bd = self.domains[idx];
        debug_assert!(bd.left_len > 0 || bd.resuming());
        if bd.resuming() {
            return self.left[bd.left + bd.left_len];
        }
        let live = &self.left[bd.left..bd.left + bd.left_len];
        let min_j = live
            .iter()
            .enumerate()
            .min_by_key(|&(_, &v)| v)
            .map(|(j, _)| j)
            .unwrap_or(0);
        self.left.swap(bd.left + min_j, bd.left + bd.left_len - 1);
        let v = self.left[bd.left + bd.left_len - 1];
        let bd = &mut self.domains[idx];
        bd.left_len -= 1;
        bd.right_len -= 1;
        v
    }

    /// Advances the ascending `w` scan of the top bidomain.
    ///
    /// Returns the smallest untried right vertex, swapped into the reserved
    /// slot at `right[right + right_len]` so deeper partitions never see
    /// it. When every candidate has been tried, restores the right side,
    /// clears the cursor and returns `None`.
    pub fn next_w(&mut self) -> Option<usize> {
        let idx = self.domains.len() - 1;
        let bd = self.domains[idx];
        let mut found: Option<(usize, usize)> = None; // (offset, w)
        for j in 0..=bd.right_len {
            let w = self.right[bd.right + j];
            if bd.last_w.is_none_or(|p| w > p) && found.is_none_or(|(_, fw)| w < fw) {
                found = Some((j, w));
            }
        }
        match found {
            Some((j, w)) => {
                self.right.swap(bd.right + j, bd.right + bd.right_len);
                self.domains[idx].last_w = Some(w);
                Some(w)
            }
            None => {
                let bd = &mut self.domains[idx];
                bd.right_len += 1;
                bd.last_w = None;
                None
            }
        }
    }

    /// Partitions the whole frontier at `new_depth - 1` on the freshly
    /// matched pair `(v, w)`, pushing the child frontier at `new_depth`.
    ///
    /// Each parent splits into an adjacent half (neighbors of both `v` and
    /// `w`) and a non-adjacent half; empty halves are dropped. If the new
    /// frontier's bound cannot beat `incumbent_len`, the children are
    /// rolled back and false is returned.
    pub fn generate_children(
        &mut self,
        new_depth: usize,
        g0: &Graph,
        g1: &Graph,
        v: usize,
        w: usize,
        incumbent_len: usize,
    ) -> bool {
        let parent_depth = new_depth - 1;
        let v_row = g0.adj_row(v);
        let w_row = g1.adj_row(w);
        let base = self.domains.len();
        let mut bound = 0;
        let mut i = base;
        while i > 0 && self.domains[i - 1].depth == parent_depth {
            i -= 1;
            let bd = self.domains[i];
            let l_adj = partition(&mut self.left, bd.left, bd.left_len, v_row);
            let r_adj = partition(&mut self.right, bd.right, bd.right_len, w_row);
            let l_non = bd.left_len - l_adj;
            let r_non = bd.right_len - r_adj;
            if l_non > 0 && r_non > 0 {
                self.domains.push(Bidomain {
                    left: bd.left + l_adj,
                    right: bd.right + r_adj,
                    left_len: l_non,
                    right_len: r_non,
                    adjacent: bd.adjacent,
                    depth: new_depth,
                    initial_right_len: r_non,
                    last_w: None,
                });
                bound += l_non.min(r_non);
            }
            if l_adj > 0 && r_adj > 0 {
                self.domains.push(Bidomain {
                    left: bd.left,
                    right: bd.right,
                    left_len: l_adj,
                    right_len: r_adj,
                    adjacent: true,
                    depth: new_depth,
                    initial_right_len: r_adj,
                    last_w: None,
                });
                bound += l_adj.min(r_adj);
            }
        }
        if new_depth + bound <= incumbent_len {
            self.domains.truncate(base);
            false
        } else {
            true
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
