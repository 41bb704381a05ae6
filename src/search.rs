//! Branch-and-bound search driver: configuration, deadline, the iterative
//! engine and the parallel splitter.
//!
//! The engine keeps the whole backtracking state in an explicit frontier
//! stack (see [`crate::bidomain`]), so suspending a branch costs nothing and
//! resuming it is pop-only. Near the root the search instead runs a small
//! recursive splitter that publishes every branch node it enumerates to the
//! help queue; idle threads clone the node's snapshot and claim branch
//! indices through a shared counter, then drop into the iterative engine for
//! the deep subtrees where stealing no longer pays.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::bidomain::DomainStore;
use crate::graph::Graph;
use crate::incumbent::{Incumbent, VtxPair};
use crate::parallel::{HelpQueue, HelpTask, Position};

// ============================================================================
// Configuration
// ============================================================================

/// Split level below which branch nodes are published for help.
///
/// Deeper subtrees are cheap enough that cloning state for a helper costs
/// more than searching them in place.
pub const DEFAULT_SPLIT_DEPTH: usize = 6;

/// Search configuration.
#[derive(Clone, Debug)]
pub struct SolveConfig {
    /// Require every matched pair after the first to be adjacent to an
    /// already matched pair (maximum *connected* common subgraph).
    pub connected: bool,
    /// Worker threads, including the main one. 1 disables the queue.
    pub threads: usize,
    /// Soft wall-clock limit; `None` searches to completion.
    pub timeout: Option<Duration>,
    /// Tree levels at which branch nodes are offered to helpers.
    pub split_depth: usize,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            connected: false,
            threads: thread::available_parallelism().map_or(1, usize::from),
            timeout: None,
            split_depth: DEFAULT_SPLIT_DEPTH,
        }
    }
}

/// Outcome of a solve call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolveResult {
    /// The best mapping found, sorted by left vertex id.
    pub pairs: Vec<VtxPair>,
    /// True if the deadline fired; the mapping is then the best found so
    /// far rather than a proven maximum.
    pub timed_out: bool,
}

// ============================================================================
// Deadline
// ============================================================================

/// Cooperative wall-clock limit shared by all workers.
///
/// `expired` is checked at the top of every search loop; once it trips, the
/// flag latches so late checks stay consistent and the caller can report
/// the timeout.
#[derive(Debug)]
pub struct Deadline {
    start: Instant,
    limit: Option<Duration>,
    hit: AtomicBool,
}

impl Deadline {
    /// Starts the clock now.
    pub fn new(limit: Option<Duration>) -> Self {
        Self {
            start: Instant::now(),
            limit,
            hit: AtomicBool::new(false),
        }
    }

    /// True once the limit has passed. A zero limit trips immediately.
    pub fn expired(&self) -> bool {
        if self.hit.load(Ordering::Relaxed) {
            return true;
        }
        match self.limit {
            Some(limit) if self.start.elapsed() >= limit => {
                self.hit.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    /// True if `expired` ever tripped.
    pub fn was_hit(&self) -> bool {
        self.hit.load(Ordering::Relaxed)
    }

    /// Time since the clock started.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// ============================================================================
// Search state
// ============================================================================

/// Everything a thread needs to continue a search: the domain store and the
/// mapping built so far. Cloning yields a fully independent copy.
#[derive(Clone, Debug)]
pub(crate) struct SearchState {
    pub(crate) store: DomainStore,
    pub(crate) current: Vec<VtxPair>,
}

/// Immutable per-solve context shared by every worker.
struct SearchContext<'a> {
    g0: &'a Graph,
    g1: &'a Graph,
    connected: bool,
    split_depth: usize,
    incumbent: &'a Incumbent,
    deadline: &'a Deadline,
}

/// Records `current` if it beats this thread's best, raising the global
/// incumbent length when it is also a global improvement.
///
/// The local copy is written before the global length, so the final
/// reconciliation always finds a mapping of the winning length.
fn note_improvement(ctx: &SearchContext<'_>, current: &[VtxPair], local_best: &mut Vec<VtxPair>) {
    if current.len() > local_best.len() {
        local_best.clear();
        local_best.extend_from_slice(current);
        if ctx.incumbent.try_update(current.len()) {
            debug!(len = current.len(), "new incumbent");
        }
    }
}

// ============================================================================
// Iterative engine
// ============================================================================

/// Exhausts the subtree rooted at the current frontier, never backtracking
/// above `entry` (frontiers shallower than the caller's belong to other
/// tasks).
///
/// Each pass handles the top bidomain: pop it if it is exhausted or the
/// frontier's bound cannot beat the incumbent; otherwise pick the branch
/// domain, take (or resume) its vertex `v`, try the next `w` in ascending
/// order and push the child frontier. When `v` runs out of candidates the
/// domain is restored in place and the loop simply carries on with the rest
/// of the frontier, which is exactly the "leave `v` unmatched" branch.
fn search_subtree(
    ctx: &SearchContext<'_>,
    state: &mut SearchState,
    entry: usize,
    local_best: &mut Vec<VtxPair>,
) {
    loop {
        if ctx.deadline.expired() {
            return;
        }
        let Some(top) = state.store.top().copied() else {
            return;
        };
        if top.depth < entry {
            return;
        }
        let d = top.depth;
        state.current.truncate(d);
        if top.exhausted() || d + state.store.bound(d) <= ctx.incumbent.current_best_length() {
            state.store.pop_top();
            continue;
        }
        if !state.store.select(d, ctx.connected) {
            state.store.pop_frontier(d);
            continue;
        }
        let v = state.store.consume_v();
        if let Some(w) = state.store.next_w() {
            state.current.push((v, w));
            note_improvement(ctx, &state.current, local_best);
            state.store.generate_children(
                d + 1,
                ctx.g0,
                ctx.g1,
                v,
                w,
                ctx.incumbent.current_best_length(),
            );
        }
    }
}

// ============================================================================
// Parallel splitter
// ============================================================================

/// Handles one branch node at or above the split level: prune, select the
/// branch domain, consume its vertex and publish the node before racing the
/// helpers over its branch indices.
fn branch_node(
    ctx: &SearchContext<'_>,
    queue: &HelpQueue,
    mut state: SearchState,
    level: usize,
    pos: Position,
    local_best: &mut Vec<VtxPair>,
) {
    if ctx.deadline.expired() {
        return;
    }
    let d = state.current.len();
    if d + state.store.bound(d) <= ctx.incumbent.current_best_length() {
        return;
    }
    if !state.store.select(d, ctx.connected) {
        return;
    }
    let v = state.store.consume_v();
    let i_end = state
        .store
        .top()
        .map_or(0, |bd| bd.right_len + 2);
    let task = Arc::new(HelpTask::new(
        state.clone(),
        v,
        level,
        i_end,
        pos.clone(),
    ));
    queue.submit(Arc::clone(&task));
    run_branches(ctx, queue, &mut state, v, i_end, level, &pos, &task.claims, local_best);
    queue.wait_done(&task);
}

/// Enumerates the branch indices of one node, executing only those claimed
/// through `claims`.
///
/// Every participating thread replays the same ascending `w` scan on its
/// own copy of the state, so index `i` means the same branch to all of
/// them. Indices `0..i_end - 1` match `v` to successive candidates; the
/// final index leaves `v` unmatched and continues the same frontier without
/// it.
#[allow(clippy::too_many_arguments)]
fn run_branches(
    ctx: &SearchContext<'_>,
    queue: &HelpQueue,
    state: &mut SearchState,
    v: usize,
    i_end: usize,
    level: usize,
    pos: &Position,
    claims: &AtomicUsize,
    local_best: &mut Vec<VtxPair>,
) {
    let d = state.current.len();
    let mut claimed = claims.fetch_add(1, Ordering::Relaxed);
    for i in 0..i_end {
        if ctx.deadline.expired() {
            return;
        }
        // Some(w) for every index but the last; the final call restores
        // the domain's right side for the unmatched branch.
        let w_opt = state.store.next_w();
        if i != claimed {
            continue;
        }
        claimed = claims.fetch_add(1, Ordering::Relaxed);
        match w_opt {
            Some(w) => {
                let mut child = state.clone();
                child.current.push((v, w));
                note_improvement(ctx, &child.current, local_best);
                if child.store.generate_children(
                    d + 1,
                    ctx.g0,
                    ctx.g1,
                    v,
                    w,
                    ctx.incumbent.current_best_length(),
                ) {
                    descend(ctx, queue, child, level + 1, pos.child(i), d + 1, local_best);
                }
            }
            None => {
                let child = state.clone();
                descend(ctx, queue, child, level + 1, pos.child(i), d, local_best);
            }
        }
    }
}

/// Continues into a child subtree: another splitter node while within the
/// split levels, the iterative engine below them.
fn descend(
    ctx: &SearchContext<'_>,
    queue: &HelpQueue,
    mut state: SearchState,
    level: usize,
    pos: Position,
    entry: usize,
    local_best: &mut Vec<VtxPair>,
) {
    if level <= ctx.split_depth {
        branch_node(ctx, queue, state, level, pos, local_best);
    } else {
        search_subtree(ctx, &mut state, entry, local_best);
    }
}

/// Helper thread body: pull the smallest pending node, clone its snapshot
/// and work through the unclaimed branch indices until shutdown.
fn worker_loop(ctx: &SearchContext<'_>, queue: &HelpQueue) {
    let mut local_best = Vec::new();
    while let Some(task) = queue.take() {
        let mut state = task.state.clone();
        run_branches(
            ctx,
            queue,
            &mut state,
            task.v,
            task.i_end,
            task.level,
            &task.pos,
            &task.claims,
            &mut local_best,
        );
        queue.complete(&task);
    }
    ctx.incumbent.publish(local_best);
}

// ============================================================================
// Entry point
// ============================================================================

/// Finds a maximum common (connected) subgraph of `g0` and `g1`.
///
/// Returns the matched pairs sorted by left vertex id. With a deadline the
/// result is the best mapping found when it fired, always a valid common
/// subgraph.
pub fn solve(g0: &Graph, g1: &Graph, cfg: &SolveConfig) -> SolveResult {
    let deadline = Deadline::new(cfg.timeout);
    if g0.is_empty() || g1.is_empty() {
        return SolveResult {
            pairs: Vec::new(),
            timed_out: false,
        };
    }

    let state = SearchState {
        store: DomainStore::seed(g0, g1),
        current: Vec::with_capacity(g0.n().min(g1.n())),
    };
    let incumbent = Incumbent::new();
    let ctx = SearchContext {
        g0,
        g1,
        connected: cfg.connected,
        split_depth: cfg.split_depth,
        incumbent: &incumbent,
        deadline: &deadline,
    };

    let threads = cfg.threads.max(1);
    if threads == 1 {
        let mut state = state;
        let mut local_best = Vec::new();
        search_subtree(&ctx, &mut state, 0, &mut local_best);
        incumbent.publish(local_best);
    } else {
        let queue = HelpQueue::new();
        thread::scope(|s| {
            for _ in 1..threads {
                s.spawn(|| worker_loop(&ctx, &queue));
            }
            let mut local_best = Vec::new();
            branch_node(&ctx, &queue, state, 0, Position::root(), &mut local_best);
            incumbent.publish(local_best);
            queue.shutdown();
        });
    }

    let timed_out = deadline.was_hit();
    SolveResult {
        pairs: incumbent.into_best(),
        timed_out,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::check_mapping;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;

    fn graph_from_edges(n: usize, edges: &[(usize, usize)]) -> Graph {
        let mut g = Graph::new(n);
        for &(v, w) in edges {
            g.add_edge(v, w);
        }
        g
    }

    fn config(threads: usize, connected: bool) -> SolveConfig {
        SolveConfig {
            connected,
            threads,
            timeout: None,
            // Small enough that multi-threaded tests actually exercise the
            // splitter on tiny instances.
            split_depth: 3,
        }
    }

    // ------------------------------------------------------------------
    // Exhaustive reference solver for cross-checks
    // ------------------------------------------------------------------

    fn mapping_connected(g0: &Graph, pairs: &[(usize, usize)]) -> bool {
        if pairs.len() <= 1 {
            return true;
        }
        let mut reached = vec![false; pairs.len()];
        reached[0] = true;
        let mut frontier = vec![0usize];
        while let Some(i) = frontier.pop() {
            for j in 0..pairs.len() {
                if !reached[j] && g0.adjacent(pairs[i].0, pairs[j].0) {
                    reached[j] = true;
                    frontier.push(j);
                }
            }
        }
        reached.iter().all(|&r| r)
    }

    fn brute_extend(
        g0: &Graph,
        g1: &Graph,
        v: usize,
        current: &mut Vec<(usize, usize)>,
        used: &mut Vec<bool>,
        connected: bool,
        best: &mut usize,
    ) {
        if v == g0.n() {
            if !connected || mapping_connected(g0, current) {
                *best = (*best).max(current.len());
            }
            return;
        }
        brute_extend(g0, g1, v + 1, current, used, connected, best);
        for w in 0..g1.n() {
            if used[w] || g0.label(v) != g1.label(w) {
                continue;
            }
            if current
                .iter()
                .any(|&(pv, pw)| g0.adjacent(pv, v) != g1.adjacent(pw, w))
            {
                continue;
            }
            current.push((v, w));
            used[w] = true;
            brute_extend(g0, g1, v + 1, current, used, connected, best);
            used[w] = false;
            current.pop();
        }
    }

    /// Size of a maximum common (connected) subgraph by full enumeration.
    fn brute_force(g0: &Graph, g1: &Graph, connected: bool) -> usize {
        let mut best = 0;
        let mut used = vec![false; g1.n()];
        brute_extend(g0, g1, 0, &mut Vec::new(), &mut used, connected, &mut best);
        best
    }

    fn random_graph(rng: &mut XorShiftRng, n: usize, p_edge: f64, p_loop: f64) -> Graph {
        let mut g = Graph::new(n);
        for v in 0..n {
            if rng.random_bool(p_loop) {
                g.add_edge(v, v);
            }
            for w in v + 1..n {
                if rng.random_bool(p_edge) {
                    g.add_edge(v, w);
                }
            }
        }
        g
    }

    // ------------------------------------------------------------------
    // Concrete scenarios
    // ------------------------------------------------------------------

    #[test]
    fn two_single_edges_match_completely() {
        let g0 = graph_from_edges(2, &[(0, 1)]);
        let g1 = graph_from_edges(2, &[(0, 1)]);
        let result = solve(&g0, &g1, &config(1, false));
        assert_eq!(result.pairs.len(), 2);
        assert!(!result.timed_out);
        assert_eq!(check_mapping(&g0, &g1, &result.pairs), Ok(()));
    }

    #[test]
    fn triangle_vs_path_shares_one_edge() {
        let g0 = graph_from_edges(3, &[(0, 1), (1, 2), (0, 2)]);
        let g1 = graph_from_edges(3, &[(0, 1), (1, 2)]);
        let result = solve(&g0, &g1, &config(1, false));
        // Any third pair would need a triangle in the path.
        assert_eq!(result.pairs.len(), 2);
        assert_eq!(check_mapping(&g0, &g1, &result.pairs), Ok(()));
    }

    #[test]
    fn self_loop_labels_do_not_match_plain_vertices() {
        let g0 = graph_from_edges(1, &[(0, 0)]);
        let g1 = graph_from_edges(1, &[]);
        let result = solve(&g0, &g1, &config(1, false));
        assert!(result.pairs.is_empty());
    }

    #[test]
    fn connected_mode_cannot_span_components() {
        let g0 = graph_from_edges(4, &[(0, 1), (2, 3)]);
        let g1 = graph_from_edges(4, &[(0, 1), (2, 3)]);
        let unconstrained = solve(&g0, &g1, &config(1, false));
        assert_eq!(unconstrained.pairs.len(), 4);
        let connected = solve(&g0, &g1, &config(1, true));
        assert_eq!(connected.pairs.len(), 2);
        assert_eq!(check_mapping(&g0, &g1, &connected.pairs), Ok(()));
    }

    #[test]
    fn empty_graph_yields_empty_mapping() {
        let g0 = Graph::new(0);
        let g1 = graph_from_edges(2, &[(0, 1)]);
        let result = solve(&g0, &g1, &config(1, false));
        assert!(result.pairs.is_empty());
        assert!(!result.timed_out);
    }

    #[test]
    fn zero_timeout_flags_and_stays_valid() {
        let g0 = graph_from_edges(3, &[(0, 1), (1, 2)]);
        let g1 = graph_from_edges(3, &[(0, 1), (1, 2)]);
        let cfg = SolveConfig {
            timeout: Some(Duration::ZERO),
            ..config(1, false)
        };
        let result = solve(&g0, &g1, &cfg);
        assert!(result.timed_out);
        assert_eq!(check_mapping(&g0, &g1, &result.pairs), Ok(()));
    }

    #[test]
    fn pairs_come_back_sorted_by_left_vertex() {
        let g0 = graph_from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
        let g1 = graph_from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
        let result = solve(&g0, &g1, &config(1, false));
        assert!(result.pairs.windows(2).all(|p| p[0].0 < p[1].0));
    }

    #[test]
    fn single_thread_is_deterministic() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let g0 = random_graph(&mut rng, 6, 0.5, 0.2);
        let g1 = random_graph(&mut rng, 6, 0.5, 0.2);
        let a = solve(&g0, &g1, &config(1, false));
        let b = solve(&g0, &g1, &config(1, false));
        assert_eq!(a, b);
    }

    // ------------------------------------------------------------------
    // Randomized cross-checks against brute force
    // ------------------------------------------------------------------

    #[test]
    fn matches_brute_force_on_random_graphs() {
        let mut rng = XorShiftRng::seed_from_u64(0xC0FFEE);
        for round in 0..40 {
            let n0 = 2 + (round % 5);
            let n1 = 2 + (round % 4);
            let g0 = random_graph(&mut rng, n0, 0.5, 0.15);
            let g1 = random_graph(&mut rng, n1, 0.5, 0.15);
            let expected = brute_force(&g0, &g1, false);
            let result = solve(&g0, &g1, &config(1, false));
            assert_eq!(
                result.pairs.len(),
                expected,
                "round {round}: solver disagrees with brute force"
            );
            assert_eq!(check_mapping(&g0, &g1, &result.pairs), Ok(()));
        }
    }

    #[test]
    fn matches_brute_force_in_connected_mode() {
        let mut rng = XorShiftRng::seed_from_u64(0xBEEF);
        for round in 0..40 {
            let n0 = 2 + (round % 5);
            let n1 = 2 + (round % 5);
            let g0 = random_graph(&mut rng, n0, 0.45, 0.1);
            let g1 = random_graph(&mut rng, n1, 0.45, 0.1);
            let expected = brute_force(&g0, &g1, true);
            let result = solve(&g0, &g1, &config(1, true));
            assert_eq!(
                result.pairs.len(),
                expected,
                "round {round}: connected solver disagrees with brute force"
            );
            assert_eq!(check_mapping(&g0, &g1, &result.pairs), Ok(()));
            // Connectivity of the returned mapping itself.
            assert!(mapping_connected(&g0, &result.pairs));
        }
    }

    #[test]
    fn root_bound_never_under_estimates() {
        let mut rng = XorShiftRng::seed_from_u64(0xACE);
        for _ in 0..30 {
            let g0 = random_graph(&mut rng, 5, 0.5, 0.2);
            let g1 = random_graph(&mut rng, 5, 0.5, 0.2);
            let store = DomainStore::seed(&g0, &g1);
            assert!(store.bound(0) >= brute_force(&g0, &g1, false));
        }
    }

    #[test]
    fn parallel_search_finds_the_same_sizes() {
        let mut rng = XorShiftRng::seed_from_u64(0xDEAD);
        for round in 0..20 {
            let g0 = random_graph(&mut rng, 6, 0.5, 0.1);
            let g1 = random_graph(&mut rng, 6, 0.5, 0.1);
            for &connected in &[false, true] {
                let sequential = solve(&g0, &g1, &config(1, connected));
                let parallel = solve(&g0, &g1, &config(4, connected));
                assert_eq!(
                    parallel.pairs.len(),
                    sequential.pairs.len(),
                    "round {round} connected={connected}"
                );
                assert_eq!(check_mapping(&g0, &g1, &parallel.pairs), Ok(()));
            }
        }
    }

    #[test]
    fn degree_sorted_instances_keep_the_optimum() {
        let mut rng = XorShiftRng::seed_from_u64(42);
        for _ in 0..10 {
            let g0 = random_graph(&mut rng, 5, 0.5, 0.2);
            let g1 = random_graph(&mut rng, 5, 0.5, 0.2);
            let plain = solve(&g0, &g1, &config(1, false));
            let sorted = solve(
                &g0.sorted_by_degree(false),
                &g1.sorted_by_degree(false),
                &config(1, false),
            );
            assert_eq!(plain.pairs.len(), sorted.pairs.len());
        }
    }
}
