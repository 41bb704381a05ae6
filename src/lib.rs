//! # Maximum Common Subgraph Solver
//!
//! A parallel branch-and-bound solver for the maximum common (connected)
//! subgraph problem: given two labeled undirected graphs, find the largest
//! set of vertex pairs that induces the same subgraph in both.
//!
//! This crate provides:
//! - A dense labeled graph model with binary and LAD loaders and degree
//!   preprocessing.
//! - An allocation-free bidomain partition store with an admissible pruning
//!   bound and deterministic branching heuristics.
//! - An iterative search engine whose whole backtracking state lives in an
//!   explicit frontier stack.
//! - A work-stealing distributor that publishes near-root branch nodes to a
//!   position-ordered help queue, with a lock-free shared incumbent.
//!
//! ## Quick Start
//!
//! ```
//! use mcsplit::graph::Graph;
//! use mcsplit::search::{solve, SolveConfig};
//!
//! // Two paths on three vertices share all three of them.
//! let mut g0 = Graph::new(3);
//! g0.add_edge(0, 1);
//! g0.add_edge(1, 2);
//! let g1 = g0.clone();
//!
//! let result = solve(&g0, &g1, &SolveConfig::default());
//! assert_eq!(result.pairs.len(), 3);
//! ```
//!
//! ## Modules
//!
//! - [`graph`]: Graph model, file formats, degree preprocessing.
//! - [`bidomain`]: Partition store, pruning bound, branching heuristics.
//! - [`search`]: Configuration, deadline, engine and the parallel splitter.
//! - [`parallel`]: Search positions and the position-ordered help queue.
//! - [`incumbent`]: Shared best-so-far tracking.
//! - [`verify`]: Post-hoc verification of a returned mapping.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::inline_always)] // Intentional for hot-path code
#![allow(clippy::many_single_char_names)] // Graph-theoretic variable names
#![allow(clippy::needless_range_loop)] // Often clearer for index-buffer code

pub mod bidomain;
pub mod graph;
pub mod incumbent;
pub mod parallel;
pub mod search;
pub mod verify;

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::graph::{Graph, GraphFormat, GraphFormatError};
    pub use crate::incumbent::VtxPair;
    pub use crate::search::{solve, SolveConfig, SolveResult};
    pub use crate::verify::{check_mapping, MappingError};
}
