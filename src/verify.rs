//! Post-hoc verification of a returned mapping.
//!
//! The solver re-checks its own answer before reporting it: the check is
//! O(k²) against the input graphs' adjacency and catches any bookkeeping defect
//! in the search core. A failure here is an internal bug, never a property
//! of the inputs.

use thiserror::Error;

use crate::graph::Graph;
use crate::incumbent::VtxPair;

/// Ways a candidate mapping can fail verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// A vertex of the first graph appears in two pairs.
    #[error("vertex {v} of the first graph is matched twice")]
    DuplicateLeft {
        /// The repeated left vertex.
        v: usize,
    },
    /// A vertex of the second graph appears in two pairs.
    #[error("vertex {w} of the second graph is matched twice")]
    DuplicateRight {
        /// The repeated right vertex.
        w: usize,
    },
    /// A matched pair carries different labels.
    #[error("label mismatch on pair ({v}, {w})")]
    LabelMismatch {
        /// Left vertex of the offending pair.
        v: usize,
        /// Right vertex of the offending pair.
        w: usize,
    },
    /// Two pairs disagree on adjacency between the graphs.
    #[error("adjacency mismatch between pairs ({v0}, {w0}) and ({v1}, {w1})")]
    AdjacencyMismatch {
        /// Left vertex of the first pair.
        v0: usize,
        /// Right vertex of the first pair.
        w0: usize,
        /// Left vertex of the second pair.
        v1: usize,
        /// Right vertex of the second pair.
        w1: usize,
    },
}

/// Checks that `pairs` encodes a common subgraph of `g0` and `g1`: both
/// sides injective, labels equal pairwise, and every pair of pairs either
/// adjacent in both graphs or in neither.
///
/// The check is deterministic and read-only, so re-running it on the same
/// mapping always gives the same verdict.
pub fn check_mapping(g0: &Graph, g1: &Graph, pairs: &[VtxPair]) -> Result<(), MappingError> {
    for (i, &(v0, w0)) in pairs.iter().enumerate() {
        if g0.label(v0) != g1.label(w0) {
            return Err(MappingError::LabelMismatch { v: v0, w: w0 });
        }
        for &(v1, w1) in &pairs[i + 1..] {
            if v0 == v1 {
                return Err(MappingError::DuplicateLeft { v: v0 });
            }
            if w0 == w1 {
                return Err(MappingError::DuplicateRight { w: w0 });
            }
            if g0.adjacent(v0, v1) != g1.adjacent(w0, w1) {
                return Err(MappingError::AdjacencyMismatch { v0, w0, v1, w1 });
            }
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
