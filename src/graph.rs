//! Labeled undirected graph model and the two on-disk graph formats.
//!
//! The solver works on a dense adjacency-matrix representation: the instances
//! this tool targets are small (a few hundred vertices) and the partition
//! primitive probes `adjacent(v, w)` constantly, so an O(1) matrix lookup
//! wins over any sparse structure. Self-loops are not stored as adjacency
//! entries; a looped vertex gets label 1 instead, which keeps the adjacency
//! relation irreflexive and lets the label buckets separate looped from
//! loop-free vertices.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Errors produced while reading a graph file.
///
/// These are fatal at load time; the search core never sees a graph that
/// failed to load.
#[derive(Debug, Error)]
pub enum GraphFormatError {
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The file ended before the declared data was read.
    #[error("unexpected end of file")]
    Truncated,
    /// A count or vertex field could not be parsed.
    #[error("malformed graph data: {0}")]
    Malformed(String),
    /// An edge referenced a vertex outside `0..n`.
    #[error("vertex id {id} out of range (graph has {n} vertices)")]
    VertexOutOfRange {
        /// The offending vertex id.
        id: usize,
        /// The declared vertex count.
        n: usize,
    },
}

/// On-disk encoding of a graph instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphFormat {
    /// Length-prefixed binary format of 16-bit little-endian words.
    Binary,
    /// Plain-text LAD adjacency lists.
    Lad,
}

// ============================================================================
// Graph
// ============================================================================

/// An immutable labeled undirected graph.
///
/// Built once by a loader, then read-only for the lifetime of a search, so
/// worker threads share it without synchronization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Graph {
    n: usize,
    adj: Vec<Vec<bool>>,
    label: Vec<u32>,
    degree: Vec<u32>,
}

impl Graph {
    /// Creates a graph with `n` vertices, no edges and all labels 0.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            adj: vec![vec![false; n]; n],
            label: vec![0; n],
            degree: vec![0; n],
        }
    }

    /// Number of vertices.
    #[inline(always)]
    pub fn n(&self) -> usize {
        self.n
    }

    /// Returns true if the graph has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Symmetric adjacency query.
    #[inline(always)]
    pub fn adjacent(&self, v: usize, w: usize) -> bool {
        self.adj[v][w]
    }

    /// The full adjacency row of `v`, used by the in-place partition.
    #[inline(always)]
    pub fn adj_row(&self, v: usize) -> &[bool] {
        &self.adj[v]
    }

    /// Label of vertex `v` (1 marks a self-loop).
    #[inline(always)]
    pub fn label(&self, v: usize) -> u32 {
        self.label[v]
    }

    /// Cached degree of vertex `v`.
    #[inline(always)]
    pub fn degree(&self, v: usize) -> u32 {
        self.degree[v]
    }

    /// All vertex labels in id order.
    #[inline]
    pub fn labels(&self) -> &[u32] {
        &self.label
    }

    /// Adds the undirected edge `(v, w)`.
    ///
    /// A self-loop (`v == w`) is recorded by setting the vertex label to 1
    /// rather than as an adjacency entry.
    pub fn add_edge(&mut self, v: usize, w: usize) {
        if v == w {
            self.label[v] = 1;
        } else if !self.adj[v][w] {
            self.adj[v][w] = true;
            self.adj[w][v] = true;
            self.degree[v] += 1;
            self.degree[w] += 1;
        }
    }

    /// Number of undirected edges.
    pub fn edge_count(&self) -> usize {
        self.degree.iter().map(|&d| d as usize).sum::<usize>() / 2
    }

    /// Returns true if more than half of all possible edges are present.
    pub fn is_dense(&self) -> bool {
        4 * self.edge_count() > self.n * self.n.saturating_sub(1)
    }

    /// Returns a copy of the graph with vertices relabeled in order of
    /// degree (descending by default, ascending when requested).
    ///
    /// The branching heuristics assume the inputs have been pre-sorted this
    /// way; it is a one-time O(n²) preprocessing step, not part of the
    /// search itself. The sort is stable, so equal-degree vertices keep
    /// their relative order and the result is deterministic.
    pub fn sorted_by_degree(&self, ascending: bool) -> Self {
        let mut order: Vec<usize> = (0..self.n).collect();
        if ascending {
            order.sort_by(|&a, &b| self.degree[a].cmp(&self.degree[b]));
        } else {
            order.sort_by(|&a, &b| self.degree[b].cmp(&self.degree[a]));
        }
        let mut g = Graph::new(self.n);
        for i in 0..self.n {
            g.label[i] = self.label[order[i]];
            g.degree[i] = self.degree[order[i]];
            for j in 0..self.n {
                g.adj[i][j] = self.adj[order[i]][order[j]];
            }
        }
        g
    }

    // ------------------------------------------------------------------
    // Loaders
    // ------------------------------------------------------------------

    /// Loads a graph file in the given format.
    pub fn load(path: impl AsRef<Path>, format: GraphFormat) -> Result<Self, GraphFormatError> {
        let file = File::open(path)?;
        match format {
            GraphFormat::Binary => Self::read_binary(BufReader::new(file)),
            GraphFormat::Lad => Self::read_lad(BufReader::new(file)),
        }
    }

    /// Reads the binary format: 16-bit little-endian words, starting with
    /// the vertex count, then one (ignored) label word per vertex, then per
    /// vertex an edge count followed by `(target, label)` pairs whose edge
    /// label is ignored.
    pub fn read_binary(mut reader: impl Read) -> Result<Self, GraphFormatError> {
        let n = read_word(&mut reader)? as usize;
        let mut g = Graph::new(n);
        for _ in 0..n {
            read_word(&mut reader)?; // vertex label word, unused
        }
        for v in 0..n {
            let edges = read_word(&mut reader)? as usize;
            for _ in 0..edges {
                let target = read_word(&mut reader)? as usize;
                read_word(&mut reader)?; // edge label word, unused
                if target >= n {
                    return Err(GraphFormatError::VertexOutOfRange { id: target, n });
                }
                g.add_edge(v, target);
            }
        }
        Ok(g)
    }

    /// Reads the LAD text format: the vertex count, then per vertex an
    /// adjacency count followed by that many neighbor ids.
    pub fn read_lad(reader: impl BufRead) -> Result<Self, GraphFormatError> {
        let mut tokens = Tokens::new(reader);
        let n = tokens.next_usize()?;
        let mut g = Graph::new(n);
        for v in 0..n {
            let edges = tokens.next_usize()?;
            for _ in 0..edges {
                let w = tokens.next_usize()?;
                if w >= n {
                    return Err(GraphFormatError::VertexOutOfRange { id: w, n });
                }
                g.add_edge(v, w);
            }
        }
        Ok(g)
    }
}

/// Reads one 16-bit little-endian word.
fn read_word(reader: &mut impl Read) -> Result<u16, GraphFormatError> {
    let mut buf = [0u8; 2];
    let mut filled = 0;
    while filled < 2 {
        let k = reader.read(&mut buf[filled..])?;
        if k == 0 {
            return Err(GraphFormatError::Truncated);
        }
        filled += k;
    }
    Ok(u16::from_le_bytes(buf))
}

/// Whitespace-separated integer tokenizer over a buffered reader.
struct Tokens<R> {
    reader: R,
    line: String,
    pos: usize,
}

impl<R: BufRead> Tokens<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            pos: 0,
        }
    }

    fn next_usize(&mut self) -> Result<usize, GraphFormatError> {
        loop {
            let rest = &self.line[self.pos..];
            let trimmed = rest.trim_start();
            if !trimmed.is_empty() {
                let start = self.line.len() - trimmed.len();
                let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
                let token = &trimmed[..end];
                let parsed = token
                    .parse::<usize>()
                    .map_err(|_| GraphFormatError::Malformed(format!("bad integer {token:?}")));
                self.pos = start + end;
                return parsed;
            }
            self.line.clear();
            self.pos = 0;
            if self.reader.read_line(&mut self.line)? == 0 {
                return Err(GraphFormatError::Truncated);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
