//! The read-only graph interface consumed by the solver.
//!
//! File parsing lives outside this workspace; whatever reads LAD or
//! DIMACS or anything else hands the solver an object implementing
//! [`Graph`]. The solver never mutates a graph, and only ever asks the
//! questions below.

use std::collections::HashMap;

/// A read-only adjacency source.
///
/// Vertices are `0..size()`. Adjacency is symmetric for undirected
/// graphs, but the solver does not assume it: `adjacent(u, v)` and
/// `adjacent(v, u)` are queried independently where it matters (edge
/// labels). Self-loops are allowed.
pub trait Graph {
    /// Number of vertices.
    fn size(&self) -> usize;

    /// Is there an edge from `u` to `v`?
    fn adjacent(&self, u: usize, v: usize) -> bool;

    /// Degree of `v` (number of distinct neighbours).
    fn degree(&self, v: usize) -> usize;

    /// Label of vertex `v`, if this graph carries vertex labels.
    fn vertex_label(&self, _v: usize) -> Option<&str> {
        None
    }

    /// Label of the edge from `u` to `v`, if this graph carries edge
    /// labels. Forward and reverse labels may differ.
    fn edge_label(&self, _u: usize, _v: usize) -> Option<&str> {
        None
    }

    /// Does any vertex carry a label?
    fn has_vertex_labels(&self) -> bool {
        false
    }

    /// Does any edge carry a label?
    fn has_edge_labels(&self) -> bool {
        false
    }
}

/// A straightforward owned adjacency-matrix graph.
///
/// This is the builder used by the test suite and by callers that do
/// not already have a graph representation of their own.
#[derive(Clone, Debug, Default)]
pub struct AdjacencyGraph {
    size: usize,
    adjacency: Vec<bool>,
    vertex_labels: HashMap<usize, String>,
    edge_labels: HashMap<(usize, usize), String>,
}

impl AdjacencyGraph {
    /// Create a graph with `size` vertices and no edges.
    pub fn new(size: usize) -> Self {
        AdjacencyGraph {
            size,
            adjacency: vec![false; size * size],
            vertex_labels: HashMap::new(),
            edge_labels: HashMap::new(),
        }
    }

    /// Add an undirected edge between `u` and `v`.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is out of range.
    pub fn add_edge(&mut self, u: usize, v: usize) {
        assert!(u < self.size && v < self.size, "edge endpoint out of range");
        self.adjacency[u * self.size + v] = true;
        self.adjacency[v * self.size + u] = true;
    }

    /// Label vertex `v`.
    pub fn set_vertex_label(&mut self, v: usize, label: impl Into<String>) {
        self.vertex_labels.insert(v, label.into());
    }

    /// Label the directed edge from `u` to `v`. Call twice (once per
    /// direction) for a symmetric labelling.
    pub fn set_edge_label(&mut self, u: usize, v: usize, label: impl Into<String>) {
        self.edge_labels.insert((u, v), label.into());
    }
}

impl Graph for AdjacencyGraph {
    fn size(&self) -> usize {
        self.size
    }

    fn adjacent(&self, u: usize, v: usize) -> bool {
        self.adjacency[u * self.size + v]
    }

    fn degree(&self, v: usize) -> usize {
        (0..self.size).filter(|&w| w != v && self.adjacent(v, w)).count()
    }

    fn vertex_label(&self, v: usize) -> Option<&str> {
        self.vertex_labels.get(&v).map(String::as_str)
    }

    fn edge_label(&self, u: usize, v: usize) -> Option<&str> {
        self.edge_labels.get(&(u, v)).map(String::as_str)
    }

    fn has_vertex_labels(&self) -> bool {
        !self.vertex_labels.is_empty()
    }

    fn has_edge_labels(&self) -> bool {
        !self.edge_labels.is_empty()
    }
}
