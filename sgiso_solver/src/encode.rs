//! Turning a pattern/target pair into the bit-parallel form the search
//! runs on.
//!
//! Both graphs are recoded over the same set of relation layers: layer
//! 0 is plain adjacency, layers 1 to 4 connect vertices joined by at
//! least k length-2 paths, and the induced variant appends one more
//! layer holding the complement of layer 0. A pattern edge on layer g
//! can only ever be mapped to a target edge on layer g, which is what
//! makes the supplemental layers free extra pruning.

use std::collections::HashMap;

use sgiso_common::{Config, Graph};
use tracing::debug;

use crate::bits::BitGraph;

/// Number of length-2-path layers derived on top of plain adjacency.
const PATH_LAYERS: usize = 4;

/// Sentinel for "no label" in the dense edge-label tables.
const NO_LABEL: i32 = -1;

/// Everything precomputed about a pattern/target pair before search.
pub(crate) struct Encoding {
    /// Relation layers in use: 5, or 6 when induced.
    pub(crate) layers: usize,

    /// Pattern vertices actually searched over (isolated ones may have
    /// been stripped).
    pub(crate) pattern_size: usize,

    /// Pattern size as supplied by the caller.
    pub(crate) full_pattern_size: usize,

    pub(crate) target_size: usize,

    /// One bit-graph per layer, pattern side, in stripped indices.
    pub(crate) pattern_graphs: Vec<BitGraph>,

    /// One bit-graph per layer, target side.
    pub(crate) target_graphs: Vec<BitGraph>,

    /// For each stripped pattern pair (i, j), a mask of the layers on
    /// which they are adjacent. Lets propagation test all layers with
    /// one byte load.
    pub(crate) pattern_adjacency_masks: Vec<u8>,

    /// Stripped pattern index -> caller's pattern index.
    pub(crate) pattern_permutation: Vec<usize>,

    /// Caller-side indices of stripped isolated pattern vertices.
    pub(crate) isolated_vertices: Vec<usize>,

    /// Per layer, per vertex degree tables.
    pub(crate) pattern_degrees: Vec<Vec<usize>>,
    pub(crate) target_degrees: Vec<Vec<usize>>,

    /// Sum of layer-0 neighbour degrees per pattern vertex; the
    /// variable-choice tiebreak.
    pub(crate) pattern_degree_tiebreak: Vec<u64>,

    /// Largest layer-0 target degree, used by the biased value
    /// ordering.
    pub(crate) largest_target_degree: usize,

    /// Dense recoded labels; empty when the inputs are unlabelled.
    pub(crate) pattern_vertex_labels: Vec<i32>,
    pub(crate) target_vertex_labels: Vec<i32>,
    pub(crate) pattern_edge_labels: Vec<i32>,
    pub(crate) target_edge_labels: Vec<i32>,
}

impl Encoding {
    /// Build the full encoding. The caller has already validated sizes
    /// and feature combinations.
    pub(crate) fn build(pattern: &dyn Graph, target: &dyn Graph, config: &Config) -> Self {
        let layers = 5 + usize::from(config.induced);
        let full_pattern_size = pattern.size();
        let target_size = target.size();

        // strip isolated pattern vertices; they cannot constrain
        // anything, and get re-added to the mapping afterwards. Not
        // valid when induced (non-edges matter) or when enumerating
        // (it would conflate distinct solutions).
        let mut pattern_permutation = Vec::with_capacity(full_pattern_size);
        let mut isolated_vertices = Vec::new();
        for v in 0..full_pattern_size {
            if !config.induced && !config.enumerate && pattern.degree(v) == 0 && !pattern.adjacent(v, v) {
                isolated_vertices.push(v);
            } else {
                pattern_permutation.push(v);
            }
        }
        let pattern_size = pattern_permutation.len();

        let mut pattern_graphs = vec![BitGraph::new(pattern_size); layers];
        for i in 0..pattern_size {
            for j in 0..pattern_size {
                if pattern.adjacent(pattern_permutation[i], pattern_permutation[j]) {
                    pattern_graphs[0].add_edge(i, j);
                }
            }
        }

        let mut target_graphs = vec![BitGraph::new(target_size); layers];
        for i in 0..target_size {
            for j in 0..target_size {
                if target.adjacent(i, j) {
                    target_graphs[0].add_edge(i, j);
                }
            }
        }

        build_supplemental_layers(&mut pattern_graphs);
        build_supplemental_layers(&mut target_graphs);

        if config.induced {
            build_complement_layer(&mut pattern_graphs);
            build_complement_layer(&mut target_graphs);
        }

        let pattern_degrees: Vec<Vec<usize>> = pattern_graphs
            .iter()
            .map(|g| (0..pattern_size).map(|v| g.degree(v)).collect())
            .collect();
        let target_degrees: Vec<Vec<usize>> = target_graphs
            .iter()
            .map(|g| (0..target_size).map(|v| g.degree(v)).collect())
            .collect();

        let largest_target_degree = target_degrees[0].iter().copied().max().unwrap_or(0);

        let mut pattern_degree_tiebreak = vec![0u64; pattern_size];
        for i in 0..pattern_size {
            for j in pattern_graphs[0].row(i).ones() {
                pattern_degree_tiebreak[i] += pattern_degrees[0][j] as u64;
            }
        }

        // compressed per-pair layer masks, pattern side only
        let mut pattern_adjacency_masks = vec![0u8; pattern_size * pattern_size];
        for (g, graph) in pattern_graphs.iter().enumerate() {
            for i in 0..pattern_size {
                for j in graph.row(i).ones() {
                    pattern_adjacency_masks[i * pattern_size + j] |= 1 << g;
                }
            }
        }

        let (pattern_vertex_labels, target_vertex_labels) = if pattern.has_vertex_labels() {
            recode_vertex_labels(pattern, target, &pattern_permutation)
        } else {
            (Vec::new(), Vec::new())
        };

        let (pattern_edge_labels, target_edge_labels) = if pattern.has_edge_labels() {
            recode_edge_labels(pattern, target, &pattern_permutation)
        } else {
            (Vec::new(), Vec::new())
        };

        debug!(
            pattern_size,
            target_size,
            layers,
            stripped = isolated_vertices.len(),
            "encoded pattern/target pair"
        );

        Encoding {
            layers,
            pattern_size,
            full_pattern_size,
            target_size,
            pattern_graphs,
            target_graphs,
            pattern_adjacency_masks,
            pattern_permutation,
            isolated_vertices,
            pattern_degrees,
            target_degrees,
            pattern_degree_tiebreak,
            largest_target_degree,
            pattern_vertex_labels,
            target_vertex_labels,
            pattern_edge_labels,
            target_edge_labels,
        }
    }

    pub(crate) fn has_vertex_labels(&self) -> bool {
        !self.pattern_vertex_labels.is_empty()
    }

    pub(crate) fn has_edge_labels(&self) -> bool {
        !self.pattern_edge_labels.is_empty()
    }

    /// Layer mask for the stripped pattern pair (i, j).
    pub(crate) fn adjacency_mask(&self, i: usize, j: usize) -> u8 {
        self.pattern_adjacency_masks[i * self.pattern_size + j]
    }

    pub(crate) fn pattern_edge_label(&self, i: usize, j: usize) -> i32 {
        self.pattern_edge_labels[i * self.pattern_size + j]
    }

    pub(crate) fn target_edge_label(&self, i: usize, j: usize) -> i32 {
        self.target_edge_labels[i * self.target_size + j]
    }
}

/// Derive layers 1..=4: vertices joined by at least k length-2 paths.
///
/// For every vertex, walk its neighbours' neighbourhoods and count
/// paths into the lower triangle, then threshold the counts.
fn build_supplemental_layers(graphs: &mut [BitGraph]) {
    let size = graphs[0].size();
    let mut path_counts = vec![vec![0u32; size]; size];

    for v in 0..size {
        for c in graphs[0].row(v).ones() {
            for w in graphs[0].row(c).ones() {
                if w > v {
                    break;
                }
                path_counts[v][w] += 1;
            }
        }
    }

    for v in 0..size {
        for w in v..size {
            // counts live in the lower triangle
            let path_count = path_counts[w][v];
            for k in 1..=PATH_LAYERS as u32 {
                if path_count >= k {
                    graphs[k as usize].add_edge_symmetric(v, w);
                }
            }
        }
    }
}

/// Append the complement of layer 0 as the last layer, diagonal
/// excluded.
fn build_complement_layer(graphs: &mut [BitGraph]) {
    let size = graphs[0].size();
    let last = graphs.len() - 1;
    for v in 0..size {
        for w in 0..size {
            if v != w && !graphs[0].adjacent(v, w) {
                graphs[last].add_edge(v, w);
            }
        }
    }
}

/// Map label strings to dense ids shared between pattern and target.
fn recode_vertex_labels(
    pattern: &dyn Graph,
    target: &dyn Graph,
    pattern_permutation: &[usize],
) -> (Vec<i32>, Vec<i32>) {
    let mut ids: HashMap<String, i32> = HashMap::new();
    let mut next = 0;
    let mut intern = |label: Option<&str>| -> i32 {
        let Some(label) = label else { return NO_LABEL };
        *ids.entry(label.to_owned()).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        })
    };

    let pattern_labels = pattern_permutation
        .iter()
        .map(|&v| intern(pattern.vertex_label(v)))
        .collect();
    let target_labels = (0..target.size())
        .map(|v| intern(target.vertex_label(v)))
        .collect();
    (pattern_labels, target_labels)
}

/// As for vertex labels, but per directed edge; non-edges get the
/// sentinel.
fn recode_edge_labels(
    pattern: &dyn Graph,
    target: &dyn Graph,
    pattern_permutation: &[usize],
) -> (Vec<i32>, Vec<i32>) {
    let mut ids: HashMap<String, i32> = HashMap::new();
    let mut next = 0;
    let mut intern = |label: Option<&str>| -> i32 {
        let Some(label) = label else { return NO_LABEL };
        *ids.entry(label.to_owned()).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        })
    };

    let pattern_size = pattern_permutation.len();
    let mut pattern_labels = vec![NO_LABEL; pattern_size * pattern_size];
    for i in 0..pattern_size {
        for j in 0..pattern_size {
            let (pi, pj) = (pattern_permutation[i], pattern_permutation[j]);
            if pattern.adjacent(pi, pj) {
                pattern_labels[i * pattern_size + j] = intern(pattern.edge_label(pi, pj));
            }
        }
    }

    let target_size = target.size();
    let mut target_labels = vec![NO_LABEL; target_size * target_size];
    for i in 0..target_size {
        for j in 0..target_size {
            if target.adjacent(i, j) {
                target_labels[i * target_size + j] = intern(target.edge_label(i, j));
            }
        }
    }

    (pattern_labels, target_labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sgiso_common::AdjacencyGraph;

    fn path_graph(n: usize) -> AdjacencyGraph {
        let mut g = AdjacencyGraph::new(n);
        for v in 0..n.saturating_sub(1) {
            g.add_edge(v, v + 1);
        }
        g
    }

    #[test]
    fn layer_one_connects_two_step_neighbours() {
        // path 0-1-2-3: one length-2 path joins 0-2 and 1-3
        let g = path_graph(4);
        let enc = Encoding::build(&g, &g, &Config::default());

        assert_eq!(enc.layers, 5);
        assert!(enc.pattern_graphs[1].adjacent(0, 2));
        assert!(enc.pattern_graphs[1].adjacent(2, 0));
        assert!(enc.pattern_graphs[1].adjacent(1, 3));
        assert!(!enc.pattern_graphs[1].adjacent(0, 3));
        // nothing has two distinct length-2 paths in a path graph
        assert!(!enc.pattern_graphs[2].adjacent(0, 2));
    }

    #[test]
    fn layer_one_includes_two_step_self_paths() {
        // any vertex with a neighbour has a length-2 walk back to
        // itself, which counts as a path here (v <= v triangle)
        let g = path_graph(2);
        let enc = Encoding::build(&g, &g, &Config::default());
        assert!(enc.pattern_graphs[1].adjacent(0, 0));
        assert!(enc.pattern_graphs[1].adjacent(1, 1));
    }

    #[test]
    fn second_layer_needs_two_paths() {
        // 4-cycle: two length-2 paths join each diagonal pair
        let mut g = AdjacencyGraph::new(4);
        g.add_edge(0, 1);
        g.add_edge(1, 2);
        g.add_edge(2, 3);
        g.add_edge(3, 0);
        let enc = Encoding::build(&g, &g, &Config::default());
        assert!(enc.pattern_graphs[2].adjacent(0, 2));
        assert!(enc.pattern_graphs[2].adjacent(1, 3));
        assert!(!enc.pattern_graphs[3].adjacent(0, 2));
    }

    #[test]
    fn complement_layer_present_only_when_induced() {
        let g = path_graph(3);
        let plain = Encoding::build(&g, &g, &Config::default());
        assert_eq!(plain.layers, 5);

        let induced = Encoding::build(
            &g,
            &g,
            &Config {
                induced: true,
                ..Config::default()
            },
        );
        assert_eq!(induced.layers, 6);
        assert!(induced.pattern_graphs[5].adjacent(0, 2));
        assert!(!induced.pattern_graphs[5].adjacent(0, 1));
        assert!(!induced.pattern_graphs[5].adjacent(0, 0));
    }

    #[test]
    fn isolated_vertices_stripped_outside_induced_mode() {
        let mut g = AdjacencyGraph::new(4);
        g.add_edge(0, 1);
        // 2 and 3 are isolated
        let target = AdjacencyGraph::new(4);

        let enc = Encoding::build(&g, &target, &Config::default());
        assert_eq!(enc.full_pattern_size, 4);
        assert_eq!(enc.pattern_size, 2);
        assert_eq!(enc.isolated_vertices, vec![2, 3]);
        assert_eq!(enc.pattern_permutation, vec![0, 1]);

        let enc = Encoding::build(
            &g,
            &target,
            &Config {
                induced: true,
                ..Config::default()
            },
        );
        assert_eq!(enc.pattern_size, 4);
        assert!(enc.isolated_vertices.is_empty());
    }

    #[test]
    fn adjacency_masks_cover_all_layers() {
        let g = path_graph(3);
        let enc = Encoding::build(&g, &g, &Config::default());
        // 0 and 1 are adjacent on layer 0; 0 and 2 only on layer 1
        assert_eq!(enc.adjacency_mask(0, 1) & 1, 1);
        assert_eq!(enc.adjacency_mask(0, 2) & 1, 0);
        assert_eq!(enc.adjacency_mask(0, 2) & 2, 2);
    }

    #[test]
    fn tiebreak_sums_neighbour_degrees() {
        let g = path_graph(4);
        let enc = Encoding::build(&g, &g, &Config::default());
        // degrees: 1 2 2 1; vertex 1 neighbours 0 and 2
        assert_eq!(enc.pattern_degree_tiebreak[1], 3);
        assert_eq!(enc.pattern_degree_tiebreak[0], 2);
    }

    #[test]
    fn labels_recode_to_shared_ids() {
        let mut p = AdjacencyGraph::new(2);
        p.add_edge(0, 1);
        p.set_vertex_label(0, "a");
        p.set_vertex_label(1, "b");
        let mut t = AdjacencyGraph::new(3);
        t.add_edge(0, 1);
        t.set_vertex_label(0, "b");
        t.set_vertex_label(1, "a");
        t.set_vertex_label(2, "c");

        let enc = Encoding::build(&p, &t, &Config::default());
        assert!(enc.has_vertex_labels());
        assert_eq!(enc.pattern_vertex_labels[0], enc.target_vertex_labels[1]);
        assert_eq!(enc.pattern_vertex_labels[1], enc.target_vertex_labels[0]);
        assert_ne!(enc.target_vertex_labels[2], enc.pattern_vertex_labels[0]);
        assert_ne!(enc.target_vertex_labels[2], enc.pattern_vertex_labels[1]);
    }
}
