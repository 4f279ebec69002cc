//! Shared fixtures: a brute-force reference matcher and small graphs.

use std::sync::Once;

use sgiso_solver::{AdjacencyGraph, Graph};

static TRACING: Once = Once::new();

/// Install a tracing subscriber honouring `RUST_LOG`, once per test
/// binary.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Count injective edge-preserving maps from pattern to target by
/// exhaustive search. With `induced`, non-edges must map to non-edges
/// as well.
pub fn brute_force_count(
    pattern: &AdjacencyGraph,
    target: &AdjacencyGraph,
    induced: bool,
) -> usize {
    let n = pattern.size();
    let m = target.size();
    if n > m {
        return 0;
    }
    let mut used = vec![false; m];
    let mut map = vec![0usize; n];
    extend(pattern, target, induced, 0, &mut map, &mut used)
}

/// Does any embedding exist at all?
pub fn brute_force_exists(
    pattern: &AdjacencyGraph,
    target: &AdjacencyGraph,
    induced: bool,
) -> bool {
    brute_force_count(pattern, target, induced) > 0
}

fn extend(
    pattern: &AdjacencyGraph,
    target: &AdjacencyGraph,
    induced: bool,
    depth: usize,
    map: &mut [usize],
    used: &mut [bool],
) -> usize {
    if depth == pattern.size() {
        return 1;
    }

    let mut count = 0;
    'candidate: for candidate in 0..target.size() {
        if used[candidate] {
            continue;
        }
        for earlier in 0..depth {
            if pattern.adjacent(depth, earlier) && !target.adjacent(candidate, map[earlier]) {
                continue 'candidate;
            }
            if induced && !pattern.adjacent(depth, earlier) && target.adjacent(candidate, map[earlier])
            {
                continue 'candidate;
            }
        }

        map[depth] = candidate;
        used[candidate] = true;
        count += extend(pattern, target, induced, depth + 1, map, used);
        used[candidate] = false;
    }
    count
}

/// The cycle on `n` vertices.
pub fn cycle(n: usize) -> AdjacencyGraph {
    let mut g = AdjacencyGraph::new(n);
    for i in 0..n {
        g.add_edge(i, (i + 1) % n);
    }
    g
}

/// The path on `n` vertices.
pub fn path(n: usize) -> AdjacencyGraph {
    let mut g = AdjacencyGraph::new(n);
    for i in 0..n.saturating_sub(1) {
        g.add_edge(i, i + 1);
    }
    g
}

/// The complete graph on `n` vertices.
pub fn complete(n: usize) -> AdjacencyGraph {
    let mut g = AdjacencyGraph::new(n);
    for i in 0..n {
        for j in i + 1..n {
            g.add_edge(i, j);
        }
    }
    g
}

/// The Petersen graph: outer 5-cycle, inner 5-star, matched spokes.
/// Triangle-free with girth 5, which makes it a handy refutation
/// target.
pub fn petersen() -> AdjacencyGraph {
    let mut g = AdjacencyGraph::new(10);
    for i in 0..5 {
        g.add_edge(i, (i + 1) % 5);
        g.add_edge(5 + i, 5 + (i + 2) % 5);
        g.add_edge(i, 5 + i);
    }
    g
}
