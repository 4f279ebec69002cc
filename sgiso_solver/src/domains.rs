//! Per-pattern-vertex candidate sets and their initial filtering.

use itertools::Itertools;
use tracing::debug;

use crate::bits::BitSet;
use crate::encode::Encoding;

/// The target vertices still considered possible for one pattern
/// vertex. Bitsets only ever shrink down a search branch; an empty one
/// means the branch is dead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Domain {
    /// The stripped pattern vertex this domain belongs to.
    pub(crate) vertex: usize,
    /// Cached population count of `values`.
    pub(crate) count: usize,
    /// Set once the single remaining candidate has been committed.
    pub(crate) fixed: bool,
    pub(crate) values: BitSet,
}

pub(crate) type Domains = Vec<Domain>;

/// Index of some unfixed domain with exactly one candidate, if any.
pub(crate) fn find_unit_domain(domains: &Domains) -> Option<usize> {
    domains.iter().position(|d| !d.fixed && d.count == 1)
}

/// Deep-copy the unfixed domains, shrinking `branch_vertex` to the
/// single value `branch_value`. Fixed domains are dropped; their
/// assignments already live on the trail.
pub(crate) fn branch_domains(domains: &Domains, branch_vertex: usize, branch_value: usize) -> Domains {
    let mut new_domains = Vec::with_capacity(domains.len());
    for d in domains {
        if d.fixed {
            continue;
        }

        let mut copy = d.clone();
        if copy.vertex == branch_vertex {
            copy.values.unset_all();
            copy.values.set(branch_value);
            copy.count = 1;
        }
        new_domains.push(copy);
    }
    new_domains
}

/// Build the initial domains, or `None` if the instance is already
/// infeasible.
///
/// A target vertex j survives as a candidate for pattern vertex i only
/// if, on every layer: i's self-loop implies j's; j's degree dominates
/// i's; and j's neighbourhood degree sequence entrywise dominates i's.
/// Vertex labels, when present, must match exactly. Target
/// neighbourhood degree sequences are built lazily since most target
/// vertices are never compared.
pub(crate) fn initialise_domains(enc: &Encoding) -> Option<Domains> {
    // When induced, the complement layer rarely prunes anything if the
    // pattern is much sparser than the target; skip its degree checks
    // in that case.
    let mut degree_layers = enc.layers;
    if enc.layers > 5 {
        let largest_pattern = enc.pattern_degrees[enc.layers - 1].iter().copied().max();
        let smallest_target = enc.target_degrees[enc.layers - 1].iter().copied().min();
        if let (Some(p), Some(t)) = (largest_pattern, smallest_target)
            && p < t
        {
            degree_layers -= 1;
        }
    }

    let pattern_nds: Vec<Vec<Vec<usize>>> = (0..degree_layers)
        .map(|g| {
            (0..enc.pattern_size)
                .map(|i| neighbourhood_degree_sequence(enc, g, i, true))
                .collect()
        })
        .collect();

    let mut target_nds: Vec<Option<Vec<Vec<usize>>>> = vec![None; enc.target_size];

    let mut domains: Domains = (0..enc.pattern_size)
        .map(|vertex| Domain {
            vertex,
            count: 0,
            fixed: false,
            values: BitSet::with_capacity(enc.target_size),
        })
        .collect();

    for i in 0..enc.pattern_size {
        'candidate: for j in 0..enc.target_size {
            if enc.has_vertex_labels() && enc.pattern_vertex_labels[i] != enc.target_vertex_labels[j]
            {
                continue;
            }

            // loop consistency, all layers
            for g in 0..enc.layers {
                if enc.pattern_graphs[g].adjacent(i, i) && !enc.target_graphs[g].adjacent(j, j) {
                    continue 'candidate;
                }
            }

            // degree and neighbourhood degree sequence dominance
            for g in 0..degree_layers {
                if enc.target_degrees[g][j] < enc.pattern_degrees[g][i] {
                    continue 'candidate;
                }

                let t_nds = target_nds[j].get_or_insert_with(|| {
                    (0..degree_layers)
                        .map(|h| neighbourhood_degree_sequence(enc, h, j, false))
                        .collect()
                });

                let p_nds = &pattern_nds[g][i];
                if t_nds[g].len() < p_nds.len() {
                    continue 'candidate;
                }
                for (t, p) in t_nds[g].iter().zip(p_nds) {
                    if t < p {
                        continue 'candidate;
                    }
                }
            }

            domains[i].values.set(j);
        }

        domains[i].count = domains[i].values.count();
        if domains[i].count == 0 {
            debug!(pattern_vertex = i, "empty initial domain");
            return None;
        }
    }

    // if the union of all domains is too small, no all-different total
    // assignment can exist
    let mut union = BitSet::with_capacity(enc.target_size);
    for d in &domains {
        union.union_with(&d.values);
    }
    if union.count() < enc.pattern_size {
        debug!("domain union smaller than pattern, unsatisfiable");
        return None;
    }

    Some(domains)
}

/// Multiset of neighbour degrees on layer `g`, sorted descending.
fn neighbourhood_degree_sequence(
    enc: &Encoding,
    g: usize,
    vertex: usize,
    pattern_side: bool,
) -> Vec<usize> {
    let (graphs, degrees) = if pattern_side {
        (&enc.pattern_graphs, &enc.pattern_degrees)
    } else {
        (&enc.target_graphs, &enc.target_degrees)
    };
    graphs[g]
        .row(vertex)
        .ones()
        .map(|w| degrees[g][w])
        .sorted_unstable_by(|a, b| b.cmp(a))
        .collect()
}
