//! Constraint propagation to a fixpoint after each assignment.

use sgiso_common::Config;

use crate::bits::BitSet;
use crate::domains::{find_unit_domain, Domains};
use crate::encode::Encoding;
use crate::nogoods::{Assignment, NogoodStore, Trail};

const NO_DOMAIN: usize = usize::MAX;

/// Repeatedly fix unit domains and propagate their consequences,
/// until either nothing is unit or some domain wipes out. Assignments
/// made here go on the trail as non-decisions.
pub(crate) fn propagate(
    store: &mut NogoodStore,
    enc: &Encoding,
    config: &Config,
    domains: &mut Domains,
    trail: &mut Trail,
) -> bool {
    while let Some(idx) = find_unit_domain(domains) {
        let Some(value) = domains[idx].values.first_set() else {
            return false;
        };
        let assignment = Assignment {
            pattern_vertex: domains[idx].vertex as u32,
            target_vertex: value as u32,
        };

        domains[idx].fixed = true;
        trail.push_propagated(assignment);

        // nogoods are not learned when enumerating, so there is
        // nothing to watch either
        if !config.enumerate {
            store.propagate_watches(assignment, domains, trail);
        }

        if !propagate_simple_constraints(enc, domains, assignment) {
            return false;
        }

        if !cheap_all_different(enc.target_size, domains) {
            return false;
        }
    }

    true
}

/// All-different on the assigned value, plus adjacency on every layer
/// where the pattern pair is adjacent. Counts are recomputed here, so
/// stale counts left by watch propagation get fixed up too.
fn propagate_simple_constraints(
    enc: &Encoding,
    domains: &mut Domains,
    assignment: Assignment,
) -> bool {
    let p = assignment.pattern_vertex as usize;
    let t = assignment.target_vertex as usize;

    for d in domains.iter_mut() {
        if d.fixed {
            continue;
        }

        d.values.unset(t);

        let mask = enc.adjacency_mask(p, d.vertex);
        for g in 0..enc.layers {
            if mask & (1 << g) != 0 {
                enc.target_graphs[g].intersect_with_row(t, &mut d.values);
            }
        }

        // adjacent in the original graph: edge labels must match in
        // both directions
        if enc.has_edge_labels() && mask & 1 != 0 {
            let want_forward = enc.pattern_edge_label(d.vertex, p);
            let want_reverse = enc.pattern_edge_label(p, d.vertex);
            let candidates = d.values.clone();
            for c in candidates.ones() {
                if enc.target_edge_label(c, t) != want_forward
                    || enc.target_edge_label(t, c) != want_reverse
                {
                    d.values.unset(c);
                }
            }
        }

        d.count = d.values.count();
        if d.count == 0 {
            return false;
        }
    }

    true
}

/// One pass of counting-based all-different: domains are visited
/// smallest count first (bucket sorted, stable), accumulating a union.
/// If ever fewer values than domains have been seen, fail; if exactly
/// as many, those values form a Hall set and are stripped from every
/// later domain.
pub(crate) fn cheap_all_different(target_size: usize, domains: &mut Domains) -> bool {
    let n = domains.len();

    // singly linked bucket lists, one per count; counts above n all
    // land in bucket n
    let mut first = vec![NO_DOMAIN; n + 1];
    let mut next = vec![NO_DOMAIN; n];

    // iterate backwards so that each bucket keeps index order
    for i in (0..n).rev() {
        let count = domains[i].count.min(n);
        next[i] = first[count];
        first[count] = i;
    }

    let mut domains_so_far = BitSet::with_capacity(target_size);
    let mut hall = BitSet::with_capacity(target_size);
    let mut neighbours_so_far = 0;

    for &bucket_head in &first {
        let mut i = bucket_head;
        while i != NO_DOMAIN {
            let d = &mut domains[i];

            d.values.intersect_with_complement(&hall);
            d.count = d.values.count();
            if d.count == 0 {
                return false;
            }

            domains_so_far.union_with(&d.values);
            neighbours_so_far += 1;

            let seen = domains_so_far.count();
            if seen < neighbours_so_far {
                return false;
            } else if seen == neighbours_so_far {
                hall.union_with(&domains_so_far);
            }

            i = next[i];
        }
    }

    true
}
