//! The outcome of a solve call.

use std::collections::BTreeMap;

/// Everything a solve call reports back.
///
/// One of these is produced per worker and merged additively into the
/// value the caller sees. An empty `isomorphism` with `complete = true`
/// means the instance is unsatisfiable; an empty one with
/// `complete = false` means the run was aborted first.
#[derive(Clone, Debug, Default)]
pub struct SolveResult {
    /// The mapping from pattern vertex to target vertex, empty if no
    /// solution was found.
    pub isomorphism: BTreeMap<usize, usize>,

    /// Search tree nodes visited.
    pub nodes: u64,

    /// Number of propagation calls.
    pub propagations: u64,

    /// Number of solutions, only meaningful when enumerating.
    pub solution_count: u64,

    /// True if the search space was exhausted rather than aborted.
    pub complete: bool,

    /// Free-form per-run statistics, one `key = value` line each.
    pub extra_stats: Vec<String>,
}

impl SolveResult {
    /// Fold another worker's result into this one. Counters add, the
    /// larger mapping wins, and `other`'s stats are appended with
    /// `prefix` prepended to each line.
    pub fn merge(&mut self, prefix: &str, other: SolveResult) {
        if other.isomorphism.len() > self.isomorphism.len() {
            self.isomorphism = other.isomorphism;
        }

        self.nodes += other.nodes;
        self.propagations += other.propagations;
        self.solution_count += other.solution_count;
        self.complete = self.complete || other.complete;

        for stat in other.extra_stats {
            self.extra_stats.push(format!("{prefix}{stat}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_adds_counters_and_keeps_larger_mapping() {
        let mut a = SolveResult {
            nodes: 10,
            propagations: 5,
            ..SolveResult::default()
        };

        let mut b = SolveResult {
            nodes: 7,
            propagations: 3,
            complete: true,
            ..SolveResult::default()
        };
        b.isomorphism.insert(0, 1);
        b.extra_stats.push("restarts = 2".to_owned());

        a.merge("t1.", b);
        assert_eq!(a.nodes, 17);
        assert_eq!(a.propagations, 8);
        assert!(a.complete);
        assert_eq!(a.isomorphism.get(&0), Some(&1));
        assert_eq!(a.extra_stats, vec!["t1.restarts = 2".to_owned()]);
    }

    #[test]
    fn merge_does_not_replace_mapping_with_smaller() {
        let mut a = SolveResult::default();
        a.isomorphism.insert(0, 0);
        a.isomorphism.insert(1, 2);

        let mut b = SolveResult::default();
        b.isomorphism.insert(0, 1);

        a.merge("", b);
        assert_eq!(a.isomorphism.len(), 2);
        assert_eq!(a.isomorphism.get(&0), Some(&0));
    }
}
