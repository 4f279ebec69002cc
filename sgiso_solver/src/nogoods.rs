//! Learned nogoods and their two-watched-literal store.

use tracing::trace;

use crate::domains::Domains;

/// One pattern-to-target assignment, in stripped pattern indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Assignment {
    pub(crate) pattern_vertex: u32,
    pub(crate) target_vertex: u32,
}

/// A trail entry. Decisions carry branching statistics for the
/// `where =` line; propagated assignments carry sentinels.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AssignmentRecord {
    pub(crate) assignment: Assignment,
    pub(crate) is_decision: bool,
    pub(crate) discrepancy_count: i32,
    pub(crate) choice_count: i32,
}

/// The in-order list of assignments made down the current branch.
#[derive(Clone, Debug, Default)]
pub(crate) struct Trail {
    pub(crate) records: Vec<AssignmentRecord>,
}

impl Trail {
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    pub(crate) fn push_decision(&mut self, assignment: Assignment, discrepancy: i32, choices: i32) {
        self.records.push(AssignmentRecord {
            assignment,
            is_decision: true,
            discrepancy_count: discrepancy,
            choice_count: choices,
        });
    }

    pub(crate) fn push_propagated(&mut self, assignment: Assignment) {
        self.records.push(AssignmentRecord {
            assignment,
            is_decision: false,
            discrepancy_count: -1,
            choice_count: -1,
        });
    }

    // TODO: this is a linear scan, as in every published implementation
    // of this scheme; a bitmap keyed by (pattern, target) would do
    pub(crate) fn contains(&self, assignment: Assignment) -> bool {
        self.records.iter().any(|r| r.assignment == assignment)
    }

    /// The decision literals, in trail order.
    pub(crate) fn decisions(&self) -> impl Iterator<Item = Assignment> + '_ {
        self.records
            .iter()
            .filter(|r| r.is_decision)
            .map(|r| r.assignment)
    }
}

/// A set of assignments that must not all hold together. When there
/// are at least two literals, the first two are the watches, and the
/// literal order is permuted as the watches move.
#[derive(Clone, Debug)]
pub(crate) struct Nogood {
    literals: Vec<Assignment>,
    signature: u64,
}

/// Arena handle for a stored nogood.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct NogoodRef(u32);

/// What integrating one incoming nogood told us.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Integration {
    /// The empty nogood: some worker finished the whole search.
    Done,
    Accepted,
    /// Dropped because a stored nogood already subsumes it.
    Subsumed,
}

/// All nogoods a worker knows, plus the watch lists that index them.
/// Each worker owns exactly one of these; nogoods learned elsewhere
/// arrive as plain literal lists and are copied in here.
pub(crate) struct NogoodStore {
    target_size: usize,
    arena: Vec<Nogood>,
    // indexed by target_size * pattern_vertex + target_vertex
    watches: Vec<Vec<NogoodRef>>,
}

impl NogoodStore {
    pub(crate) fn new(pattern_size: usize, target_size: usize) -> Self {
        NogoodStore {
            target_size,
            arena: Vec::new(),
            watches: vec![Vec::new(); pattern_size * target_size],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    fn watch_slot(&self, a: Assignment) -> usize {
        self.target_size * a.pattern_vertex as usize + a.target_vertex as usize
    }

    fn signature(&self, literals: &[Assignment]) -> u64 {
        literals
            .iter()
            .fold(0u64, |sig, a| sig | 1 << (self.watch_slot(*a) % 64))
    }

    /// Take an incoming nogood on board: the empty nogood signals that
    /// search is over; a unit nogood is applied to the root domains
    /// directly; anything longer gets watched on its first two
    /// literals, unless a stored nogood already subsumes it.
    pub(crate) fn integrate(&mut self, literals: Vec<Assignment>, domains: &mut Domains) -> Integration {
        if literals.is_empty() {
            return Integration::Done;
        }

        if let [unit] = literals[..] {
            for d in domains.iter_mut() {
                if d.vertex == unit.pattern_vertex as usize {
                    d.values.unset(unit.target_vertex as usize);
                    d.count = d.values.count();
                    break;
                }
            }
            return Integration::Accepted;
        }

        let signature = self.signature(&literals);
        if self.subsumed(&literals, signature) {
            trace!(len = literals.len(), "dropping subsumed nogood");
            return Integration::Subsumed;
        }

        let nref = NogoodRef(self.arena.len() as u32);
        let w0 = self.watch_slot(literals[0]);
        let w1 = self.watch_slot(literals[1]);
        self.arena.push(Nogood { literals, signature });
        self.watches[w0].push(nref);
        self.watches[w1].push(nref);
        Integration::Accepted
    }

    // the signature is a cheap superset filter; only candidates that
    // pass it get the full literal comparison
    fn subsumed(&self, literals: &[Assignment], signature: u64) -> bool {
        self.arena.iter().any(|n| {
            n.literals.len() <= literals.len()
                && n.signature & !signature == 0
                && n.literals.iter().all(|l| literals.contains(l))
        })
    }

    /// The assignment `current` has just been made: every nogood
    /// watching it either finds a replacement watch or forces its
    /// other watched literal out of the domains.
    pub(crate) fn propagate_watches(
        &mut self,
        current: Assignment,
        domains: &mut Domains,
        trail: &Trail,
    ) {
        let slot = self.watch_slot(current);
        let mut i = 0;
        while i < self.watches[slot].len() {
            let nref = self.watches[slot][i];

            let replacement = {
                let nogood = &mut self.arena[nref.0 as usize];
                // make the first watch the literal we just triggered
                if nogood.literals[0] != current {
                    nogood.literals.swap(0, 1);
                }
                let found = (2..nogood.literals.len())
                    .find(|&k| !trail.contains(nogood.literals[k]));
                found.map(|k| {
                    nogood.literals.swap(0, k);
                    nogood.literals[0]
                })
            };

            match replacement {
                Some(new_watch) => {
                    let new_slot = self.watch_slot(new_watch);
                    self.watches[new_slot].push(nref);
                    self.watches[slot].swap_remove(i);
                }
                None => {
                    // all other literals hold, so the second watch
                    // must not. the variable might already be fixed
                    // elsewhere, in which case there is nothing to do.
                    let forced = self.arena[nref.0 as usize].literals[1];
                    for d in domains.iter_mut() {
                        if !d.fixed && d.vertex == forced.pattern_vertex as usize {
                            d.values.unset(forced.target_vertex as usize);
                            break;
                        }
                    }
                    i += 1;
                }
            }
        }
    }
}
