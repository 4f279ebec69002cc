//! The backtracking search itself, one restart sequence at a time.
//!
//! The recursion is flattened into an explicit stack of frames, one
//! per open node. Each frame owns its domains, the ordered candidate
//! values for its branch variable, and a cursor into them; outcomes
//! bubble up by popping frames. The trail of assignments is shared
//! across frames and truncated on backtrack.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sgiso_common::{Config, SolveResult, ValueOrdering};
use tracing::trace;

use crate::domains::{branch_domains, Domain, Domains};
use crate::encode::Encoding;
use crate::nogoods::{Assignment, NogoodStore, Trail};
use crate::propagate::propagate;

/// What one restart sequence of search concluded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SearchResult {
    /// A full assignment was found; it is on the trail.
    Satisfiable,
    /// A solution was counted but enumeration continues.
    SatisfiableButKeepGoing,
    Unsatisfiable,
    Aborted,
    /// The restart budget ran out; nogoods are in the outbox.
    Restart,
}

/// Per-worker mutable search state: the nogood store, the outbox of
/// freshly learned nogoods awaiting exchange, and the worker's RNG.
pub(crate) struct SearchData {
    pub(crate) store: NogoodStore,
    pub(crate) outbox: Vec<Vec<Assignment>>,
    pub(crate) rng: SmallRng,
}

impl SearchData {
    pub(crate) fn new(pattern_size: usize, target_size: usize, seed: u64) -> Self {
        SearchData {
            store: NogoodStore::new(pattern_size, target_size),
            outbox: Vec::new(),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Queue the empty nogood, telling every worker on every host to
    /// stop at the next round boundary. Unlike ordinary learning this
    /// is never gated: workers that miss it would wait on the round
    /// barriers forever.
    pub(crate) fn post_terminal(&mut self) {
        self.outbox.push(Vec::new());
    }
}

struct Frame {
    domains: Domains,
    branch_vertex: usize,
    candidates: Vec<usize>,
    next_candidate: usize,
    /// Trail length right before the current child's decision.
    pending_restore: usize,
    hit_failure: bool,
    hit_success: bool,
}

enum NodeOpened {
    Expanded(Frame),
    Leaf(SearchResult),
}

enum Delivered {
    Continue,
    Return(SearchResult),
}

/// Learn the decisions currently on the trail as a nogood, destined
/// for the next exchange round.
pub(crate) fn post_nogood(sd: &mut SearchData, config: &Config, trail: &Trail) {
    if config.enumerate || config.nogood_size_limit == 0 {
        return;
    }

    let literals: Vec<Assignment> = trail.decisions().collect();
    if literals.len() as u32 > config.nogood_size_limit {
        return;
    }

    trace!(len = literals.len(), "learned nogood");
    sd.outbox.push(literals);
}

/// Smallest domain first; ties broken by higher pattern degree, then
/// by higher total neighbour degree.
fn find_branch_domain<'a>(enc: &Encoding, domains: &'a Domains) -> Option<&'a Domain> {
    domains.iter().filter(|d| !d.fixed).min_by_key(|d| {
        (
            d.count,
            Reverse(enc.pattern_degrees[0][d.vertex]),
            Reverse(enc.pattern_degree_tiebreak[d.vertex]),
        )
    })
}

/// Softmax over target degrees, with shifts of a fixed base standing
/// in for exponentials. Floating point was much too slow here, and the
/// base turns out not to matter.
fn softmax_shuffle(rng: &mut SmallRng, enc: &Encoding, candidates: &mut [usize]) {
    let largest = enc.largest_target_degree as i32;
    let expish = |degree: usize| -> i64 {
        // leave 18 bits of headroom so the weights can be summed
        let shift = (degree as i32 - largest + (i64::BITS as i32 - 1 - 18)).max(0);
        1i64 << shift
    };

    let mut total: i64 = candidates
        .iter()
        .map(|&v| expish(enc.target_degrees[0][v]))
        .sum();

    for start in 0..candidates.len() {
        let mut score = rng.gen_range(1..=total);

        let mut selected = start;
        while selected + 1 < candidates.len() {
            score -= expish(enc.target_degrees[0][candidates[selected]]);
            if score <= 0 {
                break;
            }
            selected += 1;
        }

        total -= expish(enc.target_degrees[0][candidates[selected]]);
        candidates.swap(selected, start);
    }
}

fn order_candidates(sd: &mut SearchData, enc: &Encoding, config: &Config, candidates: &mut [usize]) {
    match config.value_ordering {
        ValueOrdering::Degree => {
            candidates.sort_by(|&a, &b| enc.target_degrees[0][b].cmp(&enc.target_degrees[0][a]));
        }
        ValueOrdering::AntiDegree => {
            candidates.sort_by(|&a, &b| enc.target_degrees[0][a].cmp(&enc.target_degrees[0][b]));
        }
        ValueOrdering::Biased => softmax_shuffle(&mut sd.rng, enc, candidates),
        ValueOrdering::Random => candidates.shuffle(&mut sd.rng),
    }
}

/// Open a node over `domains`: either a leaf outcome, or a frame ready
/// to branch.
fn open_node(
    sd: &mut SearchData,
    enc: &Encoding,
    config: &Config,
    domains: Domains,
    result: &mut SolveResult,
) -> NodeOpened {
    if config.abort.load(Ordering::Relaxed) {
        return NodeOpened::Leaf(SearchResult::Aborted);
    }

    result.nodes += 1;

    let Some(branch) = find_branch_domain(enc, &domains) else {
        return if config.enumerate {
            result.solution_count += 1;
            NodeOpened::Leaf(SearchResult::SatisfiableButKeepGoing)
        } else {
            NodeOpened::Leaf(SearchResult::Satisfiable)
        };
    };

    let branch_vertex = branch.vertex;
    let mut candidates: Vec<usize> = branch.values.ones().collect();
    order_candidates(sd, enc, config, &mut candidates);

    NodeOpened::Expanded(Frame {
        domains,
        branch_vertex,
        candidates,
        next_candidate: 0,
        pending_restore: 0,
        hit_failure: false,
        hit_success: false,
    })
}

/// Decrement the backtrack budget and check the round deadline. Only
/// called when a node closed having seen at least one failure.
fn restart_due(budget: &mut i64, restart_at: Option<Instant>) -> bool {
    if *budget > 0 {
        *budget -= 1;
        if *budget == 0 {
            return true;
        }
    }
    restart_at.is_some_and(|at| Instant::now() > at)
}

/// Hand a finished child's outcome to the frame on top of the stack.
/// Restarts unwind the whole stack, posting a nogood at each level for
/// every value already tried there.
fn deliver(
    outcome: SearchResult,
    stack: &mut Vec<Frame>,
    trail: &mut Trail,
    sd: &mut SearchData,
    config: &Config,
) -> Delivered {
    let mut outcome = outcome;
    loop {
        // a solution or an abort unwinds without restoring the trail
        if matches!(outcome, SearchResult::Satisfiable | SearchResult::Aborted) {
            return Delivered::Return(outcome);
        }

        let Some(frame) = stack.last_mut() else {
            return Delivered::Return(outcome);
        };
        trail.truncate(frame.pending_restore);

        match outcome {
            SearchResult::SatisfiableButKeepGoing => {
                frame.hit_success = true;
                return Delivered::Continue;
            }
            SearchResult::Unsatisfiable => {
                frame.hit_failure = true;
                return Delivered::Continue;
            }
            SearchResult::Restart => {
                // everything tried at this level so far is now known
                // bad, and makes a nogood together with the decisions
                // above us
                let tried = frame.next_candidate - 1;
                for &value in &frame.candidates[..tried] {
                    let assignment = Assignment {
                        pattern_vertex: frame.branch_vertex as u32,
                        target_vertex: value as u32,
                    };
                    trail.push_decision(assignment, -2, -2);
                    post_nogood(sd, config, trail);
                    trail.records.pop();
                }
                stack.pop();
                outcome = SearchResult::Restart;
            }
            SearchResult::Satisfiable | SearchResult::Aborted => unreachable!(),
        }
    }
}

/// One restart sequence of backtracking search from `root_domains`,
/// with the given backtrack budget and optional round deadline.
#[allow(clippy::too_many_arguments)]
pub(crate) fn restarting_search(
    sd: &mut SearchData,
    enc: &Encoding,
    config: &Config,
    trail: &mut Trail,
    root_domains: &Domains,
    result: &mut SolveResult,
    mut backtracks_until_restart: i64,
    restart_at: Option<Instant>,
    do_a_restart: &AtomicBool,
) -> SearchResult {
    let mut stack: Vec<Frame> = Vec::new();
    match open_node(sd, enc, config, root_domains.clone(), result) {
        NodeOpened::Expanded(frame) => stack.push(frame),
        NodeOpened::Leaf(outcome) => return outcome,
    }

    while let Some(frame) = stack.last_mut() {
        if frame.next_candidate >= frame.candidates.len() {
            // node exhausted: close it, possibly kicking off a restart
            let restart = do_a_restart.load(Ordering::Relaxed)
                || (frame.hit_failure && restart_due(&mut backtracks_until_restart, restart_at));
            let outcome = if restart {
                do_a_restart.store(true, Ordering::Relaxed);
                post_nogood(sd, config, trail);
                SearchResult::Restart
            } else if frame.hit_success {
                SearchResult::SatisfiableButKeepGoing
            } else {
                SearchResult::Unsatisfiable
            };
            stack.pop();
            match deliver(outcome, &mut stack, trail, sd, config) {
                Delivered::Continue => {}
                Delivered::Return(r) => return r,
            }
            continue;
        }

        let index = frame.next_candidate;
        frame.next_candidate += 1;
        let value = frame.candidates[index];

        frame.pending_restore = trail.len();
        trail.push_decision(
            Assignment {
                pattern_vertex: frame.branch_vertex as u32,
                target_vertex: value as u32,
            },
            index as i32,
            frame.candidates.len() as i32,
        );

        let mut new_domains = branch_domains(&frame.domains, frame.branch_vertex, value);
        result.propagations += 1;
        if !propagate(&mut sd.store, enc, config, &mut new_domains, trail) {
            trail.truncate(frame.pending_restore);
            frame.hit_failure = true;
            continue;
        }

        match open_node(sd, enc, config, new_domains, result) {
            NodeOpened::Expanded(child) => stack.push(child),
            NodeOpened::Leaf(outcome) => match deliver(outcome, &mut stack, trail, sd, config) {
                Delivered::Continue => {}
                Delivered::Return(r) => return r,
            },
        }
    }

    SearchResult::Unsatisfiable
}

struct DdsFrame {
    domains: Domains,
    branch_vertex: usize,
    candidates: Vec<usize>,
    next_candidate: usize,
    discrepancies_allowed: usize,
    pending_restore: usize,
}

/// One pass of discrepancy-bounded search: with allowance 0 only the
/// first value at each node may be taken, with allowance 1 only the
/// others, and larger allowances are spent one per discrepancy on the
/// way down. The driver iterates the allowance from 0 upwards.
pub(crate) fn dds_search(
    sd: &mut SearchData,
    enc: &Encoding,
    config: &Config,
    trail: &mut Trail,
    root_domains: &Domains,
    result: &mut SolveResult,
    discrepancies_allowed: usize,
) -> SearchResult {
    if config.abort.load(Ordering::Relaxed) {
        return SearchResult::Aborted;
    }
    result.nodes += 1;

    let mut stack: Vec<DdsFrame> = Vec::new();
    match dds_frame(enc, root_domains.clone(), discrepancies_allowed) {
        Some(frame) => stack.push(frame),
        None => return SearchResult::Satisfiable,
    }

    while let Some(frame) = stack.last_mut() {
        let Some(index) = next_allowed_candidate(frame) else {
            stack.pop();
            if let Some(parent) = stack.last_mut() {
                trail.truncate(parent.pending_restore);
            }
            continue;
        };
        let value = frame.candidates[index];

        frame.pending_restore = trail.len();
        trail.push_decision(
            Assignment {
                pattern_vertex: frame.branch_vertex as u32,
                target_vertex: value as u32,
            },
            index as i32,
            frame.candidates.len() as i32,
        );

        let mut new_domains = branch_domains(&frame.domains, frame.branch_vertex, value);
        result.propagations += 1;
        if !propagate(&mut sd.store, enc, config, &mut new_domains, trail) {
            trail.truncate(frame.pending_restore);
            continue;
        }

        let child_allowance = frame.discrepancies_allowed.saturating_sub(1);
        if config.abort.load(Ordering::Relaxed) {
            return SearchResult::Aborted;
        }
        result.nodes += 1;
        match dds_frame(enc, new_domains, child_allowance) {
            Some(child) => stack.push(child),
            None => return SearchResult::Satisfiable,
        }
    }

    SearchResult::Unsatisfiable
}

/// A frame for `domains` under `discrepancies_allowed`, or `None` if
/// everything is already assigned.
fn dds_frame(enc: &Encoding, domains: Domains, discrepancies_allowed: usize) -> Option<DdsFrame> {
    let branch = find_branch_domain(enc, &domains)?;
    let branch_vertex = branch.vertex;
    let candidates: Vec<usize> = branch.values.ones().collect();
    Some(DdsFrame {
        domains,
        branch_vertex,
        candidates,
        next_candidate: 0,
        discrepancies_allowed,
        pending_restore: 0,
    })
}

/// The next candidate index this frame's allowance permits, stepping
/// the cursor past it.
fn next_allowed_candidate(frame: &mut DdsFrame) -> Option<usize> {
    while frame.next_candidate < frame.candidates.len() {
        let index = frame.next_candidate;
        frame.next_candidate += 1;

        let allowed = match frame.discrepancies_allowed {
            0 => index == 0,
            1 => index != 0,
            _ => true,
        };
        if allowed {
            return Some(index);
        }
    }
    None
}
