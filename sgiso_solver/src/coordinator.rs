//! Driving the worker pool through barrier-phased restart rounds.
//!
//! Workers search independently between restarts; at each restart
//! round boundary they rendezvous on three barriers. First everyone
//! hands its freshly learned nogoods to the first worker, which merges
//! them across hosts through the collective; then everyone integrates
//! the merged batch into its own store and root domains; then search
//! resumes. A worker that finishes queues the empty nogood, so the
//! whole pool (and every other host) stops at the next boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Barrier, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use sgiso_common::{Config, SolveResult};
use tracing::{debug, info};

use crate::domains::{initialise_domains, Domains};
use crate::encode::Encoding;
use crate::exchange::{Collective, NogoodMessage};
use crate::nogoods::{Assignment, Integration, Trail};
use crate::propagate::propagate;
use crate::restarts::RestartSchedule;
use crate::search::{dds_search, restarting_search, SearchData, SearchResult};

/// Worker threads to actually run.
pub(crate) fn effective_threads(config: &Config) -> usize {
    if config.n_threads == 0 {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        config.n_threads
    }
}

/// Arms the abort flag after a wall-clock budget, unless dropped
/// first.
struct SearchTimer {
    state: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SearchTimer {
    fn start(timeout: Duration, abort: Arc<AtomicBool>) -> Option<SearchTimer> {
        if timeout.is_zero() {
            return None;
        }

        let state = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_state = Arc::clone(&state);
        let handle = thread::spawn(move || {
            let (lock, cvar) = &*thread_state;
            let Ok(guard) = lock.lock() else { return };
            let Ok((finished, _)) =
                cvar.wait_timeout_while(guard, timeout, |finished| !*finished)
            else {
                return;
            };
            if !*finished {
                info!(?timeout, "search timed out");
                abort.store(true, Ordering::Relaxed);
            }
        });

        Some(SearchTimer { state, handle: Some(handle) })
    }
}

impl Drop for SearchTimer {
    fn drop(&mut self) {
        let (lock, cvar) = &*self.state;
        if let Ok(mut finished) = lock.lock() {
            *finished = true;
        }
        cvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct RoundBarriers {
    ready: Barrier,
    communicated: Barrier,
    resumed: Barrier,
}

/// The intra-host nogood hand-off: every worker but the first sends
/// its outbox to the first worker at each round boundary.
struct WorkerLinks {
    to_zero: Option<Sender<Vec<Vec<Assignment>>>>,
    from_others: Option<Vec<Receiver<Vec<Vec<Assignment>>>>>,
}

/// Solve an encoded instance on this host, cooperating through the
/// collective. Validation has already happened.
pub(crate) fn solve_with(
    enc: &Encoding,
    config: &Config,
    collective: &dyn Collective,
) -> SolveResult {
    let _timer = SearchTimer::start(config.timeout, Arc::clone(&config.abort));

    if config.dds {
        solve_dds(enc, config)
    } else {
        run_workers(enc, config, collective)
    }
}

fn run_workers(enc: &Encoding, config: &Config, collective: &dyn Collective) -> SolveResult {
    let mut early = SolveResult::default();
    let Some(top_domains) = initialise_domains(enc) else {
        early.complete = true;
        return early;
    };

    let n_threads = effective_threads(config);
    debug!(n_threads, rank = collective.rank(), "starting worker pool");
    let started = Instant::now();

    let shared_result = Mutex::new(early);
    let do_a_restart = AtomicBool::new(false);
    let barriers = RoundBarriers {
        ready: Barrier::new(n_threads),
        communicated: Barrier::new(n_threads),
        resumed: Barrier::new(n_threads),
    };
    let combined: Mutex<Vec<Vec<Assignment>>> = Mutex::new(Vec::new());

    let mut to_zero = Vec::new();
    let mut from_others = Vec::new();
    for _ in 1..n_threads {
        let (tx, rx) = mpsc::channel();
        to_zero.push(tx);
        from_others.push(rx);
    }

    thread::scope(|scope| {
        let mut from_others = Some(from_others);
        let top_domains = &top_domains;
        let shared_result = &shared_result;
        let do_a_restart = &do_a_restart;
        let barriers = &barriers;
        let combined = &combined;

        for t in 0..n_threads {
            let links = WorkerLinks {
                to_zero: (t != 0).then(|| to_zero[t - 1].clone()),
                from_others: if t == 0 { from_others.take() } else { None },
            };
            scope.spawn(move || {
                let thread_result = run_worker(
                    t,
                    n_threads,
                    enc,
                    config,
                    collective,
                    top_domains,
                    barriers,
                    combined,
                    do_a_restart,
                    links,
                );
                if let Ok(mut merged) = shared_result.lock() {
                    merged.merge(&format!("t{t}."), thread_result);
                }
            });
        }
    });

    let mut result = shared_result
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    result
        .extra_stats
        .push(format!("search_time = {}", started.elapsed().as_millis()));
    result
}

#[allow(clippy::too_many_arguments)]
fn run_worker(
    t: usize,
    n_threads: usize,
    enc: &Encoding,
    config: &Config,
    collective: &dyn Collective,
    top_domains: &Domains,
    barriers: &RoundBarriers,
    combined: &Mutex<Vec<Vec<Assignment>>>,
    do_a_restart: &AtomicBool,
    links: WorkerLinks,
) -> SolveResult {
    let mut thread_result = SolveResult::default();
    let mut domains = top_domains.clone();
    let mut root_trail = Trail::default();
    let seed = (collective.rank() * n_threads + t) as u64;
    let mut sd = SearchData::new(enc.pattern_size, enc.target_size, seed);
    let mut schedule = RestartSchedule::for_worker(config, t);

    let mut restarts: u64 = 0;
    let mut done = false;
    let mut first_pass = true;

    loop {
        let budget = schedule.next_budget().unwrap_or(-1);
        restarts += 1;

        if !first_pass {
            exchange_round(
                t,
                &mut sd,
                &mut domains,
                &mut done,
                collective,
                barriers,
                combined,
                do_a_restart,
                &links,
            );
        }
        first_pass = false;

        if done {
            break;
        }

        // unit nogoods from the exchange may have left unit domains
        // behind; settle the root before searching from it
        thread_result.propagations += 1;
        if !propagate(&mut sd.store, enc, config, &mut domains, &mut root_trail) {
            thread_result.extra_stats.push("stop_reason = propagation".to_owned());
            thread_result.complete = true;
            done = true;
            config.abort.store(true, Ordering::Relaxed);
            sd.post_terminal();
            continue;
        }

        let restart_at = (!config.restart_timer.is_zero()
            && (!config.triggered_restarts || t == 0))
            .then(|| Instant::now() + config.restart_timer);

        let mut trail = root_trail.clone();
        match restarting_search(
            &mut sd,
            enc,
            config,
            &mut trail,
            &domains,
            &mut thread_result,
            budget,
            restart_at,
            do_a_restart,
        ) {
            SearchResult::Satisfiable => {
                save_result(enc, &trail, &mut thread_result);
                thread_result.extra_stats.push("stop_reason = satisfiable".to_owned());
                thread_result.complete = true;
                done = true;
                sd.post_terminal();
                config.abort.store(true, Ordering::Relaxed);
            }
            SearchResult::SatisfiableButKeepGoing => {
                thread_result
                    .extra_stats
                    .push("stop_reason = satisfiable_but_keep_going".to_owned());
                thread_result.complete = true;
                done = true;
                sd.post_terminal();
            }
            SearchResult::Unsatisfiable => {
                thread_result.extra_stats.push("stop_reason = unsatisfiable".to_owned());
                thread_result.complete = true;
                done = true;
                config.abort.store(true, Ordering::Relaxed);
                sd.post_terminal();
            }
            SearchResult::Aborted => {
                thread_result.extra_stats.push("stop_reason = aborted".to_owned());
                done = true;
                sd.post_terminal();
            }
            SearchResult::Restart => {}
        }
    }

    if !config.enumerate {
        thread_result.extra_stats.push(format!("restarts = {restarts}"));
    }
    thread_result
        .extra_stats
        .push(format!("nogoods_size = {}", sd.store.len()));
    thread_result.extra_stats.push(format!("nodes = {}", thread_result.nodes));
    thread_result
        .extra_stats
        .push(format!("propagations = {}", thread_result.propagations));

    thread_result
}

/// One round boundary: gather, merge across hosts, integrate, resume.
#[allow(clippy::too_many_arguments)]
fn exchange_round(
    t: usize,
    sd: &mut SearchData,
    domains: &mut Domains,
    done: &mut bool,
    collective: &dyn Collective,
    barriers: &RoundBarriers,
    combined: &Mutex<Vec<Vec<Assignment>>>,
    do_a_restart: &AtomicBool,
    links: &WorkerLinks,
) {
    if let Some(tx) = &links.to_zero {
        let _ = tx.send(std::mem::take(&mut sd.outbox));
    }

    barriers.ready.wait();

    if t == 0 {
        let mut all = std::mem::take(&mut sd.outbox);
        if let Some(receivers) = &links.from_others {
            for rx in receivers {
                all.extend(rx.recv().unwrap_or_default());
            }
        }

        let outgoing: Vec<NogoodMessage> = all.into_iter().map(NogoodMessage).collect();
        let mut merged = Vec::new();
        for batch in collective.all_gather(outgoing) {
            merged.extend(batch.into_iter().map(|message| message.0));
        }
        if let Ok(mut slot) = combined.lock() {
            *slot = merged;
        }
    }

    barriers.communicated.wait();

    if let Ok(slot) = combined.lock() {
        for literals in slot.iter() {
            if sd.store.integrate(literals.clone(), domains) == Integration::Done {
                *done = true;
                break;
            }
        }
    }

    if t == 0 {
        do_a_restart.store(false, Ordering::Relaxed);
    }

    barriers.resumed.wait();
}

/// Sequential iterated discrepancy-bounded search: run with allowance
/// 0, then 1, and so on up to the pattern size.
fn solve_dds(enc: &Encoding, config: &Config) -> SolveResult {
    let mut result = SolveResult::default();
    let Some(mut domains) = initialise_domains(enc) else {
        result.complete = true;
        return result;
    };

    let started = Instant::now();
    let mut sd = SearchData::new(enc.pattern_size, enc.target_size, 0);
    let mut root_trail = Trail::default();

    result.propagations += 1;
    if propagate(&mut sd.store, enc, config, &mut domains, &mut root_trail) {
        let mut outcome = SearchResult::Unsatisfiable;
        for allowance in 0..=enc.pattern_size {
            let mut trail = root_trail.clone();
            outcome = dds_search(&mut sd, enc, config, &mut trail, &domains, &mut result, allowance);
            match outcome {
                SearchResult::Satisfiable => {
                    save_result(enc, &trail, &mut result);
                    result.extra_stats.push("stop_reason = satisfiable".to_owned());
                    result.complete = true;
                    break;
                }
                SearchResult::Aborted => {
                    result.extra_stats.push("stop_reason = aborted".to_owned());
                    break;
                }
                _ => {}
            }
        }
        if outcome == SearchResult::Unsatisfiable {
            result.extra_stats.push("stop_reason = unsatisfiable".to_owned());
            result.complete = true;
        }
    } else {
        result.extra_stats.push("stop_reason = propagation".to_owned());
        result.complete = true;
    }

    result.extra_stats.push(format!("nodes = {}", result.nodes));
    result
        .extra_stats
        .push(format!("search_time = {}", started.elapsed().as_millis()));
    result
}

/// Turn the trail into a mapping over the caller's vertex numbering,
/// re-inserting any stripped isolated vertices on the lowest unused
/// targets, and record the branching shape as a `where =` stat.
fn save_result(enc: &Encoding, trail: &Trail, result: &mut SolveResult) {
    for record in &trail.records {
        result
            .isomorphism
            .entry(enc.pattern_permutation[record.assignment.pattern_vertex as usize])
            .or_insert(record.assignment.target_vertex as usize);
    }

    let mut next_free = 0;
    for &v in &enc.isolated_vertices {
        while result.isomorphism.values().any(|&used| used == next_free) {
            next_free += 1;
        }
        result.isomorphism.insert(v, next_free);
    }

    let mut where_line = String::from("where =");
    for record in &trail.records {
        where_line.push_str(&format!(
            " {}/{}",
            record.discrepancy_count, record.choice_count
        ));
    }
    result.extra_stats.push(where_line);
}
