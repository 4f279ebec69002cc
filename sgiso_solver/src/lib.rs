//! A bit-parallel constraint-programming solver for the subgraph
//! isomorphism problem.
//!
//! Given a pattern graph and a target graph, [`solve`] looks for an
//! injective mapping from pattern vertices to target vertices that
//! preserves edges (and, in the induced variant, non-edges). The
//! search branches on bitset domains, propagates adjacency and
//! all-different constraints after every assignment, learns nogoods at
//! Luby-scheduled restarts, and can spread over worker threads and,
//! through a [`Collective`], over several cooperating hosts.
//!
//! ```
//! use sgiso_solver::{solve, AdjacencyGraph, Config};
//!
//! let mut pattern = AdjacencyGraph::new(3);
//! pattern.add_edge(0, 1);
//! pattern.add_edge(1, 2);
//! pattern.add_edge(2, 0);
//!
//! let mut target = AdjacencyGraph::new(4);
//! for i in 0..4 {
//!     for j in (i + 1)..4 {
//!         target.add_edge(i, j);
//!     }
//! }
//!
//! let result = solve(&pattern, &target, &Config::default()).unwrap();
//! assert!(result.complete);
//! assert_eq!(result.isomorphism.len(), 3);
//! ```

mod bits;
mod coordinator;
mod domains;
mod encode;
mod exchange;
mod nogoods;
mod propagate;
mod restarts;
mod search;

pub use exchange::{ChannelCluster, Collective, NogoodMessage, SingleHost};
pub use sgiso_common::{
    AdjacencyGraph, Config, Graph, SolveError, SolveResult, ValueOrdering,
};

use encode::Encoding;

/// Solve one pattern/target pair on this host alone.
pub fn solve(
    pattern: &dyn Graph,
    target: &dyn Graph,
    config: &Config,
) -> Result<SolveResult, SolveError> {
    solve_with_collective(pattern, target, config, &SingleHost)
}

/// Solve one pattern/target pair as one member of a collective. Every
/// member must call this with the same graphs and configuration; each
/// gets back its own host's view of the result, with stats prefixed by
/// rank.
pub fn solve_with_collective(
    pattern: &dyn Graph,
    target: &dyn Graph,
    config: &Config,
    collective: &dyn Collective,
) -> Result<SolveResult, SolveError> {
    validate(pattern, target, config, collective)?;

    if pattern.size() > target.size() {
        // no injective mapping can exist; skip encoding entirely
        let mut result = SolveResult { complete: true, ..SolveResult::default() };
        result.extra_stats.push("prepresolved = true".to_owned());
        return Ok(result);
    }

    let enc = Encoding::build(pattern, target, config);
    let mut result = coordinator::solve_with(&enc, config, collective);

    let prefix = format!("h{}.", collective.rank());
    for stat in &mut result.extra_stats {
        *stat = format!("{prefix}{stat}");
    }
    result.extra_stats.push(format!("{prefix}nodes = {}", result.nodes));
    result
        .extra_stats
        .push(format!("{prefix}propagations = {}", result.propagations));

    Ok(result)
}

fn validate(
    pattern: &dyn Graph,
    target: &dyn Graph,
    config: &Config,
    collective: &dyn Collective,
) -> Result<(), SolveError> {
    if target.size() > bits::MAX_TARGET_VERTICES {
        return Err(SolveError::GraphTooBig {
            vertices: target.size(),
            max: bits::MAX_TARGET_VERTICES,
        });
    }

    if pattern.has_edge_labels() && !config.induced {
        return Err(SolveError::UnsupportedConfiguration(
            "edge labels only work with induced matching",
        ));
    }

    let threads = coordinator::effective_threads(config);
    if config.enumerate && (threads > 1 || collective.size() > 1) {
        return Err(SolveError::UnsupportedConfiguration(
            "enumeration is sequential only",
        ));
    }
    if config.dds && (threads > 1 || collective.size() > 1) {
        return Err(SolveError::UnsupportedConfiguration(
            "discrepancy search is sequential only",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_pattern_is_prepresolved() {
        let pattern = AdjacencyGraph::new(5);
        let target = AdjacencyGraph::new(3);
        let result = solve(&pattern, &target, &Config::default()).expect("valid configuration");
        assert!(result.complete);
        assert!(result.isomorphism.is_empty());
        assert!(result.extra_stats.iter().any(|s| s == "prepresolved = true"));
        assert_eq!(result.nodes, 0);
        assert_eq!(result.propagations, 0);
    }

    #[test]
    fn edge_labels_need_induced() {
        let mut pattern = AdjacencyGraph::new(2);
        pattern.add_edge(0, 1);
        pattern.set_edge_label(0, 1, "x");
        pattern.set_edge_label(1, 0, "x");
        let target = AdjacencyGraph::new(3);

        let err = solve(&pattern, &target, &Config::default()).unwrap_err();
        assert!(matches!(err, SolveError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn parallel_enumeration_is_rejected() {
        let pattern = AdjacencyGraph::new(2);
        let target = AdjacencyGraph::new(3);
        let config = Config { enumerate: true, n_threads: 2, ..Config::default() };
        let err = solve(&pattern, &target, &config).unwrap_err();
        assert!(matches!(err, SolveError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn parallel_discrepancy_search_is_rejected() {
        let pattern = AdjacencyGraph::new(2);
        let target = AdjacencyGraph::new(3);
        let config = Config { dds: true, n_threads: 2, ..Config::default() };
        let err = solve(&pattern, &target, &config).unwrap_err();
        assert!(matches!(err, SolveError::UnsupportedConfiguration(_)));
    }

    #[test]
    fn stats_carry_the_host_prefix() {
        let mut pattern = AdjacencyGraph::new(2);
        pattern.add_edge(0, 1);
        let mut target = AdjacencyGraph::new(2);
        target.add_edge(0, 1);

        let result = solve(&pattern, &target, &Config::default()).expect("valid configuration");
        assert!(result.complete);
        assert!(result.extra_stats.iter().any(|s| s.starts_with("h0.")));
    }
}
