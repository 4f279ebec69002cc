//! Configuration for the subgraph isomorphism search.
//!
//! The two main axes are the matching variant (non-induced by default,
//! `induced` to require non-edges to map to non-edges) and the search
//! mode (first solution, or `enumerate` to count all of them). The
//! remaining knobs tune the restarting, learning and value-ordering
//! machinery and the worker pool; the defaults reproduce the standard
//! configuration (biased value ordering, Luby restarts with constant
//! 660, learning enabled, one worker).

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

/// How values (candidate target vertices) are ordered at a branch node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValueOrdering {
    /// Softmax-weighted random draw biased toward high-degree targets.
    #[default]
    Biased,
    /// Highest target degree first, deterministic.
    Degree,
    /// Lowest target degree first, deterministic.
    AntiDegree,
    /// Uniformly random order.
    Random,
}

/// Global search configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Solve the induced variant (non-edges must map to non-edges).
    pub induced: bool,

    /// Count every solution instead of stopping at the first.
    pub enumerate: bool,

    /// Use iterated discrepancy-bounded search instead of restarts.
    /// Sequential only; forces deterministic value ordering.
    pub dds: bool,

    /// Largest nogood to learn. Zero disables learning entirely.
    pub nogood_size_limit: u32,

    /// Constant multiplier for the restart sequence. Zero disables
    /// restarts (and with them, learning has nothing to trigger it).
    pub restarts_constant: u64,

    /// Multiplier for geometric restarts. Zero means use Luby.
    pub geometric_multiplier: f64,

    /// Wall-clock budget per restart round. Zero means no timed
    /// restarts.
    pub restart_timer: Duration,

    /// Only the first worker counts backtracks; everyone restarts when
    /// it does.
    pub triggered_restarts: bool,

    /// Value-ordering heuristic.
    pub value_ordering: ValueOrdering,

    /// Worker threads. Zero means use all available cores.
    pub n_threads: usize,

    /// Give up after this long. Zero means run to completion.
    pub timeout: Duration,

    /// Cooperative cancellation flag, checked once per search node.
    /// Callers may share this handle and set it to stop the search
    /// early; the solver also sets it on completion and timeout.
    pub abort: Arc<AtomicBool>,
}

impl Config {
    /// Default restart constant, tuned on the standard benchmark suite.
    pub const DEFAULT_RESTARTS_CONSTANT: u64 = 660;

    /// True when restarts (and nogood learning) are active.
    pub fn restarts_enabled(&self) -> bool {
        !self.enumerate
            && !self.dds
            && (self.restarts_constant > 0 || !self.restart_timer.is_zero())
    }

    /// True when learned nogoods should be recorded at all.
    pub fn learning_enabled(&self) -> bool {
        self.restarts_enabled() && self.nogood_size_limit > 0
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            induced: false,
            enumerate: false,
            dds: false,
            nogood_size_limit: u32::MAX,
            restarts_constant: Self::DEFAULT_RESTARTS_CONSTANT,
            geometric_multiplier: 0.0,
            restart_timer: Duration::ZERO,
            triggered_restarts: false,
            value_ordering: ValueOrdering::default(),
            n_threads: 1,
            timeout: Duration::ZERO,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_restarts_and_learns() {
        let cfg = Config::default();
        assert!(cfg.restarts_enabled());
        assert!(cfg.learning_enabled());
    }

    #[test]
    fn zero_restart_constant_disables_restarts() {
        let cfg = Config {
            restarts_constant: 0,
            ..Config::default()
        };
        assert!(!cfg.restarts_enabled());
        assert!(!cfg.learning_enabled());
    }

    #[test]
    fn zero_nogood_limit_disables_learning_only() {
        let cfg = Config {
            nogood_size_limit: 0,
            ..Config::default()
        };
        assert!(cfg.restarts_enabled());
        assert!(!cfg.learning_enabled());
    }

    #[test]
    fn enumerate_disables_restarts() {
        let cfg = Config {
            enumerate: true,
            ..Config::default()
        };
        assert!(!cfg.restarts_enabled());
    }
}
