//! Configuration errors.
//!
//! Search outcomes (satisfiable, unsatisfiable, aborted) are values on
//! [`crate::SolveResult`], never errors. The only things reported
//! through `Err` are configuration problems detected before the search
//! starts; they are fatal and never silently degraded.

use thiserror::Error;

/// A fatal problem with the requested configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolveError {
    /// The target graph does not fit the solver's bitset capacity.
    #[error("target graph has {vertices} vertices, but at most {max} are supported")]
    GraphTooBig {
        /// Vertices in the offending graph.
        vertices: usize,
        /// Largest supported target size.
        max: usize,
    },

    /// A feature combination the solver does not support.
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(&'static str),
}
