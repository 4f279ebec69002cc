//! Shared types for the sgiso workspace.
//!
//! This crate holds the surface the solver and its callers agree on:
//! the read-only [`Graph`] trait (plus a concrete builder for tests and
//! simple callers), the [`Config`] describing how a search should
//! behave, the [`SolveResult`] it produces, and the configuration error
//! taxonomy. The search engine itself lives in `sgiso_solver`.

mod config;
mod error;
mod graph;
mod result;

pub use crate::config::*;
pub use crate::error::*;
pub use crate::graph::*;
pub use crate::result::*;
