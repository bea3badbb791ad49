//! Error types for structure search.

use thiserror::Error;

/// Errors that can occur while configuring or running a search.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Stale candidates, rejected operators and NaN score deltas are ordinary
/// search outcomes and never surface here. Cancellation is reported through
/// [`SearchOutcome::cancelled`](crate::SearchOutcome::cancelled), not as an
/// error.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SearchError {
    /// Invalid search configuration (e.g., `cycle_bound == 0`).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A supplied graph or knowledge set does not match the oracle's variables.
    #[error("variable mismatch: {0}")]
    VariableMismatch(String),

    /// A graph mutation or query that would break a graph invariant.
    #[error("graph error: {0}")]
    Graph(String),

    /// Contradictory or unresolvable background knowledge.
    #[error("knowledge error: {0}")]
    Knowledge(String),

    /// The worker pool could not be constructed.
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// Internal search error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}
