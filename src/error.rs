//! Error types shared across the crate.

use thiserror::Error;

/// Result type alias using the crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of hierarchy construction.
///
/// Construction performs no local recovery: any of these aborts the build
/// and leaves the preconditioner unusable. The caller must discard it and
/// may retry with different options.
#[derive(Error, Debug)]
pub enum Error {
    /// The operator has no rows, so there is nothing to coarsen.
    #[error("operator has no rows")]
    EmptyOperator,

    /// Coarsening is only defined for square operators.
    #[error("operator must be square, got {rows}x{cols}")]
    NonSquareOperator { rows: usize, cols: usize },

    /// The supplied near-null candidate does not match the operator.
    #[error("candidate vector has length {got} but the operator has {expected} rows")]
    CandidateLength { expected: usize, got: usize },

    /// A strategy needed `1 / a_ii` and found a structurally or numerically
    /// missing diagonal entry.
    #[error("zero or missing diagonal entry at row {row}")]
    ZeroDiagonal { row: usize },

    /// The aggregation strategy produced no aggregates for a non-empty level.
    #[error("aggregation produced no aggregates for {rows} unknowns")]
    EmptyAggregation { rows: usize },

    /// The LDL^T factorization of the coarsest operator failed.
    #[error("coarse factorization failed: {0}")]
    CoarseFactorization(String),
}
