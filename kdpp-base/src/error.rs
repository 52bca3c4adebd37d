//! Errors reported by kernel evaluation and subset selection.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionError {
    /// Point `index` does not have the dimension of the first point of its set.
    #[error("point {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// None of the candidates considered at `step` has a usable Schur
    /// complement.
    #[error("singular update at step {step}: none of the {candidates} candidates has a usable Schur complement")]
    SingularUpdate { step: usize, candidates: usize },
}

pub type Result<T> = std::result::Result<T, SelectionError>;
