//! Error kinds for the DFTL engine (§7).

use thiserror::Error;

/// Errors the DFTL engine can raise.
///
/// `OutOfSpace` is expected to be recoverable at the device-pool boundary
/// (the GC decider should be offered a chance to free blocks); every other
/// variant is a programmer error and should terminate the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DftlError {
    #[error("no channel could satisfy the block allocation")]
    OutOfSpace,

    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },

    #[error("flash backend error: {0}")]
    BackendError(String),
}

impl DftlError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        DftlError::InvariantViolation {
            detail: detail.into(),
        }
    }
}

pub type DftlResult<T> = Result<T, DftlError>;
