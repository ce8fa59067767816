//! Error type shared by every engine operation.

use crate::diff::Algorithm;
use std::fmt;
use thiserror::Error;

/// Which input a size check refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Old,
    New,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Old => f.write_str("old"),
            Side::New => f.write_str("new"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DiffError {
    /// Input larger than `maxFileSize`; raised before any work starts.
    #[error("{side} input is {size} bytes, exceeding the {limit} byte limit")]
    SizeExceeded { side: Side, size: usize, limit: usize },

    #[error("invalid diff options: {0}")]
    InvalidOptions(String),

    /// The algorithm is a recognized option value without an implementation.
    #[error("diff algorithm `{0}` is not implemented")]
    AlgorithmNotImplemented(Algorithm),

    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Internal alignment failure. `compute_diff` folds this into
    /// `DiffResult::error` rather than returning it.
    #[error("diff computation failed: {0}")]
    ComputationFailure(String),

    #[error("worker pool error: {0}")]
    Pool(String),
}

impl DiffError {
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub(crate) fn invalid_options(msg: impl Into<String>) -> Self {
        Self::InvalidOptions(msg.into())
    }
}
