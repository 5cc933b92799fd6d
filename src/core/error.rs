//! Core model errors (identity parsing, structural invariants).
//!
//! These are bounded and stable: core errors represent domain/refusal states,
//! not library implementation details.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error("issue key `{raw}` is invalid: {reason}")]
    InvalidKey { raw: String, reason: String },

    #[error("commit hash `{raw}` is invalid: {reason}")]
    InvalidHash { raw: String, reason: String },

    #[error("story id `{raw}` is invalid: {reason}")]
    InvalidStoryId { raw: String, reason: String },
}
