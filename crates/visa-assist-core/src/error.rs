//! Error taxonomy for the visa pipeline.
//!
//! Data-quality errors ([`Error::UnknownCountryCode`],
//! [`Error::UnknownRequirementKind`]) are row-level and recoverable: the
//! normalizer skips the row and reports it. Everything else is fatal for
//! the operation that raised it.
//!
//! Application code works in `anyhow::Result`; these variants travel inside
//! `anyhow::Error` and are recovered with `err.downcast_ref::<Error>()`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("unknown country code: {code:?}")]
    UnknownCountryCode { code: String },

    #[error("unknown requirement kind: {token:?}")]
    UnknownRequirementKind { token: String },

    #[error("{rejected} rows rejected during normalization, tolerance is {tolerance}")]
    TooManyRejectedRows { rejected: usize, tolerance: usize },

    #[error(
        "embedding model mismatch: store was built with {store_model:?}, query uses {query_model:?}"
    )]
    EmbeddingModelMismatch {
        store_model: String,
        query_model: String,
    },

    #[error("vector store at {path} has no completion marker; rebuild it with --force")]
    StoreIncomplete { path: PathBuf },

    #[error("embedding failed for rows {first_row}..={last_row}: {reason}")]
    EmbeddingBatchFailed {
        first_row: usize,
        last_row: usize,
        reason: String,
    },

    #[error("{service} call failed after {attempts} attempt(s): {message}")]
    ExternalCallFailure {
        service: String,
        attempts: u32,
        message: String,
    },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl Error {
    /// True for row-level data-quality errors that the normalizer skips.
    pub fn is_data_quality(&self) -> bool {
        matches!(
            self,
            Error::UnknownCountryCode { .. } | Error::UnknownRequirementKind { .. }
        )
    }
}

/// True when `err` wraps an [`Error::ExternalCallFailure`].
pub fn is_external_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<Error>(),
        Some(Error::ExternalCallFailure { .. })
    )
}
