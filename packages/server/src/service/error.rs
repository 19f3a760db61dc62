use common::storage::StorageError;
use thiserror::Error;

use crate::identity::Unauthenticated;
use crate::store::MetaError;

/// Failures surfaced by [`SkinService`](super::SkinService).
///
/// Validation and quota failures are raised before any durable write.
#[derive(Debug, Error)]
pub enum SkinError {
    #[error("{0}")]
    Validation(String),

    #[error("skin limit of {limit} reached")]
    QuotaExceeded { limit: u64 },

    #[error("skin not found")]
    NotFound,

    #[error("skin belongs to another user")]
    Forbidden,

    #[error("caller is not authenticated")]
    Unauthenticated,

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

impl From<Unauthenticated> for SkinError {
    fn from(_: Unauthenticated) -> Self {
        SkinError::Unauthenticated
    }
}

impl From<MetaError> for SkinError {
    fn from(err: MetaError) -> Self {
        if err.is_unavailable() {
            return SkinError::Unavailable(err.to_string());
        }
        match err {
            MetaError::NotFound(_) => SkinError::NotFound,
            MetaError::QuotaExceeded { limit } => SkinError::QuotaExceeded { limit },
            // A verified identity whose account has since been removed.
            MetaError::OwnerNotFound(_) => SkinError::Unauthenticated,
            other => SkinError::Storage(other.to_string()),
        }
    }
}

impl From<StorageError> for SkinError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidType(msg) => SkinError::Validation(format!("Invalid image: {msg}")),
            StorageError::SizeLimitExceeded { limit, .. } => {
                SkinError::Validation(format!("File must be at most {limit} bytes"))
            }
            other => SkinError::Storage(other.to_string()),
        }
    }
}
