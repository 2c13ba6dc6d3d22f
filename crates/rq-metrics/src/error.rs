//! Collection error types.

use rq_store::StoreError;
use thiserror::Error;

pub type CollectResult<T> = Result<T, CollectError>;

/// Errors that abort a collection cycle or a registration.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("metric error: {0}")]
    Metric(#[from] prometheus::Error),

    #[error("metric family registered twice: {0}")]
    DuplicateFamily(String),

    #[error("failed to encode metrics: {0}")]
    Encode(String),
}
