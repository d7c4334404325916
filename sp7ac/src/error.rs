use sp7core::error::BackendError;
use std::sync::Arc;
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Rbac(#[from] sp7rbac::error::Error),
    #[error("Misconfiguration: missing {0}")]
    Misconfiguration(&'static str),
    /// The failure is shared by every caller waiting on the same query.
    #[error("permission fetch for collection {0} failed: {1}")]
    Fetch(i64, Arc<Error>),
}
