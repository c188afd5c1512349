use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use haggle_core::errors::{ApplicationError, DomainError};
use haggle_db::RepositoryError;

#[derive(Debug, Error)]
pub enum StoreCallError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("store call `{operation}` did not finish within {timeout:?}")]
    TimedOut { operation: &'static str, timeout: Duration },
}

impl StoreCallError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Repository(RepositoryError::Conflict { .. }))
    }
}

/// Runs one repository call under `timeout`, so a stuck store cannot hold the caller forever.
pub async fn bounded<T, F>(
    operation: &'static str,
    timeout: Duration,
    call: F,
) -> Result<T, StoreCallError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map_err(StoreCallError::from),
        Err(_) => Err(StoreCallError::TimedOut { operation, timeout }),
    }
}

impl From<StoreCallError> for ApplicationError {
    fn from(error: StoreCallError) -> Self {
        match error {
            StoreCallError::Repository(RepositoryError::NotFound(id)) => {
                ApplicationError::Domain(DomainError::NegotiationNotFound(id))
            }
            StoreCallError::Repository(error @ RepositoryError::Conflict { .. }) => {
                ApplicationError::Conflict(error.to_string())
            }
            StoreCallError::Repository(error) => ApplicationError::Persistence(error.to_string()),
            error @ StoreCallError::TimedOut { .. } => ApplicationError::Timeout(error.to_string()),
        }
    }
}
