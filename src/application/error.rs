use reword_api_types::ContentId;
use thiserror::Error;

use crate::cache::{CacheError, FetchError, MutationError};
use crate::config::LoadError;
use crate::infra::error::InfraError;

/// Failures surfaced by [`DashboardService`](super::dashboard::DashboardService).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("mutation failed: {0}")]
    Mutation(#[source] FetchError),
    #[error("a change to `{item}` is already in flight")]
    Busy { item: String },
    #[error("saved content {0} is not in the loaded list")]
    UnknownContent(ContentId),
}

impl ServiceError {
    /// The backend failure behind this error, if there was one.
    pub fn as_fetch(&self) -> Option<&FetchError> {
        match self {
            Self::Cache(err) => err.as_fetch(),
            Self::Mutation(err) => Some(err),
            Self::Busy { .. } | Self::UnknownContent(_) => None,
        }
    }
}

impl From<FetchError> for ServiceError {
    fn from(err: FetchError) -> Self {
        Self::Mutation(err)
    }
}

impl From<MutationError<FetchError>> for ServiceError {
    fn from(err: MutationError<FetchError>) -> Self {
        match err {
            MutationError::InFlight { item } => Self::Busy { item },
            MutationError::Rejected(err) => Self::Mutation(err),
        }
    }
}

/// Top-level error of the `reword-sync` binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
