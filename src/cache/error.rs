//! Failure types shared by the coordinator and its fetch functions.

use thiserror::Error;

/// A fetch function failed.
///
/// Cloneable so one failure can be handed to every caller coalesced onto
/// the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("{resource} responded with status {status}")]
    Status { resource: String, status: u16 },
    #[error("{resource} timed out")]
    Timeout { resource: String },
    #[error("transport error while loading {resource}: {message}")]
    Transport { resource: String, message: String },
    #[error("failed to decode {resource}: {message}")]
    Decode { resource: String, message: String },
}

impl FetchError {
    pub fn status(resource: impl Into<String>, status: u16) -> Self {
        Self::Status {
            resource: resource.into(),
            status,
        }
    }

    pub fn timeout(resource: impl Into<String>) -> Self {
        Self::Timeout {
            resource: resource.into(),
        }
    }

    pub fn transport(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            resource: resource.into(),
            message: message.into(),
        }
    }

    pub fn decode(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// HTTP status code, when the server answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Authorization failures will not change on a second attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self.status_code(), Some(401 | 403))
    }
}

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("cached value under `{key}` is not a `{expected}`")]
    TypeMismatch { key: String, expected: &'static str },
}

impl CacheError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch(err) => err.is_retryable(),
            Self::TypeMismatch { .. } => false,
        }
    }

    pub fn as_fetch(&self) -> Option<&FetchError> {
        match self {
            Self::Fetch(err) => Some(err),
            Self::TypeMismatch { .. } => None,
        }
    }
}
