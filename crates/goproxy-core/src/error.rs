//! Error taxonomy shared by every crate in the workspace.
//!
//! Mirrors the ecosystem-error shape the rest of the corpus uses
//! (`#[derive(Error)]` enum, `#[source]` boxed causes, constructor
//! helpers, `pub type Result<T>`), but the variants are the not-found /
//! bad-upstream / timeout / internal / cancelled taxonomy from the
//! fetch-orchestration design rather than a parser error set.

use thiserror::Error;

/// The reason a [`Error::NotFound`] was raised.
///
/// The router uses this (not string matching on the message) to pick
/// the right cache-control policy for a miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    /// The module, version, or subpath genuinely does not exist.
    Plain,
    /// An upstream proxy returned a non-timeout 5xx or an invalid payload.
    BadUpstream,
    /// An upstream proxy returned 504, or the client timed out waiting.
    FetchTimeout,
}

/// Errors produced anywhere in the fetch-orchestration pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Module, version, file, or subpath does not exist at the queried source.
    #[error("not found: {message}")]
    NotFound {
        message: String,
        kind: NotFoundKind,
    },

    /// Programmer error, I/O error, or anything else unexpected.
    #[error("internal error: {0}")]
    Internal(String),

    /// The request context was cancelled before completion.
    #[error("cancelled")]
    Cancelled,

    /// The request context's deadline elapsed before completion.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Result type alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Construct a plain not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            kind: NotFoundKind::Plain,
        }
    }

    /// Construct a not-found error classified as a bad upstream response.
    pub fn bad_upstream(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            kind: NotFoundKind::BadUpstream,
        }
    }

    /// Construct a not-found error classified as a fetch timeout.
    pub fn fetch_timeout(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            kind: NotFoundKind::FetchTimeout,
        }
    }

    /// Construct an internal error from any displayable cause.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error is any flavor of not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The not-found subclass, if this is a not-found error.
    pub fn not_found_kind(&self) -> Option<NotFoundKind> {
        match self {
            Self::NotFound { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}
