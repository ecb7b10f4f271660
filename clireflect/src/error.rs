//! Error types for clireflect.

use thiserror::Error;

/// Result type alias for clireflect operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors reported by the metadata reader and the logical layer.
///
/// The physical database layer is the only producer of [`Error::Corrupt`];
/// the loader converts resolver misses into [`Error::NotFound`] on the
/// initiating call, and logical operations surface errors unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// A lookup by name produced nothing: the resolver knew no path for an
    /// assembly, or a type/member lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// The metadata image violates the physical format.
    #[error("corrupt metadata: {0}")]
    Corrupt(String),

    /// Valid metadata exercising a case this library does not cover.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A caller-supplied handle, reference or string was malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure surfaced from the file layer.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }

    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
