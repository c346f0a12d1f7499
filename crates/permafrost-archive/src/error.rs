//! Error types for containers and path handling.

use permafrost_core::RegionError;

/// Errors that can occur while writing or reading a structured container.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// A container read or write failed at the I/O layer.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A region operation failed underneath the container.
    #[error(transparent)]
    Region(#[from] RegionError),

    /// The container is not a stored-only ZIP this crate can address, or
    /// a header is malformed.
    #[error("unsupported container: {0}")]
    UnsupportedContainer(String),

    /// A path lookup missed.
    #[error("`{name}` not found at {context}")]
    NotFound {
        /// The name that was looked up.
        name: String,
        /// Where the lookup happened.
        context: String,
    },

    /// A path element was empty, contained NUL, was unparseable, or was
    /// already bound in the container.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The injected object codec failed.
    #[error("codec error: {0}")]
    Codec(String),
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
