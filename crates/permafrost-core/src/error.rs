//! Error types for region allocation and mapping.

/// Errors that can occur while allocating, freezing, or mapping regions.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    /// The requested bytes could not be obtained from the backing store.
    #[error("allocation of {bytes} bytes (alignment {align}) failed")]
    Allocation {
        /// Number of bytes requested.
        bytes: u64,
        /// Requested alignment.
        align: usize,
    },

    /// A file or mapping system call failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A non-`file://` URL was passed to the file mapper.
    #[error("unsupported URL scheme `{0}`: only file:// entities can be memory mapped")]
    UnsupportedScheme(String),

    /// A sub-slice request fell outside the region.
    #[error("range {start}..{end} out of bounds for region of {len} bytes")]
    OutOfBounds {
        /// Start of the requested range, in bytes.
        start: usize,
        /// End of the requested range, in bytes.
        end: usize,
        /// Length of the region being sliced.
        len: usize,
    },
}

/// Result type for region operations.
pub type Result<T> = std::result::Result<T, RegionError>;
