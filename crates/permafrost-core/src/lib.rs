//! # Permafrost Core
//!
//! Aligned byte regions backed by heap memory or a growing file mapping,
//! frozen into immutable, shareable, zero-copy views.
//!
//! ## Architecture
//!
//! - [`MemorySerializer`] — heap-backed; every allocation is an
//!   independent reference-counted handle.
//! - [`FileSerializer`] — file-backed; bump-allocating arenas over one
//!   descriptor, grown in place where the platform allows, with pointer
//!   stability guaranteed either way.
//! - [`FrozenRegion`] / [`MutableRegion`] — the immutable and writable
//!   region views, each bound to an ownership handle that keeps the
//!   backing storage alive.
//! - [`map_file`] — read-only mapping of a `file://` URL range.
//! - [`SerializerSink`] / [`RegionReader`] — `std::io` adapters over the
//!   region model.
//!
//! ## Example
//!
//! ```rust
//! use permafrost_core::{MappedSerializer, MemorySerializer};
//!
//! # fn main() -> Result<(), permafrost_core::RegionError> {
//! let serializer = MemorySerializer::new();
//! let mut region = serializer.allocate_writable(5, 8)?;
//! region.data_mut().copy_from_slice(b"bytes");
//! let frozen = region.freeze()?;
//! assert_eq!(frozen.data(), b"bytes");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// Error types for region allocation and mapping.
pub mod error;

/// File-backed serializer with growing mapped arenas.
pub mod file;

/// Read-only file mapping.
pub mod mapping;

/// Heap-backed serializer.
pub mod memory;

/// Region views and ownership handles.
pub mod region;

/// The serializer contract.
pub mod serializer;

/// Byte-stream adapters.
pub mod stream;

pub use error::{RegionError, Result};
pub use file::{FileSerializer, FileSerializerOptions};
pub use mapping::map_file;
pub use memory::MemorySerializer;
pub use region::{FrozenRegion, MutableRegion, RegionHandle};
pub use serializer::MappedSerializer;
pub use stream::{RegionReader, SerializerSink};
