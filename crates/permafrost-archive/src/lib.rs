//! # Permafrost Archive
//!
//! Hierarchical named trees of frozen byte regions, written to and read
//! back from a single container file: a ZIP archive whose entries are
//! stored uncompressed so each payload stays mmap-addressable.
//!
//! ## Architecture
//!
//! - [`Path`] / [`PathElement`] — hierarchical names with reversible
//!   quoting.
//! - [`StructuredSerializer`] / [`StructuredReconstituter`] — the
//!   writer- and reader-side tree contracts; generic object helpers live
//!   on the [`StructuredSerializerExt`] / [`StructuredReconstituterExt`]
//!   extension traits.
//! - [`ZipStructuredSerializer`] / [`ZipStructuredReconstituter`] — the
//!   stored-only ZIP implementation of both.
//! - [`ObjectCodec`] / [`JsonCodec`] — injected byte codecs for
//!   `add_object` / `get_object`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use permafrost_archive::{
//!     ArchiveError, PathElement, StructuredReconstituter, StructuredSerializer,
//!     ZipStructuredReconstituter, ZipStructuredSerializer,
//! };
//! use permafrost_core::FrozenRegion;
//!
//! # fn main() -> Result<(), ArchiveError> {
//! let serializer = ZipStructuredSerializer::create("tree.zip")?;
//! let name = PathElement::new("greeting")?;
//! serializer.add_region(&name, &FrozenRegion::from_vec(b"hello".to_vec()))?;
//! serializer.commit()?;
//! drop(serializer);
//!
//! let reader = ZipStructuredReconstituter::open("file://tree.zip")?;
//! assert_eq!(reader.get_region(&name)?.data(), b"hello");
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

/// Injected object codecs.
pub mod codec;

/// Error types for containers and path handling.
pub mod error;

/// Hierarchical names.
pub mod path;

/// Structured serialization contracts.
pub mod structured;

mod zip;

/// Container writer.
pub mod zip_serializer;

/// Container reader.
pub mod zip_reconstituter;

pub use codec::{JsonCodec, ObjectCodec};
pub use error::{ArchiveError, Result};
pub use path::{Path, PathElement};
pub use structured::{
    DirectoryEntry, EntryStream, RegionGetter, StructureGetter, StructuredReconstituter,
    StructuredReconstituterExt, StructuredSerializer, StructuredSerializerExt,
};
pub use zip_reconstituter::ZipStructuredReconstituter;
pub use zip_serializer::ZipStructuredSerializer;
