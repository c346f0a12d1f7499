//! Contracts for structured (named-tree) serialization.
//!
//! A [`StructuredSerializer`] builds a hierarchical tree of named byte
//! entries; a [`StructuredReconstituter`] reads one back. Both sides are
//! dyn-compatible so sub-trees can be handed around as boxed trait
//! objects; the generic object helpers live on the `...Ext` extension
//! traits, blanket-implemented for every implementation.

use std::io::Write;

use permafrost_core::{FrozenRegion, MappedSerializer, RegionReader};

use crate::codec::ObjectCodec;
use crate::error::{ArchiveError, Result};
use crate::path::{Path, PathElement};

/// Writer side of a hierarchical named tree.
///
/// Sub-structures share the root's output; names within one level must be
/// unique per binding kind (a leaf and a sub-structure may share a name —
/// those are distinct bindings).
pub trait StructuredSerializer: Send + Sync {
    /// The full path of this node from the container root.
    fn path(&self) -> &Path;

    /// Create a child sub-tree at `self.path() ++ name`, sharing the
    /// root's output.
    ///
    /// # Errors
    ///
    /// Implementation-specific; containers reject names that cannot be
    /// bound.
    fn new_structure(&self, name: &PathElement) -> Result<Box<dyn StructuredSerializer>>;

    /// Create a leaf serializer. When the returned serializer is dropped,
    /// its last frozen region is emitted as one container entry at
    /// `self.path() ++ name`.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::InvalidPath`] when the leaf path is already bound.
    fn new_entry(&self, name: &PathElement) -> Result<Box<dyn MappedSerializer>>;

    /// Finalize. On the root this writes the container's directory and
    /// flushes the output (and reports any failure deferred from an entry
    /// finalizer); on sub-structures it is a no-op.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Io`] or a deferred entry failure.
    fn commit(&self) -> Result<()>;

    /// A buffered byte sink emitted as one entry at `self.path() ++ name`.
    ///
    /// # Errors
    ///
    /// As [`new_entry`](StructuredSerializer::new_entry).
    fn new_stream(&self, name: &PathElement) -> Result<EntryStream> {
        Ok(EntryStream::new(self.new_entry(name)?))
    }

    /// Emit an existing frozen region as an entry at
    /// `self.path() ++ name`.
    ///
    /// # Errors
    ///
    /// As [`new_entry`](StructuredSerializer::new_entry), plus any copy
    /// failure.
    fn add_region(&self, name: &PathElement, region: &FrozenRegion) -> Result<()> {
        self.new_entry(name)?.copy(region)?;
        Ok(())
    }
}

/// Generic conveniences over any [`StructuredSerializer`].
pub trait StructuredSerializerExt: StructuredSerializer {
    /// Serialize `value` through `codec` and emit the bytes as an entry
    /// at `self.path() ++ name`.
    ///
    /// # Errors
    ///
    /// Codec or entry failure.
    fn add_object<T, C: ObjectCodec<T>>(
        &self,
        name: &PathElement,
        value: &T,
        codec: &C,
    ) -> Result<()> {
        let bytes = codec.encode(value)?;
        let entry = self.new_entry(name)?;
        let mut region = entry.allocate_writable(bytes.len() as u64, 1)?;
        region.data_mut().copy_from_slice(&bytes);
        region.freeze()?;
        Ok(())
    }
}

impl<S: StructuredSerializer + ?Sized> StructuredSerializerExt for S {}

/// Buffered sink that becomes one container entry when it goes away.
///
/// Owns its leaf serializer, so the entry is emitted even if the stream
/// is simply dropped; a failure on the drop path is stashed with the
/// container and surfaces at the root's `commit`.
pub struct EntryStream {
    entry: Option<Box<dyn MappedSerializer>>,
    buffer: Vec<u8>,
    finished: bool,
}

impl EntryStream {
    /// Wrap a leaf serializer in a buffering sink.
    #[must_use]
    pub fn new(entry: Box<dyn MappedSerializer>) -> Self {
        Self {
            entry: Some(entry),
            buffer: Vec::new(),
            finished: false,
        }
    }

    fn write_out(&mut self) -> permafrost_core::Result<()> {
        if let Some(entry) = &self.entry {
            let mut region = entry.allocate_writable(self.buffer.len() as u64, 1)?;
            region.data_mut().copy_from_slice(&self.buffer);
            region.freeze()?;
        }
        Ok(())
    }

    /// Flush the buffered bytes and emit the entry.
    ///
    /// # Errors
    ///
    /// Propagates allocation or freeze failure.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        self.write_out()?;
        self.entry = None;
        Ok(())
    }
}

impl Write for EntryStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for EntryStream {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.write_out() {
            if let Some(entry) = &self.entry {
                entry.record_error(err);
            }
        }
    }
}

/// Lazily produces a leaf's region.
pub type RegionGetter = Box<dyn Fn() -> FrozenRegion + Send + Sync>;

/// Lazily opens a child sub-structure.
pub type StructureGetter = Box<dyn Fn() -> Box<dyn StructuredReconstituter> + Send + Sync>;

/// One name in a reconstituter's directory listing.
///
/// A name may be a leaf, a sub-structure, or both at once.
pub struct DirectoryEntry {
    name: PathElement,
    region: Option<RegionGetter>,
    structure: Option<StructureGetter>,
}

impl DirectoryEntry {
    /// Assemble a listing entry.
    #[must_use]
    pub fn new(
        name: PathElement,
        region: Option<RegionGetter>,
        structure: Option<StructureGetter>,
    ) -> Self {
        Self {
            name,
            region,
            structure,
        }
    }

    /// The entry's name.
    #[must_use]
    pub fn name(&self) -> &PathElement {
        &self.name
    }

    /// Whether this name has a byte payload.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.region.is_some()
    }

    /// Whether this name has children.
    #[must_use]
    pub fn has_children(&self) -> bool {
        self.structure.is_some()
    }

    /// The leaf payload, if this name is a leaf.
    #[must_use]
    pub fn region(&self) -> Option<FrozenRegion> {
        self.region.as_ref().map(|get| get())
    }

    /// The child sub-structure, if this name has children.
    #[must_use]
    pub fn structure(&self) -> Option<Box<dyn StructuredReconstituter>> {
        self.structure.as_ref().map(|get| get())
    }
}

/// Reader side of a hierarchical named tree.
pub trait StructuredReconstituter: Send + Sync {
    /// A human-readable description of where this node lives, for
    /// diagnostics.
    fn context(&self) -> String;

    /// List this level of the tree.
    fn get_directory(&self) -> Vec<DirectoryEntry>;

    /// The payload bound to `name` at this level.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::NotFound`] when `name` is not a leaf here.
    fn get_region(&self, name: &PathElement) -> Result<FrozenRegion>;

    /// The sub-structure bound to `name` at this level.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::NotFound`] when `name` has no children here.
    fn get_structure(&self, name: &PathElement) -> Result<Box<dyn StructuredReconstituter>>;

    /// A seekable read-only source over the payload bound to `name`.
    ///
    /// # Errors
    ///
    /// As [`get_region`](StructuredReconstituter::get_region).
    fn get_stream(&self, name: &PathElement) -> Result<RegionReader> {
        Ok(RegionReader::new(self.get_region(name)?))
    }

    /// Walk `path` segment by segment and return the leaf payload.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::InvalidPath`] for the empty path,
    /// [`ArchiveError::NotFound`] on the first missing segment.
    fn get_region_recursive(&self, path: &Path) -> Result<FrozenRegion> {
        let Some((leaf, dirs)) = path.split_last() else {
            return Err(ArchiveError::InvalidPath(
                "cannot look up the empty path".to_string(),
            ));
        };
        match dirs {
            [] => self.get_region(leaf),
            [first, rest @ ..] => {
                let mut current = self.get_structure(first)?;
                for element in rest {
                    current = current.get_structure(element)?;
                }
                current.get_region(leaf)
            }
        }
    }

    /// Walk `path` segment by segment and return the sub-structure.
    ///
    /// # Errors
    ///
    /// As [`get_region_recursive`](StructuredReconstituter::get_region_recursive).
    fn get_structure_recursive(&self, path: &Path) -> Result<Box<dyn StructuredReconstituter>> {
        let mut elements = path.elements().iter();
        let Some(first) = elements.next() else {
            return Err(ArchiveError::InvalidPath(
                "cannot look up the empty path".to_string(),
            ));
        };
        let mut current = self.get_structure(first)?;
        for element in elements {
            current = current.get_structure(element)?;
        }
        Ok(current)
    }
}

/// Generic conveniences over any [`StructuredReconstituter`].
pub trait StructuredReconstituterExt: StructuredReconstituter {
    /// Read the entry bound to `name` and decode it through `codec`.
    ///
    /// # Errors
    ///
    /// Lookup or codec failure.
    fn get_object<T, C: ObjectCodec<T>>(&self, name: &PathElement, codec: &C) -> Result<T> {
        let region = self.get_region(name)?;
        codec.decode(region.data())
    }
}

impl<R: StructuredReconstituter + ?Sized> StructuredReconstituterExt for R {}
