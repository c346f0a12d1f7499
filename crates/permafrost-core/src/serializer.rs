//! The serializer contract: allocate aligned writable regions, freeze
//! them, commit.
//!
//! # Dyn Compatibility
//!
//! The trait is dyn-compatible so serializers can be passed around as
//! `Box<dyn MappedSerializer>` (container leaf entries are exactly that).
//! `open_stream` is the one `Self: Sized` method; for a trait object,
//! build a [`SerializerSink`] directly with [`SerializerSink::new`].

use crate::error::Result;
use crate::region::{FrozenRegion, MutableRegion};
use crate::stream::SerializerSink;
use crate::RegionError;

/// A facility that hands out aligned writable byte regions and freezes
/// them into immutable, shareable views.
///
/// # Thread Safety
///
/// Implementations are `Send + Sync`; `allocate_writable`, `freeze`, and
/// `commit` may be called concurrently from multiple threads. A returned
/// [`MutableRegion`] is single-owner: exactly one thread writes it, and
/// freezing transfers it back.
pub trait MappedSerializer: Send + Sync {
    /// Allocate exactly `bytes` writable bytes whose address is a multiple
    /// of `max(alignment, pointer size)`.
    ///
    /// Zero-length requests yield an empty region with the null handle;
    /// such regions are still freezable.
    ///
    /// # Errors
    ///
    /// [`RegionError::Allocation`] when the bytes cannot be obtained, or
    /// [`RegionError::Io`] when backing-file manipulation fails.
    fn allocate_writable(&self, bytes: u64, alignment: usize) -> Result<MutableRegion<'_>>;

    /// Freeze a region previously allocated from this serializer.
    ///
    /// The frozen region carries the same bytes and the same handle; after
    /// this call the serializer will not write to them again.
    ///
    /// # Errors
    ///
    /// Implementation-specific; the plain backends never fail here.
    fn freeze(&self, region: MutableRegion<'_>) -> Result<FrozenRegion>;

    /// Flush bookkeeping.
    ///
    /// Heap-backed serializers have nothing to do; file-backed ones
    /// truncate the backing file to the true high-water mark. Also
    /// surfaces any error previously stashed via [`record_error`].
    ///
    /// # Errors
    ///
    /// [`RegionError::Io`] on truncation failure, or a deferred error.
    ///
    /// [`record_error`]: MappedSerializer::record_error
    fn commit(&self) -> Result<()>;

    /// Stash a failure from a deferred write path (a stream sink flushing
    /// at drop cannot return it); the next [`commit`] reports it.
    ///
    /// [`commit`]: MappedSerializer::commit
    fn record_error(&self, error: RegionError);

    /// Allocate, byte-copy, and freeze: rehome `region` into this
    /// serializer's backing.
    ///
    /// # Errors
    ///
    /// Propagates allocation or freeze failure.
    fn copy(&self, region: &FrozenRegion) -> Result<FrozenRegion> {
        let mut writable = self.allocate_writable(region.len() as u64, 1)?;
        writable.data_mut().copy_from_slice(region.data());
        self.freeze(writable)
    }

    /// A buffered byte sink that lands in this serializer as one frozen
    /// region when finished.
    fn open_stream(&self) -> SerializerSink<'_>
    where
        Self: Sized,
    {
        SerializerSink::new(self)
    }
}
