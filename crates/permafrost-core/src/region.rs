//! Byte regions and the ownership handles that keep them alive.
//!
//! A [`FrozenRegion`] is an immutable `(pointer, length, handle)` view of
//! some backing storage: a heap allocation, a file-backed arena, or a
//! read-only mapping. The handle is an opaque reference-counted token; the
//! bytes stay valid as long as any clone of the handle is live, which is
//! what makes zero-copy sub-slicing safe without a global lifetime tracker.
//!
//! A [`MutableRegion`] is the writable precursor: it carries the same
//! handle plus a back-reference to the serializer that produced it, and
//! freezing hands the bytes over to that owner.

use std::any::Any;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{RegionError, Result};
use crate::serializer::MappedSerializer;

/// Opaque ownership token over some backing storage.
///
/// The release action is whatever the held value does on drop: free a heap
/// allocation, unmap an arena, unmap a file mapping, or nothing at all.
/// Cloning is an atomic reference-count bump; the release runs when the
/// last clone goes away. Zero-length regions carry the null handle.
#[derive(Clone, Default)]
pub struct RegionHandle(Option<Arc<dyn Any + Send + Sync>>);

impl RegionHandle {
    /// The null handle: owns nothing, releases nothing.
    #[must_use]
    pub fn null() -> Self {
        Self(None)
    }

    /// Wrap an owner value; its `Drop` becomes the release action.
    pub fn new<T: Send + Sync + 'static>(owner: T) -> Self {
        Self(Some(Arc::new(owner)))
    }

    /// Adopt an already shared owner without an extra indirection.
    pub fn from_arc<T: Send + Sync + 'static>(owner: Arc<T>) -> Self {
        Self(Some(owner))
    }

    /// Whether this is the null handle.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegionHandle")
            .field(&self.0.as_ref().map(Arc::as_ptr))
            .finish()
    }
}

/// A dangling-but-aligned pointer for zero-length regions.
fn dangling() -> *mut u8 {
    NonNull::<usize>::dangling().as_ptr().cast()
}

/// Immutable, shareable, zero-copy byte slice.
///
/// Holds a clone of the handle that owns its backing storage, so the view
/// stays valid for as long as the region (or any sub-slice of it) exists.
#[derive(Clone)]
pub struct FrozenRegion {
    data: *const u8,
    len: usize,
    handle: RegionHandle,
}

// SAFETY: the bytes are immutable and the handle is an Arc; sharing a
// FrozenRegion across threads is no more than sharing a &[u8].
unsafe impl Send for FrozenRegion {}
// SAFETY: as above; no interior mutability.
unsafe impl Sync for FrozenRegion {}

impl FrozenRegion {
    /// An empty region with the null handle.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: dangling(),
            len: 0,
            handle: RegionHandle::null(),
        }
    }

    /// Freeze an owned byte vector; the handle keeps the vector alive.
    #[must_use]
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        if bytes.is_empty() {
            return Self::empty();
        }
        let owner = Arc::new(bytes);
        let data = owner.as_ptr();
        let len = owner.len();
        Self {
            data,
            len,
            handle: RegionHandle::from_arc(owner),
        }
    }

    /// Build a region from raw parts.
    ///
    /// # Safety
    ///
    /// `data` must point to `len` initialized bytes that remain valid and
    /// unwritten for as long as `handle` (or any clone of it) is live.
    pub(crate) unsafe fn from_raw_parts(
        handle: RegionHandle,
        data: *const u8,
        len: usize,
    ) -> Self {
        Self { data, len, handle }
    }

    /// The region's bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: construction guarantees `data` points to `len` initialized
        // bytes kept alive by `handle`.
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The ownership token backing this region.
    #[must_use]
    pub fn handle(&self) -> &RegionHandle {
        &self.handle
    }

    /// Sub-slice `[start, end)`, sharing this region's handle.
    ///
    /// # Errors
    ///
    /// Returns [`RegionError::OutOfBounds`] unless
    /// `start <= end <= self.len()`.
    pub fn range(&self, start: usize, end: usize) -> Result<FrozenRegion> {
        if start > end || end > self.len {
            return Err(RegionError::OutOfBounds {
                start,
                end,
                len: self.len,
            });
        }
        Ok(Self {
            // SAFETY: start <= len, so the offset stays within (one past)
            // the allocation.
            data: unsafe { self.data.add(start) },
            len: end - start,
            handle: self.handle.clone(),
        })
    }
}

impl fmt::Debug for FrozenRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrozenRegion")
            .field("data", &self.data)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// Writable byte region bound to the serializer that produced it.
///
/// Single-owner: at most one thread writes it, and freezing consumes it.
/// The owner back-reference is how [`freeze`](MutableRegion::freeze)
/// reaches the serializer's freeze logic, which may do more than wrap the
/// bytes (a container entry serializer, for instance, records the frozen
/// result for later emission).
pub struct MutableRegion<'a> {
    handle: RegionHandle,
    data: *mut u8,
    len: usize,
    owner: &'a dyn MappedSerializer,
}

// SAFETY: the region is single-owner (no aliasing writers) and the owner
// reference is to a Sync serializer, so moving it to another thread is
// sound. Deliberately not Sync: writes must not race with anything.
unsafe impl Send for MutableRegion<'_> {}

impl<'a> MutableRegion<'a> {
    pub(crate) fn new(
        handle: RegionHandle,
        data: *mut u8,
        len: usize,
        owner: &'a dyn MappedSerializer,
    ) -> Self {
        Self {
            handle,
            data,
            len,
            owner,
        }
    }

    /// An empty writable region with the null handle; still freezable.
    #[must_use]
    pub fn empty(owner: &'a dyn MappedSerializer) -> Self {
        Self {
            handle: RegionHandle::null(),
            data: dangling(),
            len: 0,
            owner,
        }
    }

    /// Rebind the serializer that will perform the freeze.
    ///
    /// Used by serializers that wrap another serializer's allocations but
    /// need freezes dispatched to themselves.
    #[must_use]
    pub fn with_owner<'b>(self, owner: &'b dyn MappedSerializer) -> MutableRegion<'b> {
        MutableRegion {
            handle: self.handle,
            data: self.data,
            len: self.len,
            owner,
        }
    }

    /// Read access to the bytes written so far.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: construction guarantees `data` points to `len` bytes
        // (zero-initialized by the allocating serializer) kept alive by
        // `handle`; `&self` excludes concurrent writes.
        unsafe { std::slice::from_raw_parts(self.data, self.len) }
    }

    /// Write access to the bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        if self.len == 0 {
            return &mut [];
        }
        // SAFETY: as `data`, plus `&mut self` makes this the only writer.
        unsafe { std::slice::from_raw_parts_mut(self.data, self.len) }
    }

    /// Length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The ownership token backing this region.
    #[must_use]
    pub fn handle(&self) -> &RegionHandle {
        &self.handle
    }

    /// Freeze the region via its owning serializer.
    ///
    /// The frozen region shares this region's handle and bytes; after this
    /// call nothing writes to them again.
    ///
    /// # Errors
    ///
    /// Propagates the owner's [`MappedSerializer::freeze`] failure.
    pub fn freeze(self) -> Result<FrozenRegion> {
        let owner = self.owner;
        owner.freeze(self)
    }

    /// Split into parts for a serializer's freeze implementation.
    pub(crate) fn into_frozen(self) -> FrozenRegion {
        FrozenRegion {
            data: self.data,
            len: self.len,
            handle: self.handle,
        }
    }
}

impl fmt::Debug for MutableRegion<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutableRegion")
            .field("data", &self.data)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_region() {
        let region = FrozenRegion::empty();
        assert_eq!(region.len(), 0);
        assert!(region.is_empty());
        assert!(region.data().is_empty());
        assert!(region.handle().is_null());
    }

    #[test]
    fn test_from_vec() {
        let region = FrozenRegion::from_vec(b"hello world".to_vec());
        assert_eq!(region.data(), b"hello world");
        assert!(!region.handle().is_null());
    }

    #[test]
    fn test_clone_shares_bytes() {
        let region = FrozenRegion::from_vec(b"shared".to_vec());
        let clone = region.clone();
        drop(region);
        assert_eq!(clone.data(), b"shared");
    }

    #[test]
    fn test_range() {
        let region = FrozenRegion::from_vec(b"0123456789".to_vec());
        let mid = region.range(2, 7).unwrap();
        assert_eq!(mid.data(), b"23456");

        // Sub-slices outlive their parent view.
        drop(region);
        assert_eq!(mid.data(), b"23456");
    }

    #[test]
    fn test_range_composition() {
        let region = FrozenRegion::from_vec((0u8..100).collect());
        let a = region.range(10, 60).unwrap();
        let b = a.range(5, 25).unwrap();
        assert_eq!(b.data(), region.range(15, 35).unwrap().data());
    }

    #[test]
    fn test_range_out_of_bounds() {
        let region = FrozenRegion::from_vec(vec![0u8; 10]);
        assert!(matches!(
            region.range(5, 3),
            Err(RegionError::OutOfBounds { start: 5, end: 3, len: 10 })
        ));
        assert!(region.range(0, 11).is_err());
        assert!(region.range(11, 11).is_err());
        assert!(region.range(10, 10).is_ok());
    }
}
