//! Heap-backed serializer: every allocation is an independent handle.

use std::alloc::Layout;

use parking_lot::Mutex;

use crate::error::{RegionError, Result};
use crate::region::{FrozenRegion, MutableRegion, RegionHandle};
use crate::serializer::MappedSerializer;

/// One aligned heap allocation; the handle's release frees it.
struct HeapAllocation {
    ptr: *mut u8,
    layout: Layout,
}

// SAFETY: the allocation is owned by whoever holds the handle and only
// written through a single MutableRegion; the raw pointer itself is just
// an address.
unsafe impl Send for HeapAllocation {}
// SAFETY: as above; HeapAllocation exposes nothing mutable.
unsafe impl Sync for HeapAllocation {}

impl Drop for HeapAllocation {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with this exact layout.
        unsafe { std::alloc::dealloc(self.ptr, self.layout) };
    }
}

/// Heap-backed [`MappedSerializer`].
///
/// Each `allocate_writable` performs one aligned, zeroed heap allocation;
/// regions from different allocations are wholly independent and each
/// keeps only its own allocation alive. `commit` is a no-op.
#[derive(Default)]
pub struct MemorySerializer {
    deferred: Mutex<Option<RegionError>>,
}

impl MemorySerializer {
    /// Create a heap-backed serializer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MappedSerializer for MemorySerializer {
    fn allocate_writable(&self, bytes: u64, alignment: usize) -> Result<MutableRegion<'_>> {
        if bytes == 0 {
            return Ok(MutableRegion::empty(self));
        }

        let align = alignment.max(std::mem::size_of::<usize>());
        let size = usize::try_from(bytes)
            .map_err(|_| RegionError::Allocation { bytes, align })?;
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| RegionError::Allocation { bytes, align })?;

        // Zeroed to match the file-backed arenas, whose pages start zero.
        // SAFETY: layout has non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(RegionError::Allocation { bytes, align });
        }

        let handle = RegionHandle::new(HeapAllocation { ptr, layout });
        Ok(MutableRegion::new(handle, ptr, size, self))
    }

    fn freeze(&self, region: MutableRegion<'_>) -> Result<FrozenRegion> {
        Ok(region.into_frozen())
    }

    fn commit(&self) -> Result<()> {
        match self.deferred.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn record_error(&self, error: RegionError) {
        self.deferred.lock().get_or_insert(error);
    }
}
