//! File-backed serializer with growing arenas over one descriptor.
//!
//! # Design
//!
//! The serializer owns a read-write file and a list of *arenas*: page-sized
//! spans of that file mapped `MAP_SHARED` read+write and served by bump
//! allocation. Only the most recent arena grows. Growth first tries an
//! in-place `mremap` (Linux), which keeps every previously returned pointer
//! valid at the same address; when the kernel cannot extend the mapping,
//! the file truncation is reverted and a fresh arena is appended at the
//! file's end instead. Either way, pointer stability holds: past
//! allocations never move.
//!
//! Each arena is reference-counted and unmaps itself when the last handle
//! goes away, so a [`FrozenRegion`] derived from this serializer remains
//! valid even after the serializer itself is dropped.
//!
//! # Invariants
//!
//! - The file's on-disk length equals the sum of arena lengths at every
//!   quiescent point (checked in debug builds).
//! - `commit` truncates the file to the true high-water mark so container
//!   readers see no trailing zeros.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::{RegionError, Result};
use crate::region::{FrozenRegion, MutableRegion, RegionHandle};
use crate::serializer::MappedSerializer;

/// The system page size, cached.
pub(crate) fn page_size() -> usize {
    static PAGE: OnceLock<usize> = OnceLock::new();
    *PAGE.get_or_init(|| {
        // SAFETY: sysconf has no preconditions.
        let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(res).unwrap_or(4096)
    })
}

fn pages(bytes: u64, page: u64) -> u64 {
    bytes.div_ceil(page)
}

/// Sizing knobs for [`FileSerializer`] arenas.
///
/// The defaults reproduce the standard growth policy; they are exposed so
/// tests can force frequent arena turnover with small numbers.
#[derive(Debug, Clone)]
pub struct FileSerializerOptions {
    /// Minimum size of the first arena, in pages.
    pub min_first_arena_pages: u64,
    /// Minimum in-place growth step for the last arena, in pages.
    pub min_grow_pages: u64,
    /// New arenas are at least `currently_allocated / growth_divisor`
    /// bytes, keeping growth geometric. Zero disables the floor.
    pub growth_divisor: u64,
}

impl Default for FileSerializerOptions {
    fn default() -> Self {
        Self {
            min_first_arena_pages: 1024,
            min_grow_pages: 10_000,
            growth_divisor: 8,
        }
    }
}

/// One mapped span of the backing file, bump-allocated.
///
/// `base` never changes for the lifetime of the arena; in-place growth
/// only extends `mapped_len`. Offsets are mutated exclusively under the
/// owning serializer's lock; the atomics are for visibility at drop time.
struct FileArena {
    base: *mut u8,
    start_offset: u64,
    mapped_len: AtomicUsize,
    used: AtomicUsize,
    /// Keeps the descriptor open while any region handle is alive.
    _file: Arc<File>,
}

// SAFETY: the arena's memory is only written through single-owner
// MutableRegions, and all offset bookkeeping happens under the
// serializer's mutex.
unsafe impl Send for FileArena {}
// SAFETY: as above.
unsafe impl Sync for FileArena {}

impl FileArena {
    /// Bump-allocate `bytes` at `align`; `None` when the arena is full.
    fn bump(&self, bytes: usize, align: usize) -> Option<*mut u8> {
        let used = self.used.load(Ordering::Relaxed);
        let pad = match used % align {
            0 => 0,
            rem => align - rem,
        };
        let end = used.checked_add(pad)?.checked_add(bytes)?;
        if end > self.mapped_len.load(Ordering::Relaxed) {
            return None;
        }
        self.used.store(end, Ordering::Relaxed);
        // SAFETY: end <= mapped_len, so the offset stays inside the mapping.
        Some(unsafe { self.base.add(used + pad) })
    }
}

impl Drop for FileArena {
    fn drop(&mut self) {
        // SAFETY: base/mapped_len describe exactly the span mmap returned
        // (possibly extended in place); nothing references it anymore.
        unsafe {
            libc::munmap(self.base.cast(), self.mapped_len.load(Ordering::Acquire));
        }
    }
}

#[derive(Default)]
struct Inner {
    arenas: Vec<Arc<FileArena>>,
    /// Sum of arena lengths; equals the file length except right after a
    /// commit trimmed the tail.
    currently_allocated: u64,
    trimmed: bool,
}

/// File-backed [`MappedSerializer`] with growing mapped arenas.
///
/// # Thread Safety
///
/// All arena manipulation and every file-length change happens under one
/// internal mutex; `allocate_writable`, `freeze`, and `commit` are safe to
/// call concurrently. Within one thread, allocations that land in the same
/// arena receive monotonically increasing file offsets.
pub struct FileSerializer {
    file: Arc<File>,
    options: FileSerializerOptions,
    inner: Mutex<Inner>,
    deferred: Mutex<Option<RegionError>>,
}

impl FileSerializer {
    /// Create (or truncate) `path` and serialize into it.
    ///
    /// # Errors
    ///
    /// [`RegionError::Io`] when the file cannot be opened.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(path, FileSerializerOptions::default())
    }

    /// As [`create`](FileSerializer::create), with explicit sizing knobs.
    ///
    /// # Errors
    ///
    /// [`RegionError::Io`] when the file cannot be opened.
    pub fn with_options(path: impl AsRef<Path>, options: FileSerializerOptions) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file: Arc::new(file),
            options,
            inner: Mutex::new(Inner::default()),
            deferred: Mutex::new(None),
        })
    }

    /// Re-extend the file after a commit trimmed the tail, so the mapped
    /// arena pages stay backed.
    fn restore_length(&self, inner: &mut Inner) -> Result<()> {
        if inner.trimmed {
            self.file.set_len(inner.currently_allocated)?;
            inner.trimmed = false;
        }
        Ok(())
    }

    /// Map a fresh arena at the current end of the file.
    fn create_arena(&self, inner: &mut Inner, bytes_required: u64) -> Result<()> {
        let page = page_size() as u64;
        let mut num_pages =
            pages(bytes_required, page).max(self.options.min_first_arena_pages.max(1));
        if self.options.growth_divisor > 0 {
            // Geometric floor so arena count stays logarithmic in the
            // total allocated.
            num_pages =
                num_pages.max(pages(inner.currently_allocated, page) / self.options.growth_divisor);
        }
        let new_len = num_pages * page;

        self.file.set_len(inner.currently_allocated + new_len)?;

        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        // SAFETY: the descriptor is valid and the file extends past
        // offset + new_len; MAP_SHARED read+write over our own file.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                new_len as usize,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                inner.currently_allocated as libc::off_t,
            )
        };
        if addr == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            let _ = self.file.set_len(inner.currently_allocated);
            return Err(err.into());
        }

        debug!(
            bytes = new_len,
            file_offset = inner.currently_allocated,
            "mapped new arena"
        );

        #[allow(clippy::cast_possible_truncation)]
        inner.arenas.push(Arc::new(FileArena {
            base: addr.cast(),
            start_offset: inner.currently_allocated,
            mapped_len: AtomicUsize::new(new_len as usize),
            used: AtomicUsize::new(0),
            _file: Arc::clone(&self.file),
        }));
        inner.currently_allocated += new_len;
        self.verify_length(inner);
        Ok(())
    }

    /// Try to grow the last arena in place. Returns `Ok(false)` when the
    /// caller should fall back to a new arena; the file length is restored
    /// to its pre-grow value in that case.
    #[cfg(target_os = "linux")]
    fn expand_last_arena(&self, inner: &mut Inner, bytes_required: u64) -> Result<bool> {
        let Some(arena) = inner.arenas.last() else {
            return Ok(false);
        };
        let page = page_size() as u64;
        let old_len = arena.mapped_len.load(Ordering::Relaxed);
        let grow = pages(bytes_required, page).max(self.options.min_grow_pages.max(1)) * page;
        #[allow(clippy::cast_possible_truncation)]
        let new_len = old_len + grow as usize;

        self.file.set_len(inner.currently_allocated + grow)?;

        // SAFETY: base/old_len describe the live mapping; flags 0 forbids
        // the kernel from moving it, so success means the address held.
        let new_addr = unsafe { libc::mremap(arena.base.cast(), old_len, new_len, 0) };
        if new_addr == libc::MAP_FAILED || new_addr != arena.base.cast() {
            self.file.set_len(inner.currently_allocated)?;
            debug!(
                arena_len = old_len,
                wasted = old_len - arena.used.load(Ordering::Relaxed),
                "in-place growth failed; falling back to a new arena"
            );
            self.verify_length(inner);
            return Ok(false);
        }

        arena.mapped_len.store(new_len, Ordering::Release);
        inner.currently_allocated += grow;
        debug!(old_len, new_len, "expanded arena in place");
        self.verify_length(inner);
        Ok(true)
    }

    /// In-place growth needs `mremap`; elsewhere a full arena always gets
    /// a fresh one, which still preserves pointer stability.
    #[cfg(not(target_os = "linux"))]
    fn expand_last_arena(&self, _inner: &mut Inner, _bytes_required: u64) -> Result<bool> {
        Ok(false)
    }

    #[cfg(debug_assertions)]
    fn verify_length(&self, inner: &Inner) {
        if let Ok(meta) = self.file.metadata() {
            debug_assert_eq!(meta.len(), inner.currently_allocated);
        }
    }

    #[cfg(not(debug_assertions))]
    fn verify_length(&self, _inner: &Inner) {}
}

impl MappedSerializer for FileSerializer {
    fn allocate_writable(&self, bytes: u64, alignment: usize) -> Result<MutableRegion<'_>> {
        if bytes == 0 {
            return Ok(MutableRegion::empty(self));
        }

        let align = alignment.max(std::mem::size_of::<usize>());
        let size = usize::try_from(bytes)
            .map_err(|_| RegionError::Allocation { bytes, align })?;
        let slack = bytes
            .checked_add(align as u64)
            .ok_or(RegionError::Allocation { bytes, align })?;

        let mut inner = self.inner.lock();
        self.restore_length(&mut inner)?;

        loop {
            if let Some(arena) = inner.arenas.last() {
                if let Some(ptr) = arena.bump(size, align) {
                    let handle = RegionHandle::from_arc(Arc::clone(arena));
                    return Ok(MutableRegion::new(handle, ptr, size, self));
                }
            }
            if !self.expand_last_arena(&mut inner, slack)? {
                self.create_arena(&mut inner, slack)?;
            }
        }
    }

    fn freeze(&self, region: MutableRegion<'_>) -> Result<FrozenRegion> {
        Ok(region.into_frozen())
    }

    fn commit(&self) -> Result<()> {
        if let Some(err) = self.deferred.lock().take() {
            return Err(err);
        }
        let mut inner = self.inner.lock();
        let Some(last) = inner.arenas.last() else {
            return Ok(());
        };
        let high_water = last.start_offset + last.used.load(Ordering::Relaxed) as u64;
        self.file.set_len(high_water)?;
        inner.trimmed = true;
        Ok(())
    }

    fn record_error(&self, error: RegionError) {
        self.deferred.lock().get_or_insert(error);
    }
}

impl Drop for FileSerializer {
    fn drop(&mut self) {
        if let Err(err) = self.commit() {
            warn!("file serializer commit at drop failed: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    fn small_options() -> FileSerializerOptions {
        // Tiny arenas so growth and fallback paths run constantly.
        FileSerializerOptions {
            min_first_arena_pages: 1,
            min_grow_pages: 1,
            growth_divisor: 8,
        }
    }

    #[test]
    fn test_write_freeze_roundtrip() {
        let dir = tempdir().unwrap();
        let serializer = FileSerializer::create(dir.path().join("data.bin")).unwrap();

        let mut region = serializer.allocate_writable(10, 8).unwrap();
        region.data_mut().copy_from_slice(b"0123456789");
        assert_eq!(region.data().as_ptr() as usize % 8, 0);

        let frozen = region.freeze().unwrap();
        assert_eq!(frozen.data(), b"0123456789");
    }

    #[test]
    fn test_zero_length_allocation() {
        let dir = tempdir().unwrap();
        let serializer = FileSerializer::create(dir.path().join("data.bin")).unwrap();
        let region = serializer.allocate_writable(0, 64).unwrap();
        assert!(region.handle().is_null());
        let frozen = region.freeze().unwrap();
        assert!(frozen.is_empty());
    }

    #[test]
    fn test_alignment() {
        let dir = tempdir().unwrap();
        let serializer = FileSerializer::create(dir.path().join("data.bin")).unwrap();
        let word = std::mem::size_of::<usize>();
        for align in [1usize, 2, 8, 16, 64, 512] {
            for bytes in [1u64, 3, 17, 4096] {
                let region = serializer.allocate_writable(bytes, align).unwrap();
                assert_eq!(region.data().as_ptr() as usize % align.max(word), 0);
            }
        }
    }

    #[test]
    fn test_pointer_stability_across_growth() {
        let dir = tempdir().unwrap();
        let serializer =
            FileSerializer::with_options(dir.path().join("data.bin"), small_options()).unwrap();

        // Fill far beyond the first one-page arena so growth (in place or
        // by fallback) happens many times.
        let mut frozen = Vec::new();
        for i in 0u64..200 {
            let mut region = serializer.allocate_writable(4096, 8).unwrap();
            let ptr = region.data().as_ptr();
            #[allow(clippy::cast_possible_truncation)]
            region.data_mut().fill(i as u8);
            let region = region.freeze().unwrap();
            assert_eq!(region.data().as_ptr(), ptr);
            frozen.push((ptr, i as u8, region));
        }

        for (ptr, fill, region) in &frozen {
            assert_eq!(region.data().as_ptr(), *ptr, "pointer moved");
            assert!(region.data().iter().all(|b| b == fill), "bytes changed");
        }
    }

    #[test]
    fn test_commit_truncates_to_high_water() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let serializer = FileSerializer::create(&path).unwrap();

        // Word-aligned sizes, so no padding enters the accounting.
        for bytes in [64u64, 128, 256] {
            let mut region = serializer.allocate_writable(bytes, 8).unwrap();
            region.data_mut().fill(0xAB);
            region.freeze().unwrap();
        }
        serializer.commit().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 64 + 128 + 256);
    }

    #[test]
    fn test_allocate_after_commit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let serializer = FileSerializer::create(&path).unwrap();

        let mut region = serializer.allocate_writable(8, 8).unwrap();
        region.data_mut().copy_from_slice(b"firstone");
        region.freeze().unwrap();
        serializer.commit().unwrap();

        let mut region = serializer.allocate_writable(8, 8).unwrap();
        region.data_mut().copy_from_slice(b"otherone");
        let frozen = region.freeze().unwrap();
        serializer.commit().unwrap();

        assert_eq!(frozen.data(), b"otherone");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);
    }

    #[test]
    fn test_commit_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let serializer = FileSerializer::create(&path).unwrap();

        for i in 0u8..20 {
            let mut region = serializer.allocate_writable(4096, 8).unwrap();
            region.data_mut().fill(i);
            region.freeze().unwrap();
        }
        serializer.commit().unwrap();

        let mut contents = Vec::new();
        File::open(&path)
            .unwrap()
            .read_to_end(&mut contents)
            .unwrap();
        assert_eq!(contents.len(), 20 * 4096);
        for (i, chunk) in contents.chunks(4096).enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            let expected = i as u8;
            assert!(chunk.iter().all(|&b| b == expected), "chunk {i} corrupt");
        }
    }

    #[test]
    fn test_region_outlives_serializer() {
        let dir = tempdir().unwrap();
        let frozen = {
            let serializer = FileSerializer::create(dir.path().join("data.bin")).unwrap();
            let mut region = serializer.allocate_writable(5, 1).unwrap();
            region.data_mut().copy_from_slice(b"alive");
            region.freeze().unwrap()
        };
        // The arena handle keeps the mapping alive past the serializer.
        assert_eq!(frozen.data(), b"alive");
    }

    #[test]
    fn test_concurrent_allocations_are_disjoint() {
        let dir = tempdir().unwrap();
        let serializer =
            FileSerializer::with_options(dir.path().join("data.bin"), small_options()).unwrap();

        let mut spans: Vec<(usize, usize)> = std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for t in 0u8..4 {
                let serializer = &serializer;
                handles.push(scope.spawn(move || {
                    let mut spans = Vec::new();
                    for i in 0..500usize {
                        let bytes = [1usize, 17, 256, 4096][i % 4];
                        let mut region =
                            serializer.allocate_writable(bytes as u64, 8).unwrap();
                        assert_eq!(region.len(), bytes);
                        region.data_mut().fill(t);
                        let frozen = region.freeze().unwrap();
                        spans.push((frozen.data().as_ptr() as usize, frozen.len()));
                    }
                    spans
                }));
            }
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        spans.sort_unstable();
        for pair in spans.windows(2) {
            assert!(
                pair[0].0 + pair[0].1 <= pair[1].0,
                "overlapping allocations"
            );
        }
    }
}
