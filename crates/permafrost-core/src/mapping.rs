//! Read-only file mapping into a [`FrozenRegion`].

use std::fs::File;

use memmap2::MmapOptions;

use crate::error::{RegionError, Result};
use crate::region::{FrozenRegion, RegionHandle};

/// Map a byte range of a `file://` URL read-only.
///
/// The underlying map is page-aligned (the mapping layer rounds the offset
/// down and the length up); the returned region points at the exact
/// requested bytes, and its handle owns the mapping plus the descriptor.
/// A `length` of `None` means "to the end of the file".
///
/// # Errors
///
/// [`RegionError::UnsupportedScheme`] for any non-`file://` URL, and
/// [`RegionError::Io`] when the file cannot be opened, stat'ed, or mapped.
pub fn map_file(url: &str, start_offset: u64, length: Option<u64>) -> Result<FrozenRegion> {
    let Some(path) = url.strip_prefix("file://") else {
        let scheme = url.split("://").next().unwrap_or(url);
        return Err(RegionError::UnsupportedScheme(scheme.to_string()));
    };

    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let length = length.unwrap_or_else(|| file_len.saturating_sub(start_offset));
    if length == 0 {
        return Ok(FrozenRegion::empty());
    }

    let len = usize::try_from(length).map_err(|_| RegionError::Allocation {
        bytes: length,
        align: 1,
    })?;

    // SAFETY: the region is read-only and its handle owns both mapping and
    // descriptor; truncation of the file by another process is outside the
    // contract (as for any shared mapping).
    let map = unsafe { MmapOptions::new().offset(start_offset).len(len).map(&file)? };
    let data = map.as_ptr();
    let handle = RegionHandle::new(map);
    // SAFETY: `data` points at `len` bytes owned by the mapping inside
    // `handle`.
    Ok(unsafe { FrozenRegion::from_raw_parts(handle, data, len) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn file_url(path: &std::path::Path) -> String {
        format!("file://{}", path.display())
    }

    #[test]
    fn test_map_whole_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mapped.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"the quick brown fox")
            .unwrap();

        let region = map_file(&file_url(&path), 0, None).unwrap();
        assert_eq!(region.data(), b"the quick brown fox");
    }

    #[test]
    fn test_map_subrange_unaligned_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mapped.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"the quick brown fox")
            .unwrap();

        let region = map_file(&file_url(&path), 4, Some(5)).unwrap();
        assert_eq!(region.data(), b"quick");
    }

    #[test]
    fn test_map_empty_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.bin");
        std::fs::File::create(&path).unwrap();

        let region = map_file(&file_url(&path), 0, None).unwrap();
        assert!(region.is_empty());
    }

    #[test]
    fn test_non_file_scheme_rejected() {
        let err = map_file("http://example.com/data.bin", 0, None).unwrap_err();
        assert!(matches!(err, RegionError::UnsupportedScheme(s) if s == "http"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = map_file("file:///definitely/not/here.bin", 0, None).unwrap_err();
        assert!(matches!(err, RegionError::Io(_)));
    }
}
