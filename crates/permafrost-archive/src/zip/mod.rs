//! Minimal stored-only ZIP plumbing.
//!
//! Only what the container needs: local file headers, a central directory,
//! and the end-of-central-directory record, all with compression method 0
//! (store) so every entry's payload is a contiguous, mmap-addressable
//! span of the container file. Classic ZIP-32 limits apply; anything past
//! them is rejected rather than spilled into zip64 records.

mod reader;
mod writer;

pub(crate) use reader::{read_directory, RawEntry};
pub(crate) use writer::ZipWriter;

pub(crate) const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
pub(crate) const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
pub(crate) const END_OF_CENTRAL_SIG: u32 = 0x0605_4b50;

pub(crate) const METHOD_STORE: u16 = 0;
pub(crate) const VERSION_NEEDED: u16 = 20;
/// Unix host system, so the external attributes carry a file mode.
pub(crate) const VERSION_MADE_BY: u16 = (3 << 8) | 20;
/// General-purpose bit 11: names are UTF-8.
pub(crate) const FLAG_UTF8: u16 = 1 << 11;
/// Regular file, mode 0440.
pub(crate) const ENTRY_MODE: u32 = 0o100_440;

pub(crate) const LOCAL_HEADER_LEN: usize = 30;
pub(crate) const CENTRAL_HEADER_LEN: usize = 46;
pub(crate) const END_OF_CENTRAL_LEN: usize = 22;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ArchiveError;

    fn build(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = ZipWriter::new(&mut out);
        for (name, data) in entries {
            writer.add_entry(name, data).unwrap();
        }
        writer.finish().unwrap();
        out
    }

    #[test]
    fn test_roundtrip_directory() {
        let bytes = build(&[
            ("a", b"hello"),
            ("b/c", b"world"),
            ("b/d", b""),
        ]);

        let entries = read_directory(&bytes).unwrap();
        assert_eq!(entries.len(), 3);

        assert_eq!(entries[0].name, "a");
        assert_eq!(
            &bytes[entries[0].data_offset..entries[0].data_offset + entries[0].size],
            b"hello"
        );
        assert_eq!(entries[1].name, "b/c");
        assert_eq!(
            &bytes[entries[1].data_offset..entries[1].data_offset + entries[1].size],
            b"world"
        );
        assert_eq!(entries[2].name, "b/d");
        assert_eq!(entries[2].size, 0);
        assert_eq!(entries[2].data_offset, 0);
    }

    #[test]
    fn test_wire_shape() {
        let bytes = build(&[("x", b"payload")]);

        // Local header first, end-of-central-directory record last.
        assert_eq!(&bytes[0..4], &LOCAL_HEADER_SIG.to_le_bytes());
        let eocd = bytes.len() - END_OF_CENTRAL_LEN;
        assert_eq!(&bytes[eocd..eocd + 4], &END_OF_CENTRAL_SIG.to_le_bytes());
        // Method field of the local header says "store".
        assert_eq!(&bytes[8..10], &METHOD_STORE.to_le_bytes());
        // The payload sits right after the 30-byte header and 1-byte name.
        assert_eq!(&bytes[31..38], b"payload");
    }

    #[test]
    fn test_empty_archive() {
        let bytes = build(&[]);
        assert_eq!(bytes.len(), END_OF_CENTRAL_LEN);
        assert!(read_directory(&bytes).unwrap().is_empty());
    }

    #[test]
    fn test_compressed_entry_rejected() {
        let mut bytes = build(&[("a", b"hello")]);
        // Flip the central directory's method field to deflate.
        let entries_start = 30 + 1 + 5;
        bytes[entries_start + 10] = 8;
        let err = read_directory(&bytes).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedContainer(_)));
    }

    #[test]
    fn test_truncated_container_rejected() {
        let bytes = build(&[("a", b"hello")]);
        let err = read_directory(&bytes[..bytes.len() - 4]).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedContainer(_)));
    }

    #[test]
    fn test_garbage_rejected() {
        let err = read_directory(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedContainer(_)));
    }
}
