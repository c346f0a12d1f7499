//! Stored-entry ZIP emitter.

use std::io::Write;

use crate::error::{ArchiveError, Result};

use super::{
    CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIG, END_OF_CENTRAL_LEN, END_OF_CENTRAL_SIG, ENTRY_MODE,
    FLAG_UTF8, LOCAL_HEADER_LEN, LOCAL_HEADER_SIG, METHOD_STORE, VERSION_MADE_BY, VERSION_NEEDED,
};

/// A record remembered for the central directory.
struct DirectoryRecord {
    name: Vec<u8>,
    crc: u32,
    size: u32,
    header_offset: u32,
}

/// Sequential ZIP emitter: one header plus one stored payload per entry,
/// central directory at `finish`.
///
/// Entry sizes are known at header-write time, so no data descriptors are
/// emitted and every payload is a contiguous span addressable by offset
/// and length.
pub(crate) struct ZipWriter<W: Write> {
    out: W,
    offset: u64,
    directory: Vec<DirectoryRecord>,
    finished: bool,
}

fn zip32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| ArchiveError::UnsupportedContainer(format!("{what} exceeds the ZIP-32 limit")))
}

impl<W: Write> ZipWriter<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out,
            offset: 0,
            directory: Vec::new(),
            finished: false,
        }
    }

    /// Emit one stored entry: local header, name, payload.
    pub(crate) fn add_entry(&mut self, name: &str, data: &[u8]) -> Result<()> {
        debug_assert!(!self.finished, "entry emitted after the directory");

        let name = name.as_bytes();
        let name_len = u16::try_from(name.len()).map_err(|_| {
            ArchiveError::UnsupportedContainer("entry name exceeds 65535 bytes".to_string())
        })?;
        let size = zip32(data.len() as u64, "entry size")?;
        let header_offset = zip32(self.offset, "container size")?;
        let crc = crc32fast::hash(data);

        let mut header = [0u8; LOCAL_HEADER_LEN];
        header[0..4].copy_from_slice(&LOCAL_HEADER_SIG.to_le_bytes());
        header[4..6].copy_from_slice(&VERSION_NEEDED.to_le_bytes());
        header[6..8].copy_from_slice(&FLAG_UTF8.to_le_bytes());
        header[8..10].copy_from_slice(&METHOD_STORE.to_le_bytes());
        // Bytes 10..14: modification time and date, zero for determinism.
        header[14..18].copy_from_slice(&crc.to_le_bytes());
        header[18..22].copy_from_slice(&size.to_le_bytes());
        header[22..26].copy_from_slice(&size.to_le_bytes());
        header[26..28].copy_from_slice(&name_len.to_le_bytes());
        // Bytes 28..30: extra field length, zero.

        self.out.write_all(&header)?;
        self.out.write_all(name)?;
        self.out.write_all(data)?;
        self.offset += (LOCAL_HEADER_LEN + name.len() + data.len()) as u64;

        self.directory.push(DirectoryRecord {
            name: name.to_vec(),
            crc,
            size,
            header_offset,
        });
        Ok(())
    }

    /// Write the central directory and end record, then flush.
    ///
    /// Idempotent: a second call is a no-op.
    pub(crate) fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let directory_offset = zip32(self.offset, "central directory offset")?;
        let entry_count = u16::try_from(self.directory.len()).map_err(|_| {
            ArchiveError::UnsupportedContainer("more than 65535 entries".to_string())
        })?;

        let mut directory_size = 0u64;
        for record in &self.directory {
            #[allow(clippy::cast_possible_truncation)]
            let name_len = record.name.len() as u16;

            let mut header = [0u8; CENTRAL_HEADER_LEN];
            header[0..4].copy_from_slice(&CENTRAL_HEADER_SIG.to_le_bytes());
            header[4..6].copy_from_slice(&VERSION_MADE_BY.to_le_bytes());
            header[6..8].copy_from_slice(&VERSION_NEEDED.to_le_bytes());
            header[8..10].copy_from_slice(&FLAG_UTF8.to_le_bytes());
            header[10..12].copy_from_slice(&METHOD_STORE.to_le_bytes());
            // Bytes 12..16: modification time and date, zero.
            header[16..20].copy_from_slice(&record.crc.to_le_bytes());
            header[20..24].copy_from_slice(&record.size.to_le_bytes());
            header[24..28].copy_from_slice(&record.size.to_le_bytes());
            header[28..30].copy_from_slice(&name_len.to_le_bytes());
            // Bytes 30..36: extra, comment, disk-start, all zero.
            // Bytes 36..38: internal attributes, zero.
            header[38..42].copy_from_slice(&(ENTRY_MODE << 16).to_le_bytes());
            header[42..46].copy_from_slice(&record.header_offset.to_le_bytes());

            self.out.write_all(&header)?;
            self.out.write_all(&record.name)?;
            directory_size += (CENTRAL_HEADER_LEN + record.name.len()) as u64;
        }

        let directory_size = zip32(directory_size, "central directory size")?;

        let mut end = [0u8; END_OF_CENTRAL_LEN];
        end[0..4].copy_from_slice(&END_OF_CENTRAL_SIG.to_le_bytes());
        // Bytes 4..8: disk numbers, zero.
        end[8..10].copy_from_slice(&entry_count.to_le_bytes());
        end[10..12].copy_from_slice(&entry_count.to_le_bytes());
        end[12..16].copy_from_slice(&directory_size.to_le_bytes());
        end[16..20].copy_from_slice(&directory_offset.to_le_bytes());
        // Bytes 20..22: comment length, zero.

        self.out.write_all(&end)?;
        self.out.flush()?;
        Ok(())
    }
}
