//! Central-directory parser for stored-only containers.

use crate::error::{ArchiveError, Result};

use super::{
    CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIG, END_OF_CENTRAL_LEN, END_OF_CENTRAL_SIG,
    LOCAL_HEADER_LEN, LOCAL_HEADER_SIG, METHOD_STORE,
};

/// One entry as indexed from the central directory: the payload is the
/// span `data_offset..data_offset + size` of the container bytes.
#[derive(Debug)]
pub(crate) struct RawEntry {
    pub(crate) name: String,
    pub(crate) data_offset: usize,
    pub(crate) size: usize,
}

fn malformed(what: impl Into<String>) -> ArchiveError {
    ArchiveError::UnsupportedContainer(what.into())
}

fn u16_at(bytes: &[u8], pos: usize) -> Result<u16> {
    bytes
        .get(pos..pos + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| malformed("truncated record"))
}

fn u32_at(bytes: &[u8], pos: usize) -> Result<u32> {
    bytes
        .get(pos..pos + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| malformed("truncated record"))
}

/// Locate the end-of-central-directory record, scanning back over a
/// possible archive comment.
fn find_end_record(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < END_OF_CENTRAL_LEN {
        return Err(malformed("too short to be a ZIP container"));
    }
    let floor = bytes
        .len()
        .saturating_sub(END_OF_CENTRAL_LEN + usize::from(u16::MAX));
    let mut pos = bytes.len() - END_OF_CENTRAL_LEN;
    loop {
        if u32_at(bytes, pos)? == END_OF_CENTRAL_SIG {
            let comment_len = usize::from(u16_at(bytes, pos + 20)?);
            if pos + END_OF_CENTRAL_LEN + comment_len == bytes.len() {
                return Ok(pos);
            }
        }
        if pos == floor {
            return Err(malformed("no end-of-central-directory record"));
        }
        pos -= 1;
    }
}

/// Compute where an entry's payload starts by reading its local header
/// (whose name/extra lengths need not match the central record's).
fn payload_offset(bytes: &[u8], header_offset: usize) -> Result<usize> {
    if u32_at(bytes, header_offset)? != LOCAL_HEADER_SIG {
        return Err(malformed("bad local header signature"));
    }
    let name_len = usize::from(u16_at(bytes, header_offset + 26)?);
    let extra_len = usize::from(u16_at(bytes, header_offset + 28)?);
    Ok(header_offset + LOCAL_HEADER_LEN + name_len + extra_len)
}

/// Walk the central directory and index every entry.
///
/// Entries must be stored (method 0) so their payloads are addressable
/// inside the container bytes; anything else fails with
/// [`ArchiveError::UnsupportedContainer`]. Zero-length entries are
/// recorded as offset 0, length 0.
pub(crate) fn read_directory(bytes: &[u8]) -> Result<Vec<RawEntry>> {
    let end_record = find_end_record(bytes)?;
    let entry_count = usize::from(u16_at(bytes, end_record + 10)?);
    let directory_size = u32_at(bytes, end_record + 12)? as usize;
    let directory_offset = u32_at(bytes, end_record + 16)? as usize;
    if directory_offset
        .checked_add(directory_size)
        .map_or(true, |end| end > end_record)
    {
        return Err(malformed("central directory outside the container"));
    }

    let mut entries = Vec::with_capacity(entry_count);
    let mut pos = directory_offset;
    for _ in 0..entry_count {
        if u32_at(bytes, pos)? != CENTRAL_HEADER_SIG {
            return Err(malformed("bad central directory signature"));
        }
        let method = u16_at(bytes, pos + 10)?;
        let size = u32_at(bytes, pos + 24)? as usize;
        let name_len = usize::from(u16_at(bytes, pos + 28)?);
        let extra_len = usize::from(u16_at(bytes, pos + 30)?);
        let comment_len = usize::from(u16_at(bytes, pos + 32)?);
        let header_offset = u32_at(bytes, pos + 42)? as usize;

        let name_bytes = bytes
            .get(pos + CENTRAL_HEADER_LEN..pos + CENTRAL_HEADER_LEN + name_len)
            .ok_or_else(|| malformed("truncated entry name"))?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| malformed("entry name is not UTF-8"))?
            .to_string();

        if method != METHOD_STORE {
            return Err(malformed(format!(
                "entry `{name}` is compressed (method {method}); only stored entries are addressable"
            )));
        }

        let data_offset = if size == 0 {
            0
        } else {
            let offset = payload_offset(bytes, header_offset)?;
            if offset.checked_add(size).map_or(true, |end| end > bytes.len()) {
                return Err(malformed(format!(
                    "payload of `{name}` falls outside the container"
                )));
            }
            offset
        };

        entries.push(RawEntry {
            name,
            data_offset,
            size,
        });
        pos += CENTRAL_HEADER_LEN + name_len + extra_len + comment_len;
    }

    Ok(entries)
}
