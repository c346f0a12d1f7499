//! Byte-stream adapters bridging `std::io` to regions.
//!
//! The write side accumulates into an internal buffer and lands in the
//! owning serializer as one frozen region at the end; the read side wraps
//! a [`FrozenRegion`] in a seekable source. Stream clients stay ignorant
//! of the serializer's allocation model.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::Result;
use crate::region::FrozenRegion;
use crate::serializer::MappedSerializer;

/// Buffered sink that becomes one frozen region in its owning serializer.
///
/// Call [`finish`](SerializerSink::finish) to flush and obtain the region.
/// Dropping an unfinished sink still writes the accumulated bytes; a
/// failure on that path is stashed on the owner and surfaces at the
/// owner's next `commit`.
pub struct SerializerSink<'a> {
    owner: &'a dyn MappedSerializer,
    buffer: Vec<u8>,
    finished: bool,
}

impl<'a> SerializerSink<'a> {
    /// Open a sink over `owner`.
    pub fn new(owner: &'a dyn MappedSerializer) -> Self {
        Self {
            owner,
            buffer: Vec::new(),
            finished: false,
        }
    }

    /// Bytes accumulated so far.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn write_out(&mut self) -> Result<FrozenRegion> {
        let mut region = self
            .owner
            .allocate_writable(self.buffer.len() as u64, 1)?;
        region.data_mut().copy_from_slice(&self.buffer);
        self.owner.freeze(region)
    }

    /// Flush the accumulated bytes into the owner as one frozen region.
    ///
    /// # Errors
    ///
    /// Propagates the owner's allocation or freeze failure.
    pub fn finish(mut self) -> Result<FrozenRegion> {
        self.finished = true;
        self.write_out()
    }
}

impl Write for SerializerSink<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for SerializerSink<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.write_out() {
            self.owner.record_error(err);
        }
    }
}

/// Seekable read-only source over a [`FrozenRegion`].
///
/// Holds its own clone of the region's handle, so the source outlives any
/// transient reference it was built from. Out-of-range seeks clamp to the
/// region bounds rather than erroring.
pub struct RegionReader {
    region: FrozenRegion,
    pos: u64,
}

impl RegionReader {
    /// Read from the start of `region`.
    #[must_use]
    pub fn new(region: FrozenRegion) -> Self {
        Self { region, pos: 0 }
    }

    /// The underlying region.
    #[must_use]
    pub fn region(&self) -> &FrozenRegion {
        &self.region
    }
}

impl Read for RegionReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let data = self.region.data();
        #[allow(clippy::cast_possible_truncation)]
        let pos = (self.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - pos);
        buf[..n].copy_from_slice(&data[pos..pos + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for RegionReader {
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn seek(&mut self, target: SeekFrom) -> std::io::Result<u64> {
        let len = self.region.len() as i64;
        let wanted = match target {
            SeekFrom::Start(offset) => offset.min(len as u64) as i64,
            SeekFrom::End(delta) => len.saturating_add(delta),
            SeekFrom::Current(delta) => (self.pos as i64).saturating_add(delta),
        };
        self.pos = wanted.clamp(0, len) as u64;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySerializer;

    #[test]
    fn test_sink_roundtrip() {
        let serializer = MemorySerializer::new();
        let mut sink = serializer.open_stream();
        sink.write_all(b"hello ").unwrap();
        sink.write_all(b"stream").unwrap();
        assert_eq!(sink.buffered(), 12);

        let frozen = sink.finish().unwrap();
        assert_eq!(frozen.data(), b"hello stream");
    }

    #[test]
    fn test_empty_sink() {
        let serializer = MemorySerializer::new();
        let frozen = serializer.open_stream().finish().unwrap();
        assert!(frozen.is_empty());
    }

    #[test]
    fn test_reader_sequential() {
        let mut reader = RegionReader::new(FrozenRegion::from_vec(b"0123456789".to_vec()));
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"456789");
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_reader_seek_semantics() {
        let mut reader = RegionReader::new(FrozenRegion::from_vec(b"0123456789".to_vec()));
        let mut buf = [0u8; 2];

        assert_eq!(reader.seek(SeekFrom::Start(4)).unwrap(), 4);
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"45");

        assert_eq!(reader.seek(SeekFrom::Current(-2)).unwrap(), 4);
        assert_eq!(reader.seek(SeekFrom::End(-3)).unwrap(), 7);
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"78");
    }

    #[test]
    fn test_reader_seek_clamps() {
        let mut reader = RegionReader::new(FrozenRegion::from_vec(b"abc".to_vec()));
        assert_eq!(reader.seek(SeekFrom::Start(100)).unwrap(), 3);
        assert_eq!(reader.seek(SeekFrom::Current(-100)).unwrap(), 0);
        assert_eq!(reader.seek(SeekFrom::End(5)).unwrap(), 3);
        assert_eq!(reader.seek(SeekFrom::End(-100)).unwrap(), 0);
    }
}
