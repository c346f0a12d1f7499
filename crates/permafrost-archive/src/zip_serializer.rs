//! Container writer: a structured serializer emitting an uncompressed ZIP.
//!
//! The root owns the output sink and the archive state; sub-structures
//! share both through an `Arc` and differ only in their path prefix. A
//! leaf serializer buffers in memory and emits one stored entry — header
//! plus contiguous payload — when it is dropped, which is also why entry
//! sizes are known at header-write time. Sub-structures never become
//! physical directory entries; they only prefix their descendants' names.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use fxhash::FxHashSet;
use parking_lot::Mutex;
use tracing::warn;

use permafrost_core::{
    FrozenRegion, MappedSerializer, MemorySerializer, MutableRegion, RegionError,
};

use crate::error::{ArchiveError, Result};
use crate::path::{Path, PathElement};
use crate::structured::StructuredSerializer;
use crate::zip::ZipWriter;

/// Block size for the buffered output stream.
const STREAM_BLOCK_SIZE: usize = 64 * 1024;

/// Archive state shared by the root and every sub-structure and leaf.
struct ArchiveState {
    writer: Mutex<ZipWriter<Box<dyn Write + Send>>>,
    /// Full rendered paths already bound to a leaf.
    reserved: Mutex<FxHashSet<String>>,
    /// First failure from an entry finalizer; reported at root commit.
    deferred: Mutex<Option<ArchiveError>>,
}

impl ArchiveState {
    fn reserve(&self, path: &Path) -> Result<()> {
        let name = path.to_string();
        if !self.reserved.lock().insert(name.clone()) {
            return Err(ArchiveError::InvalidPath(format!(
                "`{name}` is already bound in this container"
            )));
        }
        Ok(())
    }

    fn emit(&self, path: &Path, region: &FrozenRegion) -> Result<()> {
        self.writer.lock().add_entry(&path.to_string(), region.data())
    }

    fn defer(&self, error: ArchiveError) {
        self.deferred.lock().get_or_insert(error);
    }
}

/// [`StructuredSerializer`] writing an uncompressed ZIP container.
///
/// Every leaf becomes a stored (method 0) entry, so a reader can address
/// each payload as a contiguous span of the container file. Emission of
/// complete entries is serialized by the root's lock; entry order follows
/// finalization order, so containers are deterministic for deterministic
/// writers.
pub struct ZipStructuredSerializer {
    state: Arc<ArchiveState>,
    path: Path,
    root: bool,
}

impl ZipStructuredSerializer {
    /// Create a container file at `path`.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Io`] when the file cannot be created.
    pub fn create(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(BufWriter::with_capacity(
            STREAM_BLOCK_SIZE,
            file,
        )))
    }

    /// Write the container to an arbitrary byte sink.
    pub fn from_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            state: Arc::new(ArchiveState {
                writer: Mutex::new(ZipWriter::new(Box::new(out))),
                reserved: Mutex::new(FxHashSet::default()),
                deferred: Mutex::new(None),
            }),
            path: Path::root(),
            root: true,
        }
    }
}

impl StructuredSerializer for ZipStructuredSerializer {
    fn path(&self) -> &Path {
        &self.path
    }

    fn new_structure(&self, name: &PathElement) -> Result<Box<dyn StructuredSerializer>> {
        Ok(Box::new(Self {
            state: Arc::clone(&self.state),
            path: self.path.child(name.clone()),
            root: false,
        }))
    }

    fn new_entry(&self, name: &PathElement) -> Result<Box<dyn MappedSerializer>> {
        let path = self.path.child(name.clone());
        self.state.reserve(&path)?;
        Ok(Box::new(ZipEntrySerializer {
            inner: MemorySerializer::new(),
            frozen: Mutex::new(None),
            state: Arc::clone(&self.state),
            path,
        }))
    }

    fn commit(&self) -> Result<()> {
        if !self.root {
            return Ok(());
        }
        if let Some(err) = self.state.deferred.lock().take() {
            return Err(err);
        }
        self.state.writer.lock().finish()
    }
}

impl Drop for ZipStructuredSerializer {
    fn drop(&mut self) {
        if !self.root {
            return;
        }
        if let Err(err) = self.state.writer.lock().finish() {
            warn!("closing zip container at drop failed: {err}");
        }
    }
}

/// Leaf serializer: buffers in heap memory, emits one container entry at
/// `path` when dropped.
///
/// The entry's payload is whatever was frozen last (empty if nothing
/// was); a failure while emitting is stashed with the container and
/// surfaces at the root's `commit`.
struct ZipEntrySerializer {
    inner: MemorySerializer,
    frozen: Mutex<Option<FrozenRegion>>,
    state: Arc<ArchiveState>,
    path: Path,
}

impl MappedSerializer for ZipEntrySerializer {
    fn allocate_writable(
        &self,
        bytes: u64,
        alignment: usize,
    ) -> permafrost_core::Result<MutableRegion<'_>> {
        // Rebind the owner so freezes dispatch back through this entry.
        Ok(self
            .inner
            .allocate_writable(bytes, alignment)?
            .with_owner(self))
    }

    fn freeze(&self, region: MutableRegion<'_>) -> permafrost_core::Result<FrozenRegion> {
        let frozen = self.inner.freeze(region.with_owner(&self.inner))?;
        *self.frozen.lock() = Some(frozen.clone());
        Ok(frozen)
    }

    fn commit(&self) -> permafrost_core::Result<()> {
        Ok(())
    }

    fn record_error(&self, error: RegionError) {
        self.state.defer(error.into());
    }
}

impl Drop for ZipEntrySerializer {
    fn drop(&mut self) {
        let region = self.frozen.lock().take().unwrap_or_else(FrozenRegion::empty);
        if let Err(err) = self.state.emit(&self.path, &region) {
            warn!("emitting container entry `{}` failed: {err}", self.path);
            self.state.defer(err);
        }
    }
}
