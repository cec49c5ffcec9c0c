//! Per-file metadata attachment point
//!
//! Each file holds at most one [`FileMap`] for its whole lifetime. Install
//! is a single atomic check-and-install; once installed the map is shared
//! read-only by every reader.

use alloc::sync::Arc;
use log::{debug, warn};
use spin::Once;

use crate::{FileKind, FileMap, FmapError, FmapResult, Resolved, Runs};

pub struct FileMeta {
    map: Once<Arc<FileMap>>,
}

impl FileMeta {
    pub fn new() -> Self {
        Self { map: Once::new() }
    }

    /// Validates `map` and attaches it. A file that already has a map keeps
    /// it and the call fails with `AlreadyMapped`; a map that fails
    /// validation is never attached.
    pub fn install(&self, map: FileMap) -> FmapResult<Arc<FileMap>> {
        map.validate()?;
        let mut installed = false;
        let stored = self.map.call_once(|| {
            installed = true;
            Arc::new(map)
        });
        if !installed {
            warn!("file already mapped, refusing second map");
            return Err(FmapError::AlreadyMapped);
        }
        debug!(
            "installed {:?} map for {:?} file, size {}",
            stored.extent_kind, stored.file_kind, stored.file_size
        );
        Ok(stored.clone())
    }

    pub fn map(&self) -> FmapResult<Arc<FileMap>> {
        self.map.get().cloned().ok_or(FmapError::Unmapped)
    }

    pub fn is_mapped(&self) -> bool {
        self.map.is_completed()
    }

    pub fn file_kind(&self) -> FmapResult<FileKind> {
        Ok(self.map()?.file_kind)
    }

    pub fn resolve(&self, offset: u64) -> FmapResult<Resolved> {
        self.map.get().ok_or(FmapError::Unmapped)?.resolve(offset)
    }

    /// Runs covering `[offset, offset + len)` of the file.
    pub fn runs(&self, offset: u64, len: u64) -> FmapResult<Runs<'_>> {
        Ok(self
            .map
            .get()
            .ok_or(FmapError::Unmapped)?
            .resolve_range(offset, len))
    }
}

impl Default for FileMeta {
    fn default() -> Self {
        Self::new()
    }
}
