//! Per-file map record
//!
//! A [`FileMap`] is built once when a file's backing storage is established
//! and is never edited afterwards. It is attached to the file through
//! [`crate::meta::FileMeta`].

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::{
    extent::{InterleavedExtent, SimpleExtent},
    FmapError, FmapResult, MAX_EXTENTS, MAX_INTERLEAVED_EXTENTS,
};

/// Kind of file the map backs. Superblock and log are filesystem-internal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Superblock,
    Log,
}

impl FileKind {
    pub fn from_raw(raw: u32) -> FmapResult<Self> {
        match raw {
            0 => Ok(FileKind::Regular),
            1 => Ok(FileKind::Superblock),
            2 => Ok(FileKind::Log),
            _ => Err(FmapError::InvalidMap("unknown file type")),
        }
    }

    pub fn to_raw(self) -> u32 {
        match self {
            FileKind::Regular => 0,
            FileKind::Superblock => 1,
            FileKind::Log => 2,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExtentKind {
    Simple,
    Interleaved,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ExtentPayload {
    Simple(Vec<SimpleExtent>),
    Interleaved(Vec<InterleavedExtent>),
}

impl ExtentPayload {
    pub fn kind(&self) -> ExtentKind {
        match self {
            ExtentPayload::Simple(_) => ExtentKind::Simple,
            ExtentPayload::Interleaved(_) => ExtentKind::Interleaved,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileMap {
    pub file_size: u64,
    pub file_kind: FileKind,
    pub extent_kind: ExtentKind,
    pub payload: ExtentPayload,
}

impl FileMap {
    /// Simple map over `extents`, in logical order.
    pub fn simple(file_kind: FileKind, file_size: u64, extents: Vec<SimpleExtent>) -> Self {
        Self {
            file_size,
            file_kind,
            extent_kind: ExtentKind::Simple,
            payload: ExtentPayload::Simple(extents),
        }
    }

    pub fn interleaved(file_kind: FileKind, file_size: u64, extent: InterleavedExtent) -> Self {
        Self {
            file_size,
            file_kind,
            extent_kind: ExtentKind::Interleaved,
            payload: ExtentPayload::Interleaved(alloc::vec![extent]),
        }
    }

    /// Bytes addressable through the payload. Saturates instead of wrapping;
    /// `validate` rejects a map whose sum overflows.
    pub fn capacity_bytes(&self) -> u64 {
        match &self.payload {
            ExtentPayload::Simple(list) => list
                .iter()
                .fold(0u64, |acc, e| acc.saturating_add(e.length)),
            ExtentPayload::Interleaved(list) => list
                .iter()
                .fold(0u64, |acc, ie| acc.saturating_add(ie.total_length)),
        }
    }

    pub fn validate(&self) -> FmapResult<()> {
        if self.extent_kind != self.payload.kind() {
            return Err(FmapError::InvalidMap("extent kind does not match payload"));
        }
        match &self.payload {
            ExtentPayload::Simple(list) => {
                if list.len() > MAX_EXTENTS {
                    return Err(FmapError::TooManyExtents {
                        count: list.len() as u64,
                        max: MAX_EXTENTS,
                    });
                }
                if list.is_empty() {
                    return Err(FmapError::InvalidMap("no extents"));
                }
                let mut total = 0u64;
                for ext in list {
                    ext.validate()?;
                    total = total
                        .checked_add(ext.length)
                        .ok_or(FmapError::InvalidMap("extent lengths overflow"))?;
                }
            }
            ExtentPayload::Interleaved(list) => {
                if list.len() != MAX_INTERLEAVED_EXTENTS {
                    return Err(FmapError::InvalidMap(
                        "exactly one interleaved extent is permitted",
                    ));
                }
                for ie in list {
                    ie.validate()?;
                }
            }
        }
        let capacity = self.capacity_bytes();
        if self.file_size > capacity {
            return Err(FmapError::SizeMismatch {
                file_size: self.file_size,
                capacity,
            });
        }
        Ok(())
    }

    pub fn simple_extents(&self) -> Option<&[SimpleExtent]> {
        match &self.payload {
            ExtentPayload::Simple(list) => Some(list),
            ExtentPayload::Interleaved(_) => None,
        }
    }

    pub fn interleaved_extent(&self) -> Option<&InterleavedExtent> {
        match &self.payload {
            ExtentPayload::Interleaved(list) => list.first(),
            ExtentPayload::Simple(_) => None,
        }
    }

    /// JSON dump of the record for tooling.
    pub fn to_record(&self) -> FmapResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|_| FmapError::InvalidMap("record encoding failed"))
    }

    /// Loads a record written by [`FileMap::to_record`] and validates it.
    pub fn from_record(data: &[u8]) -> FmapResult<Self> {
        let map: FileMap =
            serde_json::from_slice(data).map_err(|_| FmapError::InvalidMap("malformed record"))?;
        map.validate()?;
        Ok(map)
    }
}
