//! Logical to physical address translation
//!
//! Simple maps lay their extents end to end in logical order. Interleaved
//! maps place chunk `k` of the striped range on strip `k % n`, row `k / n`.
//! A translated run never crosses an extent or chunk boundary.

use log::error;
#[cfg(feature = "trace-translate")]
use log::trace;
use serde::Serialize;

use crate::{
    extent::{InterleavedExtent, SimpleExtent},
    ExtentPayload, FileMap, FmapError, FmapResult,
};

/// Physical location of a logical offset and the contiguous bytes available
/// from it.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub device_index: u64,
    pub physical_offset: u64,
    pub run_length: u64,
}

impl FileMap {
    /// Translates `offset`, which must be below `file_size`.
    pub fn resolve(&self, offset: u64) -> FmapResult<Resolved> {
        if offset >= self.file_size {
            return Err(FmapError::OffsetOutOfRange {
                offset,
                file_size: self.file_size,
            });
        }
        let found = match &self.payload {
            ExtentPayload::Simple(list) => resolve_simple(list, offset),
            ExtentPayload::Interleaved(list) => resolve_interleaved(list, offset),
        };
        let Some(mut res) = found else {
            error!(
                "no extent covers offset {} of {}-byte file: map is corrupt",
                offset, self.file_size
            );
            return Err(FmapError::UnresolvedExtent(offset));
        };
        res.run_length = res.run_length.min(self.file_size - offset);
        #[cfg(feature = "trace-translate")]
        trace!(
            "offset {} -> dev {} @ {} (+{})",
            offset,
            res.device_index,
            res.physical_offset,
            res.run_length
        );
        Ok(res)
    }

    /// Successive runs covering `[offset, offset + len)`, clipped to the file
    /// size. Stops after the first error.
    pub fn resolve_range(&self, offset: u64, len: u64) -> Runs<'_> {
        Runs {
            map: self,
            next: offset,
            end: offset.saturating_add(len).min(self.file_size),
            failed: false,
        }
    }
}

fn resolve_simple(list: &[SimpleExtent], offset: u64) -> Option<Resolved> {
    let mut span_start = 0u64;
    for ext in list {
        let within = offset - span_start;
        if within < ext.length {
            return Some(Resolved {
                device_index: ext.device_index,
                physical_offset: ext.offset.checked_add(within)?,
                run_length: ext.length - within,
            });
        }
        span_start = span_start.checked_add(ext.length)?;
    }
    None
}

fn resolve_interleaved(list: &[InterleavedExtent], offset: u64) -> Option<Resolved> {
    let mut span_start = 0u64;
    for ie in list {
        let within = offset - span_start;
        if within < ie.total_length {
            let mut res = resolve_striped(ie, within)?;
            res.run_length = res.run_length.min(ie.total_length - within);
            return Some(res);
        }
        span_start = span_start.checked_add(ie.total_length)?;
    }
    None
}

fn resolve_striped(ie: &InterleavedExtent, offset: u64) -> Option<Resolved> {
    let chunk = ie.chunk_size;
    let n = ie.strips.len() as u64;
    if chunk == 0 || n == 0 {
        return None;
    }
    let chunk_index = offset / chunk;
    let stripe_row = chunk_index / n;
    let strip_idx = chunk_index % n;
    let within_chunk = offset % chunk;

    let strip = &ie.strips[strip_idx as usize];
    let in_strip = stripe_row.checked_mul(chunk)?.checked_add(within_chunk)?;
    if in_strip >= strip.length {
        // under-provisioned strip
        return None;
    }
    Some(Resolved {
        device_index: strip.device_index,
        physical_offset: strip.offset.checked_add(in_strip)?,
        run_length: (chunk - within_chunk).min(strip.length - in_strip),
    })
}

/// Iterator returned by [`FileMap::resolve_range`].
pub struct Runs<'a> {
    map: &'a FileMap,
    next: u64,
    end: u64,
    failed: bool,
}

impl Iterator for Runs<'_> {
    type Item = FmapResult<Resolved>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next >= self.end {
            return None;
        }
        match self.map.resolve(self.next) {
            Ok(mut res) => {
                res.run_length = res.run_length.min(self.end - self.next);
                self.next += res.run_length;
                Some(Ok(res))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExtentKind, FileKind};
    use alloc::vec;
    use alloc::vec::Vec;

    fn two_way(file_size: u64) -> FileMap {
        FileMap::interleaved(
            FileKind::Regular,
            file_size,
            InterleavedExtent::new(
                4096,
                file_size,
                vec![SimpleExtent::new(0, 0, 1 << 20), SimpleExtent::new(1, 0, 1 << 20)],
            ),
        )
    }

    fn res(device_index: u64, physical_offset: u64, run_length: u64) -> Resolved {
        Resolved {
            device_index,
            physical_offset,
            run_length,
        }
    }

    #[test]
    fn interleaved_chunk_boundary() {
        let map = two_way(8192);
        assert_eq!(map.resolve(4095), Ok(res(0, 4095, 1)));
        assert_eq!(map.resolve(4096), Ok(res(1, 0, 4096)));
    }

    #[test]
    fn interleaved_second_row() {
        let map = FileMap::interleaved(
            FileKind::Regular,
            5 * 4096,
            InterleavedExtent::new(
                4096,
                5 * 4096,
                vec![
                    SimpleExtent::new(4, 0x10_0000, 3 * 4096),
                    SimpleExtent::new(7, 0x90_0000, 2 * 4096),
                ],
            ),
        );
        map.validate().unwrap();
        // chunk 3 -> strip 1, row 1
        assert_eq!(map.resolve(3 * 4096 + 10), Ok(res(7, 0x90_0000 + 4096 + 10, 4086)));
        // chunk 4 -> strip 0, row 2
        assert_eq!(map.resolve(4 * 4096), Ok(res(4, 0x10_0000 + 2 * 4096, 4096)));
    }

    #[test]
    fn run_capped_at_file_size() {
        let map = two_way(6000);
        assert_eq!(map.resolve(5000), Ok(res(1, 904, 1000)));
    }

    #[test]
    fn simple_boundaries() {
        let map = FileMap::simple(
            FileKind::Regular,
            500,
            vec![SimpleExtent::new(0, 1000, 500)],
        );
        assert_eq!(map.resolve(499), Ok(res(0, 1499, 1)));
        assert_eq!(
            map.resolve(500),
            Err(FmapError::OffsetOutOfRange {
                offset: 500,
                file_size: 500
            })
        );
    }

    #[test]
    fn simple_second_extent() {
        let map = FileMap::simple(
            FileKind::Log,
            3000,
            vec![SimpleExtent::new(0, 0, 1000), SimpleExtent::new(2, 8000, 4000)],
        );
        assert_eq!(map.resolve(999), Ok(res(0, 999, 1)));
        assert_eq!(map.resolve(1000), Ok(res(2, 8000, 2000)));
    }

    #[test]
    fn corrupt_map_is_not_papered_over() {
        // bypasses validate(): file_size beyond the only extent
        let map = FileMap {
            file_size: 2000,
            file_kind: FileKind::Regular,
            extent_kind: ExtentKind::Simple,
            payload: ExtentPayload::Simple(vec![SimpleExtent::new(0, 0, 1000)]),
        };
        assert!(map.validate().is_err());
        assert_eq!(map.resolve(1500), Err(FmapError::UnresolvedExtent(1500)));

        let short_strip = FileMap::interleaved(
            FileKind::Regular,
            8192,
            InterleavedExtent::new(
                4096,
                8192,
                vec![SimpleExtent::new(0, 0, 4096), SimpleExtent::new(1, 0, 100)],
            ),
        );
        assert_eq!(
            short_strip.resolve(4096 + 200),
            Err(FmapError::UnresolvedExtent(4296))
        );
    }

    #[test]
    fn range_splits_at_chunks() {
        let map = two_way(3 * 4096);
        let runs: Vec<Resolved> = map
            .resolve_range(2048, 8192)
            .collect::<FmapResult<_>>()
            .unwrap();
        assert_eq!(
            runs,
            vec![res(0, 2048, 2048), res(1, 0, 4096), res(0, 4096, 2048)]
        );
        assert_eq!(map.resolve_range(3 * 4096, 10).count(), 0);
        let tail: Vec<_> = map.resolve_range(3 * 4096 - 1, 100).collect();
        assert_eq!(tail, vec![Ok(res(0, 4096 + 4095, 1))]);
    }
}
