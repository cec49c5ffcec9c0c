//! Extent value types
//!
//! A [`SimpleExtent`] is one contiguous range on one device. An
//! [`InterleavedExtent`] stripes a logical range round-robin across a fixed
//! set of strips in `chunk_size` units.

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use crate::{FmapError, FmapResult, MAX_STRIPS};

/// Contiguous physical range on one backing device.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimpleExtent {
    pub device_index: u64, // resolved by the device registry, not checked here
    pub offset: u64,       // physical offset on the device
    pub length: u64,
}

impl SimpleExtent {
    pub fn new(device_index: u64, offset: u64, length: u64) -> Self {
        Self {
            device_index,
            offset,
            length,
        }
    }

    pub fn validate(&self) -> FmapResult<()> {
        if self.length == 0 {
            return Err(FmapError::InvalidMap("zero-length extent"));
        }
        if self.offset.checked_add(self.length).is_none() {
            return Err(FmapError::InvalidMap("extent wraps the device address space"));
        }
        Ok(())
    }

    /// Physical offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

/// Logical range striped across `strips` in `chunk_size` units.
///
/// Chunk `k` of the logical range lives on strip `k % strips.len()`, at row
/// `k / strips.len()` of that strip. The strips may hold more than striping
/// needs; the excess is never addressed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct InterleavedExtent {
    pub chunk_size: u64,
    pub total_length: u64,
    pub strips: Vec<SimpleExtent>,
}

impl InterleavedExtent {
    pub fn new(chunk_size: u64, total_length: u64, strips: Vec<SimpleExtent>) -> Self {
        Self {
            chunk_size,
            total_length,
            strips,
        }
    }

    pub fn strip_count(&self) -> usize {
        self.strips.len()
    }

    /// Bytes strip `index` must back so that `total_length` is covered.
    ///
    /// Returns 0 for an index outside the strip set or a zero chunk size.
    pub fn required_strip_len(&self, index: usize) -> u64 {
        let n = self.strips.len() as u64;
        let idx = index as u64;
        if self.chunk_size == 0 || idx >= n {
            return 0;
        }
        let chunks = self.total_length.div_ceil(self.chunk_size);
        if chunks == 0 {
            return 0;
        }
        let rows = chunks / n;
        let extra = chunks % n;
        let owned = rows + u64::from(idx < extra);
        if owned == 0 {
            return 0;
        }
        let last_chunk = chunks - 1;
        if last_chunk % n == idx {
            // this strip holds the final, possibly partial chunk
            let tail = self.total_length - last_chunk * self.chunk_size;
            (owned - 1) * self.chunk_size + tail
        } else {
            owned * self.chunk_size
        }
    }

    pub fn validate(&self) -> FmapResult<()> {
        let n = self.strips.len();
        if n == 0 {
            return Err(FmapError::InvalidMap("interleaved extent has no strips"));
        }
        if n > MAX_STRIPS {
            return Err(FmapError::TooManyExtents {
                count: n as u64,
                max: MAX_STRIPS,
            });
        }
        if self.chunk_size == 0 {
            return Err(FmapError::InvalidMap("zero chunk size"));
        }
        for (i, strip) in self.strips.iter().enumerate() {
            strip.validate()?;
            if strip.length < self.required_strip_len(i) {
                return Err(FmapError::InvalidMap("strip too short for striped length"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn striped(chunk: u64, total: u64, lens: &[u64]) -> InterleavedExtent {
        let strips = lens
            .iter()
            .enumerate()
            .map(|(i, &len)| SimpleExtent::new(i as u64, 0, len))
            .collect();
        InterleavedExtent::new(chunk, total, strips)
    }

    #[test]
    fn simple_extent_needs_length() {
        assert!(SimpleExtent::new(0, 0, 0).validate().is_err());
        assert!(SimpleExtent::new(3, 4096, 1).validate().is_ok());
        assert!(SimpleExtent::new(0, u64::MAX, 2).validate().is_err());
    }

    #[test]
    fn required_len_spreads_whole_rows() {
        let ie = striped(4096, 4 * 4096, &[1, 1]);
        assert_eq!(ie.required_strip_len(0), 2 * 4096);
        assert_eq!(ie.required_strip_len(1), 2 * 4096);
    }

    #[test]
    fn required_len_partial_tail() {
        // chunks: s0, s1, s2, s0(100 bytes)
        let ie = striped(1000, 3100, &[1, 1, 1]);
        assert_eq!(ie.required_strip_len(0), 1100);
        assert_eq!(ie.required_strip_len(1), 1000);
        assert_eq!(ie.required_strip_len(2), 1000);
        assert_eq!(ie.required_strip_len(3), 0);
    }

    #[test]
    fn required_len_fewer_chunks_than_strips() {
        let ie = striped(4096, 4096, &[1, 1, 1]);
        assert_eq!(ie.required_strip_len(0), 4096);
        assert_eq!(ie.required_strip_len(1), 0);
    }

    #[test]
    fn validate_rejects_short_strip_and_accepts_overprovisioned() {
        assert!(striped(4096, 8192, &[4096, 4095]).validate().is_err());
        assert!(striped(4096, 8192, &[1 << 20, 4096]).validate().is_ok());
    }

    #[test]
    fn validate_bounds() {
        assert_eq!(
            striped(4096, 0, &[]).validate(),
            Err(FmapError::InvalidMap("interleaved extent has no strips"))
        );
        assert!(striped(0, 0, &[1]).validate().is_err());
        let lens = vec![4096u64; MAX_STRIPS + 1];
        assert!(matches!(
            striped(4096, 4096, &lens).validate(),
            Err(FmapError::TooManyExtents { .. })
        ));
    }
}
