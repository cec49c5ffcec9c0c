//! Access to caller-owned memory named by pointers inside control requests.

use alloc::{collections::BTreeMap, vec::Vec};

use crate::{FmapError, FmapResult};

/// Source of bytes behind a user pointer.
pub trait UserMemory {
    /// Copy `buf.len()` bytes starting at `addr`. Fails with
    /// [`FmapError::BadAddress`] when any part of the range is unreadable.
    fn copy_from_user(&self, addr: u64, buf: &mut [u8]) -> FmapResult<()>;
}

/// No readable user memory. Requests that carry pointers fail with
/// `BadAddress`.
pub struct NoUserMemory;

impl UserMemory for NoUserMemory {
    fn copy_from_user(&self, addr: u64, _buf: &mut [u8]) -> FmapResult<()> {
        Err(FmapError::BadAddress(addr))
    }
}

/// Buffers placed at synthetic addresses, used by tooling to stage the
/// out-of-line lists of a v2 create request.
pub struct BufferArena {
    buffers: BTreeMap<u64, Vec<u8>>,
    next_addr: u64,
}

const ARENA_BASE: u64 = 0x1000;
const ARENA_ALIGN: u64 = 64;

impl BufferArena {
    pub fn new() -> Self {
        Self {
            buffers: BTreeMap::new(),
            next_addr: ARENA_BASE,
        }
    }

    /// Stores `data` and returns the address it can be read back from.
    pub fn place(&mut self, data: Vec<u8>) -> u64 {
        let addr = self.next_addr;
        let span = (data.len() as u64).max(1);
        self.next_addr = (addr + span).next_multiple_of(ARENA_ALIGN);
        self.buffers.insert(addr, data);
        addr
    }
}

impl Default for BufferArena {
    fn default() -> Self {
        Self::new()
    }
}

impl UserMemory for BufferArena {
    fn copy_from_user(&self, addr: u64, buf: &mut [u8]) -> FmapResult<()> {
        let (&base, data) = self
            .buffers
            .range(..=addr)
            .next_back()
            .ok_or(FmapError::BadAddress(addr))?;
        let start = (addr - base) as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= data.len())
            .ok_or(FmapError::BadAddress(addr))?;
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }
}
