//! famfs file-map layer
//!
//! Describes how a file's logical byte range is backed by extents on one or
//! more fabric-attached memory devices, and implements the two generations of
//! the control protocol used by user-space tooling to install and read back
//! those maps.
#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod error;
pub mod extent;
pub mod fmap;
pub mod ioctl;
pub mod meta;
pub mod translate;
pub mod user;
pub mod wire;


pub use error::{FmapError, FmapResult};
pub use extent::{InterleavedExtent, SimpleExtent};
pub use fmap::{ExtentKind, ExtentPayload, FileKind, FileMap};
pub use ioctl::ioctl;
pub use meta::FileMeta;
pub use translate::{Resolved, Runs};

/// Kernel ABI revision implemented by [`wire::v2`].
pub const KABI_VERSION: u32 = 43;

/// Simple extents carried by one map.
pub const MAX_EXTENTS: usize = 2;

/// Strips carried by one interleaved extent.
pub const MAX_STRIPS: usize = 16;

/// Interleaved extents carried by one map.
pub const MAX_INTERLEAVED_EXTENTS: usize = 1;

#[macro_export]
macro_rules! le_u32 {
    ($buf:expr, $at:expr) => {{
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&$buf[$at..$at + 4]);
        u32::from_le_bytes(raw)
    }};
}

#[macro_export]
macro_rules! le_u64 {
    ($buf:expr, $at:expr) => {{
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&$buf[$at..$at + 8]);
        u64::from_le_bytes(raw)
    }};
}

#[macro_export]
macro_rules! put_u32 {
    ($buf:expr, $at:expr, $val:expr) => {
        $buf[$at..$at + 4].copy_from_slice(&($val as u32).to_le_bytes())
    };
}

#[macro_export]
macro_rules! put_u64 {
    ($buf:expr, $at:expr, $val:expr) => {
        $buf[$at..$at + 8].copy_from_slice(&($val as u64).to_le_bytes())
    };
}
