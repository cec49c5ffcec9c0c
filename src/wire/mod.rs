//! Control-protocol wire structures
//!
//! Two protocol generations live side by side. Each one is a separate
//! [`MapCodec`] implementation; the opcode of a request picks the codec,
//! nothing inside the payload does. The v1 codec is frozen.
//!
//! Layouts are the C layouts of the famfs ioctl ABI on LP64 little-endian
//! hosts.

pub mod v1;
pub mod v2;

use bitflags::bitflags;

use crate::{user::UserMemory, FileMap, FmapError, FmapResult};

pub use v1::V1;
pub use v2::V2;

bitflags! {
    /// Transfer direction bits of an ioctl number, seen from user space.
    pub struct IocDir: u32 {
        const WRITE = 1;
        const READ = 2;
    }
}

pub const IOC_MAGIC: u8 = b'u';

const IOC_NRSHIFT: u32 = 0;
const IOC_TYPESHIFT: u32 = 8;
const IOC_SIZESHIFT: u32 = 16;
const IOC_DIRSHIFT: u32 = 30;

/// Linux `_IOC` number encoding.
pub const fn ioc(dir: IocDir, nr: u8, size: usize) -> u32 {
    (dir.bits() << IOC_DIRSHIFT)
        | ((size as u32) << IOC_SIZESHIFT)
        | ((IOC_MAGIC as u32) << IOC_TYPESHIFT)
        | ((nr as u32) << IOC_NRSHIFT)
}

pub const MAP_CREATE: u32 = ioc(IocDir::WRITE, 0x50, v1::IocMap::SIZE);
pub const MAP_GET: u32 = ioc(IocDir::READ, 0x51, v1::IocMap::SIZE);
pub const MAP_GETEXT: u32 = ioc(IocDir::READ, 0x52, v1::IocExtent::SIZE);
pub const NOP: u32 = ioc(IocDir::empty(), 0x53, 0);
pub const MAP_CREATE_V2: u32 = ioc(IocDir::WRITE, 0x54, v2::IocFmap::SIZE);
pub const MAP_GET_V2: u32 = ioc(IocDir::READ, 0x55, v2::IocGetFmap::SIZE);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    MapCreate,
    MapGet,
    MapGetExt,
    Nop,
    MapCreateV2,
    MapGetV2,
}

impl Opcode {
    pub fn from_raw(cmd: u32) -> FmapResult<Self> {
        match cmd {
            MAP_CREATE => Ok(Opcode::MapCreate),
            MAP_GET => Ok(Opcode::MapGet),
            MAP_GETEXT => Ok(Opcode::MapGetExt),
            NOP => Ok(Opcode::Nop),
            MAP_CREATE_V2 => Ok(Opcode::MapCreateV2),
            MAP_GET_V2 => Ok(Opcode::MapGetV2),
            _ => Err(FmapError::UnknownOpcode(cmd)),
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            Opcode::MapCreate => MAP_CREATE,
            Opcode::MapGet => MAP_GET,
            Opcode::MapGetExt => MAP_GETEXT,
            Opcode::Nop => NOP,
            Opcode::MapCreateV2 => MAP_CREATE_V2,
            Opcode::MapGetV2 => MAP_GET_V2,
        }
    }

    /// Argument size encoded in the opcode.
    pub fn arg_size(self) -> usize {
        ((self.raw() >> IOC_SIZESHIFT) & 0x3fff) as usize
    }
}

/// One protocol generation's create/get codec.
pub trait MapCodec {
    const CREATE: Opcode;
    const GET: Opcode;

    /// Decodes and validates a create request. Lists referenced by pointer are
    /// fetched from `user`.
    fn decode_create(arg: &[u8], user: &dyn UserMemory) -> FmapResult<FileMap>;

    /// Encodes `map` into the fixed get structure. `out` must be exactly the
    /// get structure's size.
    fn encode_get(map: &FileMap, out: &mut [u8]) -> FmapResult<()>;

    /// Decodes a get structure produced by `encode_get`.
    fn decode_get(arg: &[u8]) -> FmapResult<FileMap>;
}

pub(crate) fn check_len(buf: &[u8], need: usize) -> FmapResult<()> {
    if buf.len() != need {
        return Err(FmapError::ShortBuffer {
            need,
            got: buf.len(),
        });
    }
    Ok(())
}
