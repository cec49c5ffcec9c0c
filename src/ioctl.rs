//! Control operations keyed by opcode.
//!
//! The opcode alone selects the codec; the v1 and v2 paths share nothing but
//! the metadata slot they install into.

use log::{debug, warn};

use crate::{
    meta::FileMeta,
    user::UserMemory,
    wire::{check_len, v1, MapCodec, Opcode, V1, V2},
    FmapError, FmapResult,
};

/// Runs control request `cmd` against `meta`. `arg` is the request or
/// response structure and must be exactly the size encoded in `cmd`. Failed
/// requests leave `meta` untouched.
pub fn ioctl(meta: &FileMeta, cmd: u32, arg: &mut [u8], user: &dyn UserMemory) -> FmapResult<()> {
    let op = Opcode::from_raw(cmd)?;
    check_len(arg, op.arg_size())?;
    match op {
        Opcode::Nop => Ok(()),
        Opcode::MapCreate => create::<V1>(meta, arg, user),
        Opcode::MapCreateV2 => create::<V2>(meta, arg, user),
        Opcode::MapGet => get::<V1>(meta, arg),
        Opcode::MapGetV2 => get::<V2>(meta, arg),
        Opcode::MapGetExt => {
            let map = meta.map()?;
            v1::encode_getext(&map, arg)
        }
    }
}

/// [`ioctl`] with the result folded into a kernel-style return value.
pub fn ioctl_ret(meta: &FileMeta, cmd: u32, arg: &mut [u8], user: &dyn UserMemory) -> i32 {
    match ioctl(meta, cmd, arg, user) {
        Ok(()) => 0,
        Err(e) => e.errno(),
    }
}

fn create<C: MapCodec>(meta: &FileMeta, arg: &[u8], user: &dyn UserMemory) -> FmapResult<()> {
    if meta.is_mapped() {
        return Err(FmapError::AlreadyMapped);
    }
    let map = C::decode_create(arg, user).map_err(|e| {
        warn!("{:?} rejected: {}", C::CREATE, e);
        e
    })?;
    meta.install(map)?;
    Ok(())
}

fn get<C: MapCodec>(meta: &FileMeta, arg: &mut [u8]) -> FmapResult<()> {
    let map = meta.map()?;
    C::encode_get(&map, arg)?;
    debug!("{:?} returned {:?} map", C::GET, map.extent_kind);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        user::{BufferArena, NoUserMemory},
        wire::{
            self,
            v1::{IocExtent, IocMap},
            v2::IocGetFmap,
        },
        FileKind, FileMap, SimpleExtent,
    };
    use alloc::vec;

    #[test]
    fn nop_and_unknown() {
        let meta = FileMeta::new();
        assert_eq!(ioctl(&meta, wire::NOP, &mut [], &NoUserMemory), Ok(()));
        assert_eq!(
            ioctl(&meta, 0xdead, &mut [], &NoUserMemory),
            Err(FmapError::UnknownOpcode(0xdead))
        );
        assert_eq!(ioctl_ret(&meta, 0xdead, &mut [], &NoUserMemory), -25);
    }

    #[test]
    fn get_before_create() {
        let meta = FileMeta::new();
        let mut out = [0u8; IocGetFmap::SIZE];
        assert_eq!(
            ioctl(&meta, wire::MAP_GET_V2, &mut out, &NoUserMemory),
            Err(FmapError::Unmapped)
        );
        let mut ext = [0u8; 16];
        assert_eq!(
            ioctl(&meta, wire::MAP_GETEXT, &mut ext, &NoUserMemory),
            Err(FmapError::Unmapped)
        );
    }

    #[test]
    fn wrong_argument_size() {
        let meta = FileMeta::new();
        let mut small = [0u8; 8];
        assert_eq!(
            ioctl(&meta, wire::MAP_GET, &mut small, &NoUserMemory),
            Err(FmapError::ShortBuffer { need: 56, got: 8 })
        );
    }

    #[test]
    fn v1_create_then_get() {
        let meta = FileMeta::new();
        let map = FileMap::simple(
            FileKind::Regular,
            4000,
            vec![SimpleExtent::new(0, 0x20_0000, 4096)],
        );
        let mut arg = IocMap::from_file_map(&map).unwrap().to_bytes();
        ioctl(&meta, wire::MAP_CREATE, &mut arg, &NoUserMemory).unwrap();

        let mut out = [0u8; IocMap::SIZE];
        ioctl(&meta, wire::MAP_GET, &mut out, &NoUserMemory).unwrap();
        assert_eq!(out, arg);
    }

    #[test]
    fn getext_on_mapped_file() {
        let meta = FileMeta::new();
        let map = FileMap::simple(
            FileKind::Regular,
            8192,
            vec![
                SimpleExtent::new(0, 0x40_0000, 4096),
                SimpleExtent::new(0, 0x80_0000, 4096),
            ],
        );
        let mut arg = IocMap::from_file_map(&map).unwrap().to_bytes();
        ioctl(&meta, wire::MAP_CREATE, &mut arg, &NoUserMemory).unwrap();

        let mut ext = [0u8; IocExtent::SIZE];
        ioctl(&meta, wire::MAP_GETEXT, &mut ext, &NoUserMemory).unwrap();
        assert_eq!(
            IocExtent::from_bytes(&ext).unwrap(),
            IocExtent {
                offset: 0x40_0000,
                len: 4096
            }
        );
    }

    #[test]
    fn failed_create_installs_nothing() {
        let meta = FileMeta::new();
        let map = FileMap::simple(
            FileKind::Regular,
            4096,
            vec![SimpleExtent::new(3, 0, 4095)],
        );
        let mut arena = BufferArena::new();
        let mut arg = wire::v2::CreateRequest::for_map(&map)
            .stage(&mut arena)
            .unwrap();
        assert!(matches!(
            ioctl(&meta, wire::MAP_CREATE_V2, &mut arg, &arena),
            Err(FmapError::SizeMismatch { .. })
        ));
        assert!(!meta.is_mapped());
    }
}
