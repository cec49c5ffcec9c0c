//! KABI 42 map structures. Frozen: v1 requests must stay decodable as-is.

use alloc::vec::Vec;

use super::{check_len, MapCodec, Opcode};
use crate::{
    extent::SimpleExtent, le_u32, le_u64, put_u32, put_u64, user::UserMemory, ExtentKind,
    FileKind, FileMap, FmapError, FmapResult, MAX_EXTENTS,
};

pub const SIMPLE_DAX_EXTENT: u32 = 0;
pub const INTERLEAVED_EXTENT: u32 = 1;
pub const INVALID_EXTENT_TYPE: u32 = 2;

/// `struct famfs_extent`. v1 extents have no device index; they always live
/// on device 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IocExtent {
    pub offset: u64,
    pub len: u64,
}

impl IocExtent {
    pub const SIZE: usize = 16;

    pub fn from_bytes(buf: &[u8]) -> FmapResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            offset: le_u64!(buf, 0),
            len: le_u64!(buf, 8),
        })
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        put_u64!(buf, 0, self.offset);
        put_u64!(buf, 8, self.len);
    }

    fn from_extent(ext: &SimpleExtent) -> FmapResult<Self> {
        if ext.device_index != 0 {
            return Err(FmapError::EncodingOverflow(
                "v1 extents cannot name a device other than 0",
            ));
        }
        Ok(Self {
            offset: ext.offset,
            len: ext.length,
        })
    }
}

/// `struct famfs_ioc_map`: used both to create and to get a v1 map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IocMap {
    pub extent_type: u32,
    pub file_type: u32,
    pub file_size: u64,
    pub ext_list_count: u64,
    pub ext_list: [IocExtent; MAX_EXTENTS],
}

impl IocMap {
    pub const SIZE: usize = 24 + MAX_EXTENTS * IocExtent::SIZE;

    pub fn from_bytes(buf: &[u8]) -> FmapResult<Self> {
        check_len(buf, Self::SIZE)?;
        let mut ext_list = [IocExtent::default(); MAX_EXTENTS];
        for (i, ext) in ext_list.iter_mut().enumerate() {
            let at = 24 + i * IocExtent::SIZE;
            *ext = IocExtent::from_bytes(&buf[at..at + IocExtent::SIZE])?;
        }
        Ok(Self {
            extent_type: le_u32!(buf, 0),
            file_type: le_u32!(buf, 4),
            file_size: le_u64!(buf, 8),
            ext_list_count: le_u64!(buf, 16),
            ext_list,
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        put_u32!(buf, 0, self.extent_type);
        put_u32!(buf, 4, self.file_type);
        put_u64!(buf, 8, self.file_size);
        put_u64!(buf, 16, self.ext_list_count);
        for (i, ext) in self.ext_list.iter().enumerate() {
            let at = 24 + i * IocExtent::SIZE;
            ext.write_to(&mut buf[at..at + IocExtent::SIZE]);
        }
        buf
    }

    /// Converts into a validated [`FileMap`].
    pub fn to_file_map(&self) -> FmapResult<FileMap> {
        if self.extent_type != SIMPLE_DAX_EXTENT {
            return Err(FmapError::InvalidMap("v1 maps carry simple extents only"));
        }
        let file_kind = FileKind::from_raw(self.file_type)?;
        if self.ext_list_count > MAX_EXTENTS as u64 {
            return Err(FmapError::TooManyExtents {
                count: self.ext_list_count,
                max: MAX_EXTENTS,
            });
        }
        let extents: Vec<SimpleExtent> = self.ext_list[..self.ext_list_count as usize]
            .iter()
            .map(|e| SimpleExtent::new(0, e.offset, e.len))
            .collect();
        let map = FileMap::simple(file_kind, self.file_size, extents);
        map.validate()?;
        Ok(map)
    }

    /// Builds the v1 form of `map`, refusing anything v1 cannot carry.
    pub fn from_file_map(map: &FileMap) -> FmapResult<Self> {
        let list = match (map.extent_kind, map.simple_extents()) {
            (ExtentKind::Simple, Some(list)) => list,
            _ => {
                return Err(FmapError::EncodingOverflow(
                    "v1 cannot carry interleaved extents",
                ))
            }
        };
        if list.len() > MAX_EXTENTS {
            return Err(FmapError::EncodingOverflow("too many extents for v1"));
        }
        let mut ext_list = [IocExtent::default(); MAX_EXTENTS];
        for (slot, ext) in ext_list.iter_mut().zip(list) {
            *slot = IocExtent::from_extent(ext)?;
        }
        Ok(Self {
            extent_type: SIMPLE_DAX_EXTENT,
            file_type: map.file_kind.to_raw(),
            file_size: map.file_size,
            ext_list_count: list.len() as u64,
            ext_list,
        })
    }
}

/// Extent returned by the `MAP_GETEXT` diagnostic: the first extent of a
/// simple map.
pub fn encode_getext(map: &FileMap, out: &mut [u8]) -> FmapResult<()> {
    check_len(out, IocExtent::SIZE)?;
    let first = map
        .simple_extents()
        .and_then(|list| list.first())
        .ok_or(FmapError::EncodingOverflow("no simple extent to report"))?;
    IocExtent::from_extent(first)?.write_to(out);
    Ok(())
}

pub struct V1;

impl MapCodec for V1 {
    const CREATE: Opcode = Opcode::MapCreate;
    const GET: Opcode = Opcode::MapGet;

    fn decode_create(arg: &[u8], _user: &dyn UserMemory) -> FmapResult<FileMap> {
        IocMap::from_bytes(arg)?.to_file_map()
    }

    fn encode_get(map: &FileMap, out: &mut [u8]) -> FmapResult<()> {
        check_len(out, IocMap::SIZE)?;
        let bytes = IocMap::from_file_map(map)?.to_bytes();
        out.copy_from_slice(&bytes);
        Ok(())
    }

    fn decode_get(arg: &[u8]) -> FmapResult<FileMap> {
        IocMap::from_bytes(arg)?.to_file_map()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{extent::InterleavedExtent, user::NoUserMemory};
    use alloc::vec;

    fn request(count: u64, file_size: u64) -> [u8; IocMap::SIZE] {
        IocMap {
            extent_type: SIMPLE_DAX_EXTENT,
            file_type: 0,
            file_size,
            ext_list_count: count,
            ext_list: [
                IocExtent {
                    offset: 0x40_0000,
                    len: 0x20_0000,
                },
                IocExtent {
                    offset: 0x80_0000,
                    len: 0x20_0000,
                },
            ],
        }
        .to_bytes()
    }

    #[test]
    fn layout_is_56_bytes() {
        assert_eq!(IocMap::SIZE, 56);
        let buf = request(2, 100);
        assert_eq!(&buf[8..16], &100u64.to_le_bytes());
        assert_eq!(&buf[16..24], &2u64.to_le_bytes());
        assert_eq!(&buf[40..48], &0x80_0000u64.to_le_bytes());
    }

    #[test]
    fn decode_create_builds_device_zero_map() {
        let map = V1::decode_create(&request(2, 0x30_0000), &NoUserMemory).unwrap();
        assert_eq!(map.file_size, 0x30_0000);
        assert_eq!(
            map.simple_extents().unwrap(),
            &[
                SimpleExtent::new(0, 0x40_0000, 0x20_0000),
                SimpleExtent::new(0, 0x80_0000, 0x20_0000)
            ]
        );
    }

    #[test]
    fn decode_create_rejects_bad_requests() {
        assert_eq!(
            V1::decode_create(&request(3, 1), &NoUserMemory),
            Err(FmapError::TooManyExtents { count: 3, max: 2 })
        );
        assert_eq!(
            V1::decode_create(&request(1, 0x20_0001), &NoUserMemory),
            Err(FmapError::SizeMismatch {
                file_size: 0x20_0001,
                capacity: 0x20_0000
            })
        );
        let mut striped = IocMap::from_bytes(&request(1, 1)).unwrap();
        striped.extent_type = INTERLEAVED_EXTENT;
        assert!(matches!(
            striped.to_file_map(),
            Err(FmapError::InvalidMap(_))
        ));
        striped.extent_type = INVALID_EXTENT_TYPE;
        assert!(matches!(
            V1::decode_create(&striped.to_bytes(), &NoUserMemory),
            Err(FmapError::InvalidMap(_))
        ));
        assert_eq!(
            V1::decode_create(&[0u8; 55], &NoUserMemory),
            Err(FmapError::ShortBuffer { need: 56, got: 55 })
        );
    }

    #[test]
    fn get_refuses_what_v1_cannot_carry() {
        let mut out = [0u8; IocMap::SIZE];
        let striped = FileMap::interleaved(
            FileKind::Regular,
            4096,
            InterleavedExtent::new(4096, 4096, vec![SimpleExtent::new(0, 0, 4096)]),
        );
        assert!(matches!(
            V1::encode_get(&striped, &mut out),
            Err(FmapError::EncodingOverflow(_))
        ));
        let other_dev = FileMap::simple(FileKind::Regular, 1, vec![SimpleExtent::new(1, 0, 1)]);
        assert!(matches!(
            V1::encode_get(&other_dev, &mut out),
            Err(FmapError::EncodingOverflow(_))
        ));
        assert_eq!(out, [0u8; IocMap::SIZE]);
    }

    #[test]
    fn getext_reports_first_extent() {
        let map = V1::decode_create(&request(2, 10), &NoUserMemory).unwrap();
        let mut out = [0u8; IocExtent::SIZE];
        encode_getext(&map, &mut out).unwrap();
        assert_eq!(
            IocExtent::from_bytes(&out).unwrap(),
            IocExtent {
                offset: 0x40_0000,
                len: 0x20_0000
            }
        );
    }
}
