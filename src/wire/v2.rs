//! KABI 43 map structures, adding device indices and striping.
//!
//! A create request is a small fixed header whose lists are referenced by
//! user pointers. A get response is a single worst-case-sized structure with
//! every list inline; the extent type in its header says which union arm is
//! populated.

use alloc::vec::Vec;

use super::{check_len, MapCodec, Opcode};
use crate::{
    extent::{InterleavedExtent, SimpleExtent},
    le_u32, le_u64, put_u32, put_u64,
    user::{BufferArena, UserMemory},
    ExtentPayload, FileKind, FileMap, FmapError, FmapResult, MAX_EXTENTS,
    MAX_INTERLEAVED_EXTENTS, MAX_STRIPS,
};

pub const EXT_SIMPLE: u32 = 0;
pub const EXT_INTERLEAVE: u32 = 1;

/// `struct famfs_ioc_simple_extent`
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IocSimpleExtent {
    pub devindex: u64,
    pub offset: u64,
    pub len: u64,
}

impl IocSimpleExtent {
    pub const SIZE: usize = 24;

    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            devindex: le_u64!(buf, 0),
            offset: le_u64!(buf, 8),
            len: le_u64!(buf, 16),
        }
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        put_u64!(buf, 0, self.devindex);
        put_u64!(buf, 8, self.offset);
        put_u64!(buf, 16, self.len);
    }
}

impl From<&SimpleExtent> for IocSimpleExtent {
    fn from(ext: &SimpleExtent) -> Self {
        Self {
            devindex: ext.device_index,
            offset: ext.offset,
            len: ext.length,
        }
    }
}

impl From<IocSimpleExtent> for SimpleExtent {
    fn from(ext: IocSimpleExtent) -> Self {
        SimpleExtent::new(ext.devindex, ext.offset, ext.len)
    }
}

/// `struct famfs_ioc_interleaved_ext`. `nbytes` is the striped length; the
/// strips together may hold more.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IocInterleavedExt {
    pub nstrips: u64,
    pub chunk_size: u64,
    pub nbytes: u64,
    pub strips_ptr: u64,
}

impl IocInterleavedExt {
    pub const SIZE: usize = 32;

    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            nstrips: le_u64!(buf, 0),
            chunk_size: le_u64!(buf, 8),
            nbytes: le_u64!(buf, 16),
            strips_ptr: le_u64!(buf, 24),
        }
    }

    pub fn write_to(&self, buf: &mut [u8]) {
        put_u64!(buf, 0, self.nstrips);
        put_u64!(buf, 8, self.chunk_size);
        put_u64!(buf, 16, self.nbytes);
        put_u64!(buf, 24, self.strips_ptr);
    }
}

/// `struct famfs_ioc_fmap`. `count` is the simple extent count or the
/// interleaved extent count depending on `ext_type`; `list_ptr` points at
/// that many entries of the matching type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IocFmap {
    pub file_size: u64,
    pub file_type: u32,
    pub ext_type: u32,
    pub count: u32,
    pub list_ptr: u64,
}

impl IocFmap {
    pub const SIZE: usize = 32;

    pub fn from_bytes(buf: &[u8]) -> FmapResult<Self> {
        check_len(buf, Self::SIZE)?;
        Ok(Self {
            file_size: le_u64!(buf, 0),
            file_type: le_u32!(buf, 8),
            ext_type: le_u32!(buf, 12),
            count: le_u32!(buf, 16),
            list_ptr: le_u64!(buf, 24),
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        self.write_to(&mut buf);
        buf
    }

    fn write_to(&self, buf: &mut [u8]) {
        put_u64!(buf, 0, self.file_size);
        put_u32!(buf, 8, self.file_type);
        put_u32!(buf, 12, self.ext_type);
        put_u32!(buf, 16, self.count);
        put_u64!(buf, 24, self.list_ptr);
    }
}

/// `struct famfs_ioc_get_fmap`: header followed by either `MAX_EXTENTS`
/// simple extents or one interleaved descriptor and `MAX_STRIPS` strips.
/// Pointers in the response are always zero.
pub struct IocGetFmap;

impl IocGetFmap {
    const UNION_OFF: usize = IocFmap::SIZE;
    const STRIPS_OFF: usize = Self::UNION_OFF + IocInterleavedExt::SIZE;
    pub const SIZE: usize = Self::STRIPS_OFF + MAX_STRIPS * IocSimpleExtent::SIZE;
}

/// Arm of a typed v2 create request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateBody {
    Simple(Vec<SimpleExtent>),
    Interleaved {
        nstrips: u64,
        chunk_size: u64,
        nbytes: u64,
        strips: Vec<SimpleExtent>,
    },
}

/// A v2 create request before it is laid out for the control call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRequest {
    pub file_size: u64,
    pub file_kind: FileKind,
    pub body: CreateBody,
}

impl CreateRequest {
    /// Request that would install `map`.
    pub fn for_map(map: &FileMap) -> Self {
        let body = match &map.payload {
            ExtentPayload::Simple(list) => CreateBody::Simple(list.clone()),
            ExtentPayload::Interleaved(list) => match list.first() {
                Some(ie) => CreateBody::Interleaved {
                    nstrips: ie.strip_count() as u64,
                    chunk_size: ie.chunk_size,
                    nbytes: ie.total_length,
                    strips: ie.strips.clone(),
                },
                None => CreateBody::Interleaved {
                    nstrips: 0,
                    chunk_size: 0,
                    nbytes: 0,
                    strips: Vec::new(),
                },
            },
        };
        Self {
            file_size: map.file_size,
            file_kind: map.file_kind,
            body,
        }
    }

    fn check_strip_count(&self) -> FmapResult<()> {
        if let CreateBody::Interleaved { nstrips, strips, .. } = &self.body {
            if *nstrips != strips.len() as u64 {
                return Err(FmapError::StripCountMismatch {
                    declared: *nstrips,
                    supplied: strips.len() as u64,
                });
            }
        }
        Ok(())
    }

    /// Builds and validates the map this request describes.
    pub fn to_file_map(&self) -> FmapResult<FileMap> {
        self.check_strip_count()?;
        let map = match &self.body {
            CreateBody::Simple(list) => {
                if list.len() > MAX_EXTENTS {
                    return Err(FmapError::TooManyExtents {
                        count: list.len() as u64,
                        max: MAX_EXTENTS,
                    });
                }
                FileMap::simple(self.file_kind, self.file_size, list.clone())
            }
            CreateBody::Interleaved {
                chunk_size,
                nbytes,
                strips,
                ..
            } => FileMap::interleaved(
                self.file_kind,
                self.file_size,
                InterleavedExtent::new(*chunk_size, *nbytes, strips.clone()),
            ),
        };
        map.validate()?;
        Ok(map)
    }

    /// Lays the request out for `MAP_CREATE_V2`: lists go into `arena`, the
    /// returned header points at them.
    pub fn stage(&self, arena: &mut BufferArena) -> FmapResult<[u8; IocFmap::SIZE]> {
        self.check_strip_count()?;
        let (ext_type, count, list_ptr) = match &self.body {
            CreateBody::Simple(list) => {
                let addr = arena.place(encode_list(list));
                (EXT_SIMPLE, list.len() as u32, addr)
            }
            CreateBody::Interleaved {
                nstrips,
                chunk_size,
                nbytes,
                strips,
            } => {
                let strips_ptr = arena.place(encode_list(strips));
                let mut desc = alloc::vec![0u8; IocInterleavedExt::SIZE];
                IocInterleavedExt {
                    nstrips: *nstrips,
                    chunk_size: *chunk_size,
                    nbytes: *nbytes,
                    strips_ptr,
                }
                .write_to(&mut desc);
                (EXT_INTERLEAVE, 1, arena.place(desc))
            }
        };
        Ok(IocFmap {
            file_size: self.file_size,
            file_type: self.file_kind.to_raw(),
            ext_type,
            count,
            list_ptr,
        }
        .to_bytes())
    }

    /// Reads a `MAP_CREATE_V2` header and the lists it points at. Counts are
    /// checked against their bounds before anything is fetched.
    pub fn decode(arg: &[u8], user: &dyn UserMemory) -> FmapResult<Self> {
        let hdr = IocFmap::from_bytes(arg)?;
        let file_kind = FileKind::from_raw(hdr.file_type)?;
        let body = match hdr.ext_type {
            EXT_SIMPLE => {
                let count = hdr.count as usize;
                if count > MAX_EXTENTS {
                    return Err(FmapError::TooManyExtents {
                        count: count as u64,
                        max: MAX_EXTENTS,
                    });
                }
                CreateBody::Simple(fetch_list(user, hdr.list_ptr, count)?)
            }
            EXT_INTERLEAVE => {
                if hdr.count as usize != MAX_INTERLEAVED_EXTENTS {
                    return Err(FmapError::InvalidMap(
                        "exactly one interleaved extent is permitted",
                    ));
                }
                let mut raw = [0u8; IocInterleavedExt::SIZE];
                user.copy_from_user(hdr.list_ptr, &mut raw)?;
                let desc = IocInterleavedExt::from_bytes(&raw);
                if desc.nstrips > MAX_STRIPS as u64 {
                    return Err(FmapError::TooManyExtents {
                        count: desc.nstrips,
                        max: MAX_STRIPS,
                    });
                }
                CreateBody::Interleaved {
                    nstrips: desc.nstrips,
                    chunk_size: desc.chunk_size,
                    nbytes: desc.nbytes,
                    strips: fetch_list(user, desc.strips_ptr, desc.nstrips as usize)?,
                }
            }
            _ => return Err(FmapError::InvalidMap("unknown extent type")),
        };
        Ok(Self {
            file_size: hdr.file_size,
            file_kind,
            body,
        })
    }
}

fn encode_list(list: &[SimpleExtent]) -> Vec<u8> {
    let mut buf = alloc::vec![0u8; list.len() * IocSimpleExtent::SIZE];
    for (chunk, ext) in buf.chunks_exact_mut(IocSimpleExtent::SIZE).zip(list) {
        IocSimpleExtent::from(ext).write_to(chunk);
    }
    buf
}

fn fetch_list(user: &dyn UserMemory, addr: u64, count: usize) -> FmapResult<Vec<SimpleExtent>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let mut raw = alloc::vec![0u8; count * IocSimpleExtent::SIZE];
    user.copy_from_user(addr, &mut raw)?;
    Ok(decode_list(&raw))
}

fn decode_list(raw: &[u8]) -> Vec<SimpleExtent> {
    raw.chunks_exact(IocSimpleExtent::SIZE)
        .map(|chunk| IocSimpleExtent::from_bytes(chunk).into())
        .collect()
}

pub struct V2;

impl MapCodec for V2 {
    const CREATE: Opcode = Opcode::MapCreateV2;
    const GET: Opcode = Opcode::MapGetV2;

    fn decode_create(arg: &[u8], user: &dyn UserMemory) -> FmapResult<FileMap> {
        CreateRequest::decode(arg, user)?.to_file_map()
    }

    fn encode_get(map: &FileMap, out: &mut [u8]) -> FmapResult<()> {
        check_len(out, IocGetFmap::SIZE)?;
        let mut buf = [0u8; IocGetFmap::SIZE];
        let mut hdr = IocFmap {
            file_size: map.file_size,
            file_type: map.file_kind.to_raw(),
            ..IocFmap::default()
        };
        match &map.payload {
            ExtentPayload::Simple(list) => {
                if list.len() > MAX_EXTENTS {
                    return Err(FmapError::EncodingOverflow("too many simple extents"));
                }
                hdr.ext_type = EXT_SIMPLE;
                hdr.count = list.len() as u32;
                let body = &mut buf[IocGetFmap::UNION_OFF..];
                for (chunk, ext) in body.chunks_exact_mut(IocSimpleExtent::SIZE).zip(list) {
                    IocSimpleExtent::from(ext).write_to(chunk);
                }
            }
            ExtentPayload::Interleaved(list) => {
                let ie = match list.as_slice() {
                    [ie] => ie,
                    _ => {
                        return Err(FmapError::EncodingOverflow(
                            "get carries exactly one interleaved extent",
                        ))
                    }
                };
                if ie.strip_count() > MAX_STRIPS {
                    return Err(FmapError::EncodingOverflow("too many strips"));
                }
                hdr.ext_type = EXT_INTERLEAVE;
                hdr.count = 1;
                IocInterleavedExt {
                    nstrips: ie.strip_count() as u64,
                    chunk_size: ie.chunk_size,
                    nbytes: ie.total_length,
                    strips_ptr: 0,
                }
                .write_to(&mut buf[IocGetFmap::UNION_OFF..IocGetFmap::STRIPS_OFF]);
                let strips = &mut buf[IocGetFmap::STRIPS_OFF..];
                for (chunk, ext) in strips
                    .chunks_exact_mut(IocSimpleExtent::SIZE)
                    .zip(&ie.strips)
                {
                    IocSimpleExtent::from(ext).write_to(chunk);
                }
            }
        }
        hdr.write_to(&mut buf[..IocFmap::SIZE]);
        out.copy_from_slice(&buf);
        Ok(())
    }

    fn decode_get(arg: &[u8]) -> FmapResult<FileMap> {
        check_len(arg, IocGetFmap::SIZE)?;
        let hdr = IocFmap::from_bytes(&arg[..IocFmap::SIZE])?;
        let file_kind = FileKind::from_raw(hdr.file_type)?;
        let map = match hdr.ext_type {
            EXT_SIMPLE => {
                let count = hdr.count as usize;
                if count > MAX_EXTENTS {
                    return Err(FmapError::TooManyExtents {
                        count: count as u64,
                        max: MAX_EXTENTS,
                    });
                }
                let start = IocGetFmap::UNION_OFF;
                let list = decode_list(&arg[start..start + count * IocSimpleExtent::SIZE]);
                FileMap::simple(file_kind, hdr.file_size, list)
            }
            EXT_INTERLEAVE => {
                if hdr.count as usize != MAX_INTERLEAVED_EXTENTS {
                    return Err(FmapError::InvalidMap(
                        "exactly one interleaved extent is permitted",
                    ));
                }
                let desc = IocInterleavedExt::from_bytes(
                    &arg[IocGetFmap::UNION_OFF..IocGetFmap::STRIPS_OFF],
                );
                if desc.nstrips > MAX_STRIPS as u64 {
                    return Err(FmapError::TooManyExtents {
                        count: desc.nstrips,
                        max: MAX_STRIPS,
                    });
                }
                let start = IocGetFmap::STRIPS_OFF;
                let end = start + desc.nstrips as usize * IocSimpleExtent::SIZE;
                let strips = decode_list(&arg[start..end]);
                FileMap::interleaved(
                    file_kind,
                    hdr.file_size,
                    InterleavedExtent::new(desc.chunk_size, desc.nbytes, strips),
                )
            }
            _ => return Err(FmapError::InvalidMap("unknown extent type")),
        };
        map.validate()?;
        Ok(map)
    }
}
