use onlyerror::Error;

pub type FmapResult<T> = Result<T, FmapError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FmapError {
    /// The map violates a structural invariant.
    #[error("invalid file map: {0}")]
    InvalidMap(&'static str),
    #[error("{count} extents exceed the limit of {max}")]
    TooManyExtents { count: u64, max: usize },
    #[error("interleaved extent declares {declared} strips but {supplied} were supplied")]
    StripCountMismatch { declared: u64, supplied: u64 },
    #[error("file size {file_size} exceeds backing capacity {capacity}")]
    SizeMismatch { file_size: u64, capacity: u64 },
    #[error("file already has a map")]
    AlreadyMapped,
    #[error("file has no map")]
    Unmapped,
    /// The stored map cannot be expressed in the requested wire version.
    #[error("map does not fit the requested encoding: {0}")]
    EncodingOverflow(&'static str),
    #[error("offset {offset} is beyond file size {file_size}")]
    OffsetOutOfRange { offset: u64, file_size: u64 },
    /// No extent covers an offset inside the file. A validated map never
    /// produces this; seeing it means validation let a bad map through.
    #[error("no extent covers offset {0}")]
    UnresolvedExtent(u64),
    #[error("unknown control opcode {0}")]
    UnknownOpcode(u32),
    #[error("argument is {got} bytes, opcode expects {need}")]
    ShortBuffer { need: usize, got: usize },
    #[error("bad user address {0}")]
    BadAddress(u64),
}

const EIO: i32 = 5;
const EFAULT: i32 = 14;
const EINVAL: i32 = 22;
const ENOTTY: i32 = 25;
const ERANGE: i32 = 34;
const ENODATA: i32 = 61;
const EOVERFLOW: i32 = 75;
const EALREADY: i32 = 114;

impl FmapError {
    /// Negative errno handed back across the control boundary.
    pub fn errno(&self) -> i32 {
        let e = match self {
            FmapError::InvalidMap(_)
            | FmapError::TooManyExtents { .. }
            | FmapError::StripCountMismatch { .. }
            | FmapError::SizeMismatch { .. }
            | FmapError::ShortBuffer { .. } => EINVAL,
            FmapError::AlreadyMapped => EALREADY,
            FmapError::Unmapped => ENODATA,
            FmapError::EncodingOverflow(_) => EOVERFLOW,
            FmapError::OffsetOutOfRange { .. } => ERANGE,
            FmapError::UnresolvedExtent(_) => EIO,
            FmapError::UnknownOpcode(_) => ENOTTY,
            FmapError::BadAddress(_) => EFAULT,
        };
        -e
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_is_negative_and_distinct_for_write_once() {
        assert_eq!(FmapError::AlreadyMapped.errno(), -114);
        assert_eq!(FmapError::InvalidMap("x").errno(), -22);
        assert_eq!(FmapError::EncodingOverflow("x").errno(), -75);
        assert_eq!(FmapError::UnknownOpcode(7).errno(), -25);
    }

    #[test]
    fn messages_name_the_numbers() {
        let e = FmapError::SizeMismatch {
            file_size: 10,
            capacity: 4,
        };
        assert_eq!(e.to_string(), "file size 10 exceeds backing capacity 4");
    }
}
