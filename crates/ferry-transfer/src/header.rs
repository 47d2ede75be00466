//! Transfer header: the fixed-size descriptor sent once, unacknowledged,
//! right after the BOT rendezvous.
//!
//! ```text
//! [0..4]    File size (u32 LE, <= i32::MAX)
//! [4..8]    Chunk size incl. 4-byte trailer (u32 LE)
//! [8..12]   CRC final-xor snapshot (advisory)
//! [12..76]  File name, NUL-terminated, zero padded
//! [76..80]  CRC polynomial (advisory)
//! [80..84]  CRC init value (advisory)
//! [84..88]  CRC32 of bytes 0..84
//! ```

use bytes::{Buf, BufMut};
use thiserror::Error;

use crate::crc::Crc32;

/// Encoded header size in bytes.
pub const HEADER_LEN: usize = 88;

/// Size of the fixed file name field, terminator included.
pub const FILE_NAME_FIELD: usize = 64;

/// Longest file name that still leaves room for the terminator.
pub const MAX_FILE_NAME: usize = FILE_NAME_FIELD - 1;

/// Bytes covered by the header checksum.
pub const CHECKED_LEN: usize = HEADER_LEN - 4;

/// Trailer size appended to every chunk.
pub const TRAILER_LEN: usize = 4;

/// Smallest chunk that carries at least one payload byte.
pub const MIN_CHUNK_SIZE: u32 = TRAILER_LEN as u32 + 1;

/// Largest chunk a receiver will allocate for.
pub const MAX_CHUNK_SIZE: u32 = 64 * 1024;

/// Largest file the signed 32-bit size field can describe.
pub const MAX_FILE_SIZE: u64 = i32::MAX as u64;

/// Whether `decode` recomputes and enforces the header checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderValidation {
    #[default]
    Strict,
    /// Accept the header without looking at `crcCheck`. Needed for peers that
    /// leave the field unset.
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header truncated: {0} of {HEADER_LEN} bytes")]
    Truncated(usize),

    #[error("file name is empty")]
    EmptyName,

    #[error("file name is {0} bytes, limit is {MAX_FILE_NAME}")]
    NameTooLong(usize),

    #[error("file name contains NUL or is not UTF-8")]
    InvalidName,

    #[error("file name field has no terminator")]
    UnterminatedName,

    #[error("file name {0:?} is not a bare file name")]
    UnsafeName(String),

    #[error("chunk size {0} outside {MIN_CHUNK_SIZE}..={MAX_CHUNK_SIZE}")]
    ChunkSizeOutOfRange(u32),

    #[error("file size {0} exceeds {MAX_FILE_SIZE}")]
    FileTooLarge(u64),

    #[error("header checksum mismatch: carried 0x{carried:08x}, computed 0x{computed:08x}")]
    ChecksumMismatch { carried: u32, computed: u32 },
}

/// Parsed transfer header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHeader {
    pub file_size: u32,
    pub chunk_size: u32,
    pub crc_x: u32,
    pub file_name: String,
    pub poly: u32,
    pub init_x: u32,
    pub checksum: u32,
}

impl TransferHeader {
    /// Build a header and seal its checksum.
    pub fn new(
        file_name: &str,
        file_size: u64,
        chunk_size: u32,
        crc: &Crc32,
    ) -> Result<Self, HeaderError> {
        check_name(file_name)?;
        check_chunk_size(chunk_size)?;
        if file_size > MAX_FILE_SIZE {
            return Err(HeaderError::FileTooLarge(file_size));
        }

        let params = crc.params();
        let mut header = Self {
            file_size: file_size as u32,
            chunk_size,
            crc_x: params.xor_out,
            file_name: file_name.to_owned(),
            poly: params.poly,
            init_x: params.init,
            checksum: 0,
        };
        header.checksum = header.compute_checksum(crc)?;
        Ok(header)
    }

    /// Serialize to the fixed wire layout. The stored checksum is written
    /// as-is. The name is checked again since the fields are public.
    pub fn encode(&self) -> Result<[u8; HEADER_LEN], HeaderError> {
        let mut out = [0u8; HEADER_LEN];
        self.encode_fields(&mut out)?;
        (&mut out[CHECKED_LEN..]).put_u32_le(self.checksum);
        Ok(out)
    }

    /// Parse a header from at least `HEADER_LEN` bytes.
    pub fn decode(
        data: &[u8],
        crc: &Crc32,
        validation: HeaderValidation,
    ) -> Result<Self, HeaderError> {
        if data.len() < HEADER_LEN {
            return Err(HeaderError::Truncated(data.len()));
        }
        let mut buf = &data[..HEADER_LEN];

        let file_size = buf.get_u32_le();
        let chunk_size = buf.get_u32_le();
        let crc_x = buf.get_u32_le();
        let mut name_field = [0u8; FILE_NAME_FIELD];
        buf.copy_to_slice(&mut name_field);
        let poly = buf.get_u32_le();
        let init_x = buf.get_u32_le();
        let checksum = buf.get_u32_le();

        if validation == HeaderValidation::Strict {
            let computed = crc.checksum(&data[..CHECKED_LEN]);
            if computed != checksum {
                return Err(HeaderError::ChecksumMismatch {
                    carried: checksum,
                    computed,
                });
            }
        }

        let len = name_field
            .iter()
            .position(|&b| b == 0)
            .ok_or(HeaderError::UnterminatedName)?;
        let file_name = std::str::from_utf8(&name_field[..len])
            .map_err(|_| HeaderError::InvalidName)?
            .to_owned();
        if file_name.is_empty() {
            return Err(HeaderError::EmptyName);
        }

        check_chunk_size(chunk_size)?;
        if file_size as u64 > MAX_FILE_SIZE {
            return Err(HeaderError::FileTooLarge(file_size as u64));
        }

        Ok(Self {
            file_size,
            chunk_size,
            crc_x,
            file_name,
            poly,
            init_x,
            checksum,
        })
    }

    /// CRC32 over the encoded fields preceding the checksum.
    pub fn compute_checksum(&self, crc: &Crc32) -> Result<u32, HeaderError> {
        let mut out = [0u8; HEADER_LEN];
        self.encode_fields(&mut out)?;
        Ok(crc.checksum(&out[..CHECKED_LEN]))
    }

    /// True when `file_name` can be joined onto a directory without escaping it.
    pub fn is_safe_file_name(&self) -> bool {
        is_safe_name(&self.file_name)
    }

    fn encode_fields(&self, out: &mut [u8; HEADER_LEN]) -> Result<(), HeaderError> {
        check_name(&self.file_name)?;
        let mut buf = &mut out[..CHECKED_LEN];
        buf.put_u32_le(self.file_size);
        buf.put_u32_le(self.chunk_size);
        buf.put_u32_le(self.crc_x);
        let mut name_field = [0u8; FILE_NAME_FIELD];
        let name = self.file_name.as_bytes();
        name_field[..name.len()].copy_from_slice(name);
        buf.put_slice(&name_field);
        buf.put_u32_le(self.poly);
        buf.put_u32_le(self.init_x);
        Ok(())
    }
}

/// A bare file name: non-empty, no path separators or drive prefix, not `.`/`..`.
pub fn is_safe_name(name: &str) -> bool {
    !(name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains(':'))
}

fn check_name(name: &str) -> Result<(), HeaderError> {
    if name.is_empty() {
        return Err(HeaderError::EmptyName);
    }
    if name.len() > MAX_FILE_NAME {
        return Err(HeaderError::NameTooLong(name.len()));
    }
    if name.as_bytes().contains(&0) {
        return Err(HeaderError::InvalidName);
    }
    Ok(())
}

fn check_chunk_size(chunk_size: u32) -> Result<(), HeaderError> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(HeaderError::ChunkSizeOutOfRange(chunk_size));
    }
    Ok(())
}
