//! On-disk encoding of a chunk's block array.
//!
//! The VCHK format wraps a small big-endian header and the raw block bytes
//! in a single compressed stream.
//!
//! ## Layout (after decompression)
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Magic `0x5643484B` ("VCHK") |
//! | 4 | 4 | Format version (`1` = gzip legacy, `2` = zlib + CRC) |
//! | 8 | 12 | Dimensions `sx`, `sy`, `sz` |
//! | 20 | 4 | Block byte count, must equal `sx * sy * sz` |
//! | 24 | 4 | CRC-32 of the block bytes (version 2 only) |
//! | 24/28 | N | Block ids |
//!
//! All integers are big-endian `i32`. Version 2 streams are zlib, version 1
//! streams are gzip; the reader sniffs the gzip header (`1F 8B`) rather than
//! trusting the file extension.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::ZlibEncoder;

/// Magic number at the start of every decoded stream ("VCHK").
pub const MAGIC: i32 = 0x5643_484B;

/// Legacy gzip format without checksum.
pub const VERSION_GZIP_V1: i32 = 1;

/// Current zlib format with CRC-32.
pub const VERSION_ZLIB_V2: i32 = 2;

const GZIP_HEADER: [u8; 2] = [0x1F, 0x8B];

/// Largest header (version 2, with CRC).
const MAX_HEADER_LEN: usize = 28;

/// Expected chunk dimensions `(sx, sy, sz)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkDims {
    /// Width.
    pub sx: i32,
    /// Height.
    pub sy: i32,
    /// Depth.
    pub sz: i32,
}

impl ChunkDims {
    /// Dimensions of the engine's chunks.
    pub const STANDARD: ChunkDims = ChunkDims {
        sx: crate::chunk::CHUNK_SX as i32,
        sy: crate::chunk::CHUNK_SY as i32,
        sz: crate::chunk::CHUNK_SZ as i32,
    };

    /// Cell count, or `None` if it overflows.
    pub fn volume(&self) -> Option<usize> {
        let v = i64::from(self.sx) * i64::from(self.sy) * i64::from(self.sz);
        usize::try_from(v).ok()
    }
}

/// Errors produced while encoding or decoding a chunk stream.
#[derive(Debug, thiserror::Error)]
pub enum ChunkSerError {
    /// Compression or decompression failed, or the stream ended early.
    #[error("chunk stream I/O: {0}")]
    Io(#[from] std::io::Error),
    /// The decoded stream does not start with the VCHK magic.
    #[error("invalid magic: {0:#010x}")]
    InvalidMagic(i32),
    /// The version field is neither 1 nor 2.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(i32),
    /// The stored dimensions differ from the expected ones.
    #[error("dimension mismatch: stored {stored:?}, expected {expected:?}")]
    DimensionMismatch {
        /// Dimensions in the stream.
        stored: ChunkDims,
        /// Dimensions the caller asked for.
        expected: ChunkDims,
    },
    /// The length field does not match the dimensions.
    #[error("length mismatch: stored {stored}, expected {expected}")]
    LengthMismatch {
        /// Length field in the stream.
        stored: i32,
        /// `sx * sy * sz`.
        expected: usize,
    },
    /// Fewer block bytes than the header announces.
    #[error("data truncated: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Announced byte count.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },
    /// The stored CRC-32 does not match the block bytes.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// CRC in the stream.
        stored: u32,
        /// CRC of the bytes read.
        computed: u32,
    },
    /// The block array length does not fit the header or the dimensions.
    #[error("block array has {actual} bytes, dimensions need {expected}")]
    WrongBlockCount {
        /// Cells the dimensions describe.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },
}

/// Encodes `blocks` as a version 2 (zlib + CRC) stream.
pub fn encode_chunk(dims: ChunkDims, blocks: &[u8]) -> Result<Vec<u8>, ChunkSerError> {
    let expected = dims.volume().unwrap_or(usize::MAX);
    let len = i32::try_from(blocks.len()).ok().filter(|_| blocks.len() == expected);
    let Some(len) = len else {
        return Err(ChunkSerError::WrongBlockCount {
            expected,
            actual: blocks.len(),
        });
    };

    let mut raw = Vec::with_capacity(28 + blocks.len());
    for field in [MAGIC, VERSION_ZLIB_V2, dims.sx, dims.sy, dims.sz, len] {
        raw.extend_from_slice(&field.to_be_bytes());
    }
    raw.extend_from_slice(&crc32fast::hash(blocks).to_be_bytes());
    raw.extend_from_slice(blocks);

    let mut encoder = ZlibEncoder::new(Vec::with_capacity(blocks.len() / 4), Compression::fast());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

/// Decodes a version 1 or 2 stream, validating magic, version, dimensions,
/// length and (for version 2) checksum.
///
/// Decompression stops one byte past the largest valid stream for `dims`,
/// so a file that inflates to more than that is rejected with
/// [`ChunkSerError::LengthMismatch`] without being expanded in full.
pub fn decode_chunk(bytes: &[u8], dims: ChunkDims) -> Result<Vec<u8>, ChunkSerError> {
    let expected_len = dims.volume().unwrap_or(usize::MAX);
    let limit = expected_len.saturating_add(MAX_HEADER_LEN + 1) as u64;

    let mut raw = Vec::new();
    if bytes.starts_with(&GZIP_HEADER) {
        GzDecoder::new(bytes).take(limit).read_to_end(&mut raw)?;
    } else {
        ZlibDecoder::new(bytes).take(limit).read_to_end(&mut raw)?;
    }

    let mut cursor = HeaderCursor::new(&raw);

    let magic = cursor.read_i32()?;
    if magic != MAGIC {
        return Err(ChunkSerError::InvalidMagic(magic));
    }

    let version = cursor.read_i32()?;
    if version != VERSION_GZIP_V1 && version != VERSION_ZLIB_V2 {
        return Err(ChunkSerError::UnsupportedVersion(version));
    }

    let stored = ChunkDims {
        sx: cursor.read_i32()?,
        sy: cursor.read_i32()?,
        sz: cursor.read_i32()?,
    };
    if stored != dims {
        return Err(ChunkSerError::DimensionMismatch {
            stored,
            expected: dims,
        });
    }

    let len = cursor.read_i32()?;
    if usize::try_from(len).ok() != Some(expected_len) {
        return Err(ChunkSerError::LengthMismatch {
            stored: len,
            expected: expected_len,
        });
    }

    let stored_crc = if version >= VERSION_ZLIB_V2 {
        Some(cursor.read_i32()? as u32)
    } else {
        None
    };

    let blocks = cursor.take(expected_len)?;
    if cursor.remaining() > 0 {
        return Err(ChunkSerError::LengthMismatch {
            stored: i32::try_from(expected_len + cursor.remaining()).unwrap_or(i32::MAX),
            expected: expected_len,
        });
    }

    if let Some(stored) = stored_crc {
        let computed = crc32fast::hash(blocks);
        if computed != stored {
            return Err(ChunkSerError::ChecksumMismatch { stored, computed });
        }
    }

    Ok(blocks.to_vec())
}

/// Sequential reader over the decompressed header.
struct HeaderCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HeaderCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ChunkSerError> {
        let end = self.pos.saturating_add(n);
        if end > self.data.len() {
            return Err(ChunkSerError::Truncated {
                expected: n,
                actual: self.data.len() - self.pos,
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_i32(&mut self) -> Result<i32, ChunkSerError> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}
