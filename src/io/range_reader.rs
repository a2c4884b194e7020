use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Positional, read-only access to the bytes of one file.
///
/// Implementations must not keep a shared cursor: two concurrent calls on the
/// same reader with different offsets each get their own bytes. The TIFF parser,
/// tile reads and the raw range endpoint all go through this trait.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns `RangeOutOfBounds` if `offset + len` is past the end of the file.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Identifier used in logs and cache keys (the image path).
    fn identifier(&self) -> &str;

    /// Read up to `len` bytes at `offset`, clamping the range to the end of the file.
    ///
    /// Returns an empty buffer when `offset` is at or past EOF.
    async fn read_clamped(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let size = self.size();
        if offset >= size {
            return Ok(Bytes::new());
        }
        let available = (size - offset).min(len as u64) as usize;
        self.read_exact_at(offset, available).await
    }
}

/// Check that `[offset, offset + len)` lies inside a resource of `size` bytes.
pub(crate) fn check_bounds(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}

// =============================================================================
// Endian Helpers
// =============================================================================
//
// Callers guarantee the slice is long enough; TIFF structures are sized before
// they are read.

#[inline]
pub fn read_u16_le(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

#[inline]
pub fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

#[inline]
pub fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
pub fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[inline]
pub fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

#[inline]
pub fn read_u64_be(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_be_bytes(buf)
}
