//! Raw byte-range serving for `/files/{*path}`.
//!
//! Only single ranges are supported:
//!
//! | Header            | Meaning                               |
//! |-------------------|---------------------------------------|
//! | `bytes=10-19`     | bytes 10 through 19 inclusive         |
//! | `bytes=10-`       | one default chunk starting at byte 10 |
//! | `bytes=-100`      | last 100 bytes                        |
//! | (no header)       | one default chunk starting at byte 0  |
//!
//! A range ending past EOF is clamped. A range starting at or past EOF is not
//! satisfiable. Bodies are streamed in fixed-size reads so a large range never
//! sits in memory at once.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream};

use crate::error::{IoError, RangeError};
use crate::io::RangeReader;

/// Bytes returned when a request names no end: no `Range` header, or `bytes=N-`.
pub const DEFAULT_RANGE_CHUNK: u64 = 1024 * 1024;

/// Size of each positional read while streaming a body.
pub const STREAM_BUFFER_SIZE: usize = 256 * 1024;

// =============================================================================
// Byte Range
// =============================================================================

/// A resolved, in-bounds byte span of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset
    pub start: u64,

    /// Number of bytes, never past EOF
    pub len: u64,
}

impl ByteRange {
    /// Inclusive offset of the last byte. Only meaningful when `len > 0`.
    pub fn end(&self) -> u64 {
        self.start + self.len.saturating_sub(1)
    }

    /// `Content-Range` value for a 206 response.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end(), size)
    }
}

/// Parse a `Range` header against a file of `size` bytes.
///
/// An open-ended `bytes=N-` is capped at `chunk` bytes, like a request without
/// a header.
///
/// # Errors
///
/// - `Invalid` for anything other than one well-formed `bytes=` range
/// - `NotSatisfiable` when the range starts at or past EOF, or asks for an
///   empty suffix
pub fn parse_range_header(header: &str, size: u64, chunk: u64) -> Result<ByteRange, RangeError> {
    let invalid = || RangeError::Invalid {
        header: header.to_string(),
    };

    let spec = header
        .trim()
        .strip_prefix("bytes=")
        .ok_or_else(invalid)?
        .trim();
    if spec.contains(',') {
        return Err(invalid());
    }
    let (first, last) = spec.split_once('-').ok_or_else(invalid)?;
    let (first, last) = (first.trim(), last.trim());

    if first.is_empty() {
        let suffix: u64 = last.parse().map_err(|_| invalid())?;
        if suffix == 0 || size == 0 {
            return Err(RangeError::NotSatisfiable { size });
        }
        let len = suffix.min(size);
        return Ok(ByteRange {
            start: size - len,
            len,
        });
    }

    let start: u64 = first.parse().map_err(|_| invalid())?;
    let length = if last.is_empty() {
        None
    } else {
        let end: u64 = last.parse().map_err(|_| invalid())?;
        if end < start {
            return Err(invalid());
        }
        Some((end - start).saturating_add(1))
    };

    clamp_range(start, length, size, chunk)
}

/// Span served when no `Range` header is sent: the whole file up to `chunk` bytes.
pub fn default_range(size: u64, chunk: u64) -> ByteRange {
    ByteRange {
        start: 0,
        len: size.min(chunk),
    }
}

/// Clamp an explicit `(offset, length)` request to the file.
///
/// A missing `length` means one default chunk. The returned span carries the
/// actual length after clamping.
pub fn clamp_range(
    offset: u64,
    length: Option<u64>,
    size: u64,
    chunk: u64,
) -> Result<ByteRange, RangeError> {
    if offset >= size {
        return Err(RangeError::NotSatisfiable { size });
    }
    let wanted = length.unwrap_or(chunk);
    Ok(ByteRange {
        start: offset,
        len: wanted.min(size - offset),
    })
}

// =============================================================================
// Reading
// =============================================================================

/// Stream `range` out of `reader` in reads of at most `buffer` bytes.
///
/// Dropping the stream stops further reads.
pub fn stream_range<R>(
    reader: Arc<R>,
    range: ByteRange,
    buffer: usize,
) -> impl Stream<Item = Result<Bytes, IoError>> + Send + 'static
where
    R: RangeReader + ?Sized + 'static,
{
    let buffer = buffer.max(1) as u64;
    stream::try_unfold(
        (reader, range.start, range.len),
        move |(reader, offset, remaining)| async move {
            if remaining == 0 {
                return Ok::<_, IoError>(None);
            }
            let take = remaining.min(buffer);
            let bytes = reader.read_exact_at(offset, take as usize).await?;
            Ok(Some((bytes, (reader, offset + take, remaining - take))))
        },
    )
}

/// `Content-Type` for a served file, from its extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "tif" | "tiff" => "image/tiff",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "json" => "application/json",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "xml" | "dzi" => "application/xml",
        _ => "application/octet-stream",
    }
}
