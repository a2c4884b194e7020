//! Container detection from magic bytes.
//!
//! Extensions are not trusted; the first bytes of the file decide which
//! reader opens it.

use serde::Serialize;

use crate::error::IoError;
use crate::io::RangeReader;

/// Bytes read from the start of a file for detection.
const DETECT_BYTES: usize = 16;

const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Kind of container found at the start of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    /// Classic TIFF (version 42)
    Tiff,
    /// BigTIFF (version 43)
    BigTiff,
    Jpeg,
    Png,
    Unknown,
}

impl ImageKind {
    pub fn is_tiff(self) -> bool {
        matches!(self, ImageKind::Tiff | ImageKind::BigTiff)
    }

    pub fn name(self) -> &'static str {
        match self {
            ImageKind::Tiff => "tiff",
            ImageKind::BigTiff => "bigtiff",
            ImageKind::Jpeg => "jpeg",
            ImageKind::Png => "png",
            ImageKind::Unknown => "unknown",
        }
    }
}

/// Check for a TIFF or BigTIFF header in either byte order.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    detect_kind_from_bytes(bytes).is_tiff()
}

/// Classify a file from its leading bytes.
pub fn detect_kind_from_bytes(bytes: &[u8]) -> ImageKind {
    if bytes.len() >= 4 {
        match (&bytes[0..2], &bytes[2..4]) {
            (b"II", [42, 0]) | (b"MM", [0, 42]) => return ImageKind::Tiff,
            (b"II", [43, 0]) | (b"MM", [0, 43]) => return ImageKind::BigTiff,
            _ => {}
        }
    }
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        return ImageKind::Jpeg;
    }
    if bytes.len() >= PNG_MAGIC.len() && bytes[..PNG_MAGIC.len()] == PNG_MAGIC {
        return ImageKind::Png;
    }
    ImageKind::Unknown
}

/// Read the first bytes of a file and classify it.
pub async fn detect_kind<R: RangeReader>(reader: &R) -> Result<ImageKind, IoError> {
    let header = reader.read_clamped(0, DETECT_BYTES).await?;
    Ok(detect_kind_from_bytes(&header))
}
