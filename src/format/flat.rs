//! Flat (single-level) image fallback.
//!
//! Anything that is not a servable tiled pyramid but that the `image` crate can
//! decode (strip TIFFs, LZW/Deflate TIFFs, JPEG, PNG) is exposed as a pyramid
//! with one level at full resolution. The whole file has to be decoded to cut a
//! tile out of it, so a size limit guards against huge files.

use std::io::Cursor;

use bytes::Bytes;
use image::{imageops, ImageFormat, ImageReader, RgbImage};

use crate::error::{FormatError, TileError};
use crate::io::RangeReader;
use crate::slide::{LevelInfo, SlideReader};

use super::detect::ImageKind;

/// Default limit on the size of a file decoded as a flat image.
pub const DEFAULT_MAX_FLAT_BYTES: u64 = 256 * 1024 * 1024;

/// A decodable raster with one level.
#[derive(Debug, Clone)]
pub struct FlatImage {
    kind: ImageKind,
    width: u32,
    height: u32,
    tile_size: u32,
}

fn image_format(kind: ImageKind) -> Option<ImageFormat> {
    match kind {
        ImageKind::Tiff | ImageKind::BigTiff => Some(ImageFormat::Tiff),
        ImageKind::Jpeg => Some(ImageFormat::Jpeg),
        ImageKind::Png => Some(ImageFormat::Png),
        ImageKind::Unknown => None,
    }
}

impl FlatImage {
    /// Read the file and probe its dimensions without decoding pixels.
    ///
    /// `tile_size` sets the tile grid native tile requests are cut on.
    pub async fn open<R: RangeReader>(
        reader: &R,
        kind: ImageKind,
        tile_size: u32,
        max_bytes: u64,
    ) -> Result<Self, FormatError> {
        let format = image_format(kind).ok_or_else(|| FormatError::UnsupportedFormat {
            reason: format!("{} is not a recognized image", reader.identifier()),
        })?;
        let bytes = Self::read_all(reader, max_bytes).await?;

        let (width, height) = ImageReader::with_format(Cursor::new(&bytes[..]), format)
            .into_dimensions()
            .map_err(|e| FormatError::UnsupportedFormat {
                reason: format!("cannot read {} as {}: {}", reader.identifier(), kind.name(), e),
            })?;
        if width == 0 || height == 0 {
            return Err(FormatError::UnsupportedFormat {
                reason: format!("{} has zero dimensions", reader.identifier()),
            });
        }

        Ok(Self {
            kind,
            width,
            height,
            tile_size: tile_size.max(1),
        })
    }

    /// Read the whole file, refusing files over `max_bytes`.
    pub async fn read_all<R: RangeReader>(reader: &R, max_bytes: u64) -> Result<Bytes, FormatError> {
        let size = reader.size();
        if size > max_bytes {
            return Err(FormatError::UnsupportedFormat {
                reason: format!(
                    "{} is {} bytes, over the {} byte limit for untiled images",
                    reader.identifier(),
                    size,
                    max_bytes
                ),
            });
        }
        Ok(reader.read_exact_at(0, size as usize).await?)
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Decode a full file read by [`FlatImage::read_all`]. CPU bound.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage, TileError> {
        let format = image_format(self.kind).ok_or_else(|| TileError::UnsupportedFormat {
            reason: "unknown image kind".to_string(),
        })?;
        let image = ImageReader::with_format(Cursor::new(bytes), format)
            .decode()
            .map_err(|e| TileError::DecodeError {
                message: e.to_string(),
            })?;
        Ok(image.to_rgb8())
    }
}

/// Cut tile `(x, y)` of size `tile_size` out of a decoded image.
pub fn crop_tile(image: &RgbImage, tile_size: u32, x: u32, y: u32) -> Option<RgbImage> {
    let left = x.checked_mul(tile_size)?;
    let top = y.checked_mul(tile_size)?;
    if left >= image.width() || top >= image.height() {
        return None;
    }
    let w = (image.width() - left).min(tile_size);
    let h = (image.height() - top).min(tile_size);
    Some(imageops::crop_imm(image, left, top, w, h).to_image())
}

impl SlideReader for FlatImage {
    fn level_count(&self) -> usize {
        1
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        if level != 0 {
            return None;
        }
        Some(LevelInfo {
            width: self.width,
            height: self.height,
            tile_width: self.tile_size,
            tile_height: self.tile_size,
            tiles_x: self.width.div_ceil(self.tile_size),
            tiles_y: self.height.div_ceil(self.tile_size),
            downsample: 1.0,
        })
    }
}
