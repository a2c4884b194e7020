//! JPEG encoding of decoded tiles.
//!
//! Every structured tile endpoint serves a fresh JPEG: native tiles are
//! decoded, cropped at the image border and re-encoded; DZI tiles are
//! composited from native tiles and resized first.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::TileError;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

pub const MIN_JPEG_QUALITY: u8 = 1;

pub const MAX_JPEG_QUALITY: u8 = 100;

#[derive(Debug, Clone, Copy)]
pub struct JpegTileEncoder {
    default_quality: u8,
}

impl Default for JpegTileEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl JpegTileEncoder {
    pub fn new(default_quality: u8) -> Self {
        Self {
            default_quality: clamp_quality(default_quality),
        }
    }

    pub fn default_quality(&self) -> u8 {
        self.default_quality
    }

    /// Encode an RGB image at `quality` (clamped to 1..=100).
    pub fn encode(&self, image: &RgbImage, quality: u8) -> Result<Bytes, TileError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(TileError::EncodeError {
                message: "cannot encode an empty image".to_string(),
            });
        }

        let mut output = Vec::new();
        JpegEncoder::new_with_quality(&mut output, clamp_quality(quality))
            .encode_image(image)
            .map_err(|e| TileError::EncodeError {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }
}

#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
