//! Tiled pyramid TIFF reader.
//!
//! Opens a TIFF/BigTIFF, identifies its pyramid levels and loads every level's
//! tile offset table up front. After `open` a tile read is a single positional
//! read of `TileByteCounts[i]` bytes at `TileOffsets[i]`.
//!
//! Tiles compressed with JPEG (JPEGTables merged in when abbreviated) or
//! stored uncompressed with 8-bit samples are supported. Other codecs are
//! rejected at open time so the caller can fall back to a flat decode.

use bytes::Bytes;
use image::{imageops, DynamicImage, GrayImage, ImageFormat, RgbImage, RgbaImage};

use crate::error::{TiffError, TileError};
use crate::io::RangeReader;
use crate::slide::{LevelInfo, SlideReader};

use super::jpeg::prepare_tile_jpeg;
use super::tiff::{Compression, PixelLayout, PyramidLevel, TiffPyramid, TileData};

// =============================================================================
// Raw Tile
// =============================================================================

/// Bytes of one tile as stored in the file, plus what is needed to decode them.
#[derive(Debug, Clone)]
pub struct RawTile {
    /// Complete JPEG stream, or uncompressed samples
    pub data: Bytes,
    pub compression: Compression,
    pub layout: PixelLayout,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Visible size after cutting at the image border
    pub visible_width: u32,
    pub visible_height: u32,
}

impl RawTile {
    /// Decode to RGB and crop to the visible area.
    ///
    /// CPU bound; callers run it on the blocking pool.
    pub fn decode(&self) -> Result<RgbImage, TileError> {
        let full = match self.compression {
            Compression::Jpeg => image::load_from_memory_with_format(&self.data, ImageFormat::Jpeg)
                .map_err(|e| TileError::DecodeError {
                    message: e.to_string(),
                })?
                .to_rgb8(),
            Compression::None => self.decode_uncompressed()?,
            other => {
                return Err(TileError::DecodeError {
                    message: format!("cannot decode {} tiles", other.name()),
                })
            }
        };

        let w = self.visible_width.min(full.width());
        let h = self.visible_height.min(full.height());
        if w == full.width() && h == full.height() {
            return Ok(full);
        }
        Ok(imageops::crop_imm(&full, 0, 0, w, h).to_image())
    }

    fn decode_uncompressed(&self) -> Result<RgbImage, TileError> {
        let (w, h) = (self.tile_width, self.tile_height);
        let samples = self.layout.samples_per_pixel as usize;
        let expected = w as usize * h as usize * samples;
        if self.data.len() < expected {
            return Err(TileError::DecodeError {
                message: format!(
                    "uncompressed tile has {} bytes, expected {}",
                    self.data.len(),
                    expected
                ),
            });
        }
        let pixels = self.data[..expected].to_vec();

        let image = match (samples, self.layout.photometric) {
            (1, photometric) => {
                let mut gray = GrayImage::from_raw(w, h, pixels).ok_or_else(buffer_error)?;
                if photometric == 0 {
                    imageops::invert(&mut gray);
                }
                DynamicImage::ImageLuma8(gray)
            }
            (3, _) => DynamicImage::ImageRgb8(RgbImage::from_raw(w, h, pixels).ok_or_else(buffer_error)?),
            (4, _) => {
                DynamicImage::ImageRgba8(RgbaImage::from_raw(w, h, pixels).ok_or_else(buffer_error)?)
            }
            _ => {
                return Err(TileError::DecodeError {
                    message: format!("{} samples per pixel", samples),
                })
            }
        };
        Ok(image.to_rgb8())
    }
}

fn buffer_error() -> TileError {
    TileError::DecodeError {
        message: "tile buffer does not match its dimensions".to_string(),
    }
}

// =============================================================================
// Pyramid TIFF Reader
// =============================================================================

/// An opened pyramid TIFF: level structure plus per-level offset tables.
#[derive(Debug, Clone)]
pub struct PyramidTiffReader {
    pyramid: TiffPyramid,
    tile_data: Vec<TileData>,
}

impl PyramidTiffReader {
    /// Parse the file structure and load all offset tables.
    pub async fn open<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let pyramid = TiffPyramid::parse(reader).await?;

        let mut tile_data = Vec::with_capacity(pyramid.levels.len());
        for level in &pyramid.levels {
            tile_data.push(TileData::load(reader, level, &pyramid.header).await?);
        }

        Ok(Self { pyramid, tile_data })
    }

    pub fn pyramid(&self) -> &TiffPyramid {
        &self.pyramid
    }

    pub fn description(&self) -> Option<&str> {
        self.pyramid.description.as_deref()
    }

    pub fn is_bigtiff(&self) -> bool {
        self.pyramid.header.is_bigtiff
    }

    fn level(&self, level: usize) -> Result<(&PyramidLevel, &TileData), TiffError> {
        match (self.pyramid.get_level(level), self.tile_data.get(level)) {
            (Some(l), Some(d)) => Ok((l, d)),
            _ => Err(TiffError::InvalidTagValue {
                tag: "level",
                message: format!(
                    "level {} out of range ({} levels)",
                    level,
                    self.pyramid.level_count()
                ),
            }),
        }
    }

    /// Read the stored bytes of a tile, with JPEGTables merged when needed.
    ///
    /// Callers check bounds first; out-of-grid coordinates are an error here.
    pub async fn read_raw_tile<R: RangeReader>(
        &self,
        reader: &R,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<RawTile, TiffError> {
        let (pyramid_level, tile_data) = self.level(level)?;

        let (visible_width, visible_height) = pyramid_level
            .tile_dimensions(tile_x, tile_y)
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: "tile",
                message: format!("tile ({}, {}) outside level {}", tile_x, tile_y, level),
            })?;
        let index = pyramid_level
            .tile_index(tile_x, tile_y)
            .ok_or(TiffError::MissingTag("TileOffsets"))?;
        let (offset, byte_count) = tile_data
            .get_tile_location(index)
            .ok_or(TiffError::MissingTag("TileOffsets"))?;

        let size = usize::try_from(byte_count).map_err(|_| TiffError::InvalidTagValue {
            tag: "TileByteCounts",
            message: format!("tile size {} does not fit in memory", byte_count),
        })?;
        let raw = reader.read_exact_at(offset, size).await?;

        let data = match pyramid_level.compression {
            Compression::Jpeg => prepare_tile_jpeg(tile_data.jpeg_tables.as_deref(), raw),
            _ => raw,
        };

        Ok(RawTile {
            data,
            compression: pyramid_level.compression,
            layout: pyramid_level.layout,
            tile_width: pyramid_level.tile_width,
            tile_height: pyramid_level.tile_height,
            visible_width,
            visible_height,
        })
    }
}

impl SlideReader for PyramidTiffReader {
    fn level_count(&self) -> usize {
        self.pyramid.level_count()
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let l = self.pyramid.get_level(level)?;
        Some(LevelInfo {
            width: l.width,
            height: l.height,
            tile_width: l.tile_width,
            tile_height: l.tile_height,
            tiles_x: l.tiles_x,
            tiles_y: l.tiles_y,
            downsample: l.downsample,
        })
    }
}
