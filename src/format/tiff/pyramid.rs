//! Pyramid level identification.
//!
//! A pyramid TIFF stores the same picture at several resolutions, one IFD per
//! resolution. Files may also carry unrelated images (transparency masks,
//! previews with a different aspect ratio). Levels are picked by:
//!
//! 1. tiled IFDs with TileOffsets and TileByteCounts
//! 2. not flagged as a transparency mask (NewSubfileType bit 2)
//! 3. the largest one is level 0
//! 4. every other candidate must keep level 0's aspect ratio and be strictly
//!    smaller than the previous level
//!
//! Candidates whose codec or pixel layout cannot be decoded per tile are
//! dropped here; if nothing usable remains the caller falls back to decoding
//! the file as a flat image.

use std::collections::HashSet;

use bytes::Bytes;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{compression_name, Compression, TiffTag};
use super::values::ValueReader;

/// Maximum number of IFDs to walk
const MAX_IFDS: usize = 256;

/// NewSubfileType bit marking a transparency mask
const SUBFILE_MASK: u32 = 0x4;

/// Relative slack allowed when checking a level's aspect ratio
const ASPECT_TOLERANCE: f64 = 0.05;

// =============================================================================
// PixelLayout
// =============================================================================

/// How samples are laid out in a decoded tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub samples_per_pixel: u16,
    pub bits_per_sample: u16,
    /// 0 = min-is-white, 1 = min-is-black, 2 = RGB, 6 = YCbCr
    pub photometric: u16,
    /// 1 = chunky, 2 = planar
    pub planar_config: u16,
}

impl PixelLayout {
    /// Whether tiles with this layout and codec can be decoded to RGB.
    pub fn check_decodable(&self, compression: Compression) -> Result<(), TiffError> {
        if self.bits_per_sample != 8 {
            return Err(TiffError::UnsupportedLayout(format!(
                "{} bits per sample",
                self.bits_per_sample
            )));
        }
        if self.planar_config != 1 && self.samples_per_pixel > 1 {
            return Err(TiffError::UnsupportedLayout("planar configuration".into()));
        }
        match compression {
            // Decoders assume YCbCr for 3-component streams without an Adobe
            // marker, so RGB-encoded JPEG tiles would come out with wrong colors.
            Compression::Jpeg
                if matches!((self.samples_per_pixel, self.photometric), (1, _) | (3, 6)) =>
            {
                Ok(())
            }
            Compression::None
                if matches!(
                    (self.samples_per_pixel, self.photometric),
                    (1, 0) | (1, 1) | (3, 2) | (4, 2)
                ) =>
            {
                Ok(())
            }
            _ => Err(TiffError::UnsupportedLayout(format!(
                "{} samples, photometric {}, {}",
                self.samples_per_pixel,
                self.photometric,
                compression.name()
            ))),
        }
    }
}

// =============================================================================
// PyramidLevel
// =============================================================================

/// One resolution of the pyramid. Level 0 is full resolution.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    pub level_index: usize,

    /// Position of the IFD in the file's IFD chain
    pub ifd_index: usize,

    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,

    /// Downsample relative to level 0 (1.0 for level 0)
    pub downsample: f64,

    pub compression: Compression,
    pub layout: PixelLayout,

    pub tile_offsets_entry: IfdEntry,
    pub tile_byte_counts_entry: IfdEntry,
    pub jpeg_tables_entry: Option<IfdEntry>,
}

impl PyramidLevel {
    /// Build a level candidate from a tiled IFD.
    ///
    /// Returns `Ok(None)` for IFDs that are not tiled images at all, and an
    /// error for tiled IFDs this crate cannot decode.
    async fn from_ifd<R: RangeReader>(
        reader: &ValueReader<'_, R>,
        ifd: &Ifd,
        ifd_index: usize,
        byte_order: ByteOrder,
    ) -> Result<Option<Self>, TiffError> {
        if !ifd.is_tiled() {
            return Ok(None);
        }
        if ifd.subfile_type(byte_order) & SUBFILE_MASK != 0 {
            return Ok(None);
        }

        let width = ifd
            .image_width(byte_order)
            .ok_or(TiffError::MissingTag("ImageWidth"))?;
        let height = ifd
            .image_height(byte_order)
            .ok_or(TiffError::MissingTag("ImageLength"))?;
        let tile_width = ifd
            .tile_width(byte_order)
            .ok_or(TiffError::MissingTag("TileWidth"))?;
        let tile_height = ifd
            .tile_height(byte_order)
            .ok_or(TiffError::MissingTag("TileLength"))?;
        if width == 0 || height == 0 || tile_width == 0 || tile_height == 0 {
            return Err(TiffError::InvalidTagValue {
                tag: "ImageWidth",
                message: format!(
                    "zero dimension {}x{} / tile {}x{}",
                    width, height, tile_width, tile_height
                ),
            });
        }

        let raw_compression = ifd.compression(byte_order);
        let compression = Compression::from_u16(raw_compression)
            .filter(|c| c.is_tile_decodable())
            .ok_or_else(|| TiffError::UnsupportedCompression(compression_name(raw_compression)))?;

        let layout = PixelLayout {
            samples_per_pixel: ifd.samples_per_pixel(byte_order),
            bits_per_sample: bits_per_sample(reader, ifd, byte_order).await?,
            photometric: ifd.photometric(byte_order).unwrap_or(match compression {
                Compression::Jpeg => 6,
                _ => 1,
            }),
            planar_config: ifd.planar_config(byte_order),
        };
        layout.check_decodable(compression)?;

        let tile_offsets_entry = ifd
            .get_entry_by_tag(TiffTag::TileOffsets)
            .cloned()
            .ok_or(TiffError::MissingTag("TileOffsets"))?;
        let tile_byte_counts_entry = ifd
            .get_entry_by_tag(TiffTag::TileByteCounts)
            .cloned()
            .ok_or(TiffError::MissingTag("TileByteCounts"))?;

        Ok(Some(PyramidLevel {
            level_index: 0,
            ifd_index,
            width,
            height,
            tile_width,
            tile_height,
            tiles_x: width.div_ceil(tile_width),
            tiles_y: height.div_ceil(tile_height),
            downsample: 1.0,
            compression,
            layout,
            tile_offsets_entry,
            tile_byte_counts_entry,
            jpeg_tables_entry: ifd.get_entry_by_tag(TiffTag::JpegTables).cloned(),
        }))
    }

    pub fn tile_count(&self) -> u64 {
        self.tiles_x as u64 * self.tiles_y as u64
    }

    /// Row-major tile index, `None` when out of the grid.
    pub fn tile_index(&self, tile_x: u32, tile_y: u32) -> Option<usize> {
        if tile_x >= self.tiles_x || tile_y >= self.tiles_y {
            return None;
        }
        Some(tile_y as usize * self.tiles_x as usize + tile_x as usize)
    }

    /// Visible pixel size of a tile. Edge tiles are cut at the image border.
    pub fn tile_dimensions(&self, tile_x: u32, tile_y: u32) -> Option<(u32, u32)> {
        self.tile_index(tile_x, tile_y)?;
        let w = (self.width - tile_x * self.tile_width).min(self.tile_width);
        let h = (self.height - tile_y * self.tile_height).min(self.tile_height);
        Some((w, h))
    }
}

async fn bits_per_sample<R: RangeReader>(
    reader: &ValueReader<'_, R>,
    ifd: &Ifd,
    byte_order: ByteOrder,
) -> Result<u16, TiffError> {
    let Some(entry) = ifd.get_entry_by_tag(TiffTag::BitsPerSample) else {
        return Ok(1);
    };
    if let Some(bits) = entry.inline_first_u16(byte_order) {
        return Ok(bits);
    }
    let values = reader.read_u64_array(entry).await?;
    let first = values.first().copied().unwrap_or(1);
    if values.iter().any(|&v| v != first) {
        return Err(TiffError::UnsupportedLayout(format!(
            "mixed bits per sample {:?}",
            values
        )));
    }
    Ok(first as u16)
}

// =============================================================================
// TiffPyramid
// =============================================================================

#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,

    /// Sorted by resolution, 0 = highest
    pub levels: Vec<PyramidLevel>,

    /// Number of IFDs in the file
    pub ifd_count: usize,

    /// ImageDescription of the level 0 IFD
    pub description: Option<String>,
}

impl TiffPyramid {
    /// Parse the header and IFD chain and identify pyramid levels.
    ///
    /// Fails with `StripOrganization` when the file has no tiled IFD, and with
    /// the first decode error when tiled IFDs exist but none can be served.
    pub async fn parse<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_bytes = reader.read_clamped(0, BIGTIFF_HEADER_SIZE).await?;
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header).await?;
        let ifd_count = ifds.len();

        let values = ValueReader::new(reader, &header);
        let mut candidates = Vec::new();
        let mut first_error = None;
        for (ifd_index, ifd) in ifds.iter().enumerate() {
            match PyramidLevel::from_ifd(&values, ifd, ifd_index, header.byte_order).await {
                Ok(Some(level)) => candidates.push(level),
                Ok(None) => {}
                Err(err) => {
                    debug!(ifd = ifd_index, error = %err, "Skipping undecodable tiled IFD");
                    first_error.get_or_insert(err);
                }
            }
        }

        if candidates.is_empty() {
            return Err(first_error.unwrap_or(TiffError::StripOrganization));
        }

        let levels = Self::build_levels(candidates);
        let description = match ifds[levels[0].ifd_index].get_entry_by_tag(TiffTag::ImageDescription) {
            Some(entry) => values.read_string(entry).await.ok(),
            None => None,
        };

        Ok(TiffPyramid {
            header,
            levels,
            ifd_count,
            description,
        })
    }

    /// Follow the next-IFD chain, stopping on loops.
    async fn parse_all_ifds<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_IFDS && seen.insert(offset) {
            if offset >= reader.size() {
                return Err(TiffError::InvalidIfdOffset(offset));
            }
            let count_bytes = reader.read_exact_at(offset, header.ifd_count_size()).await?;
            let entry_count = header.read_entry_count(&count_bytes);
            let ifd_size =
                Ifd::calculate_size(entry_count, header).ok_or(TiffError::InvalidIfdOffset(offset))?;
            let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    /// Sort candidates largest first and keep those consistent with level 0.
    fn build_levels(mut candidates: Vec<PyramidLevel>) -> Vec<PyramidLevel> {
        candidates.sort_by_key(|l| std::cmp::Reverse(l.width as u64 * l.height as u64));

        let base_width = candidates[0].width as f64;
        let base_height = candidates[0].height as f64;
        let mut levels: Vec<PyramidLevel> = Vec::with_capacity(candidates.len());

        for mut level in candidates {
            let downsample_x = base_width / level.width as f64;
            let downsample_y = base_height / level.height as f64;

            if let Some(previous) = levels.last() {
                if level.width >= previous.width || level.height >= previous.height {
                    debug!(ifd = level.ifd_index, "Skipping IFD that does not shrink");
                    continue;
                }
                let expected_height = base_height / downsample_x;
                let slack = (expected_height * ASPECT_TOLERANCE).max(1.5);
                if (expected_height - level.height as f64).abs() > slack {
                    debug!(ifd = level.ifd_index, "Skipping IFD with a different aspect ratio");
                    continue;
                }
            }

            level.level_index = levels.len();
            level.downsample = (downsample_x + downsample_y) / 2.0;
            levels.push(level);
        }

        levels
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn get_level(&self, level: usize) -> Option<&PyramidLevel> {
        self.levels.get(level)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.levels[0].width, self.levels[0].height)
    }

    /// Index of the level with the largest downsample not above `downsample`.
    ///
    /// That level has at least the requested resolution, so reading it and
    /// scaling down never upsamples. Falls back to level 0.
    pub fn best_level_for_downsample(&self, downsample: f64) -> usize {
        best_level_index(self.levels.iter().map(|l| l.downsample), downsample)
    }
}

/// Shared level pick used by every reader: largest downsample `<= target`.
pub fn best_level_index(downsamples: impl Iterator<Item = f64>, target: f64) -> usize {
    let limit = target * (1.0 + 1e-6);
    downsamples
        .enumerate()
        .filter(|(_, ds)| *ds <= limit)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

// =============================================================================
// Tile Data Loading
// =============================================================================

/// Offset tables for one level, loaded once when the image is opened.
#[derive(Debug, Clone)]
pub struct TileData {
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TileData {
    pub async fn load<R: RangeReader>(
        reader: &R,
        level: &PyramidLevel,
        header: &TiffHeader,
    ) -> Result<Self, TiffError> {
        let values = ValueReader::new(reader, header);
        let offsets = values.read_u64_array(&level.tile_offsets_entry).await?;
        let byte_counts = values.read_u64_array(&level.tile_byte_counts_entry).await?;

        let expected = level.tile_count();
        if (offsets.len() as u64) < expected || (byte_counts.len() as u64) < expected {
            return Err(TiffError::InvalidTagValue {
                tag: "TileOffsets",
                message: format!(
                    "level {} needs {} tiles, found {} offsets and {} byte counts",
                    level.level_index,
                    expected,
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match &level.jpeg_tables_entry {
            Some(entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };

        Ok(TileData {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    /// `(offset, byte_count)` of a tile.
    pub fn get_tile_location(&self, tile_index: usize) -> Option<(u64, u64)> {
        Some((
            *self.offsets.get(tile_index)?,
            *self.byte_counts.get(tile_index)?,
        ))
    }
}

// =============================================================================
// Tests
// =============================================================================
