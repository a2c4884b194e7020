//! Deep Zoom Image (DZI) geometry.
//!
//! Deep Zoom uses an inverted level numbering compared to the TIFF pyramid:
//! - DZI level 0 = 1x1 pixel (lowest resolution)
//! - DZI max level = full resolution
//!
//! DZI level `L` is the full image scaled by `2^(max - L)`, independent of
//! which levels the file actually stores. Tiles are cut from the stored level
//! closest in resolution and resized.

use crate::error::TileError;

/// Default DZI tile edge in pixels.
pub const DEFAULT_DZI_TILE_SIZE: u32 = 256;

/// Generate the DZI XML descriptor.
///
/// # Example Output
///
/// ```xml
/// <?xml version="1.0" encoding="UTF-8"?>
/// <Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
///        TileSize="256"
///        Overlap="0"
///        Format="jpg">
///   <Size Width="46920" Height="33600" />
/// </Image>
/// ```
pub fn generate_dzi_xml(width: u32, height: u32, tile_size: u32) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Image xmlns="http://schemas.microsoft.com/deepzoom/2008"
       TileSize="{tile_size}"
       Overlap="0"
       Format="jpg">
  <Size Width="{width}" Height="{height}" />
</Image>"#
    )
}

/// `ceil(log2(max(width, height)))`, 0 for a 1x1 image.
pub fn calculate_max_dzi_level(width: u32, height: u32) -> usize {
    let max_dim = u64::from(width.max(height));
    if max_dim <= 1 {
        return 0;
    }
    max_dim.next_power_of_two().trailing_zeros() as usize
}

/// Scale between the full image and `dzi_level`, `None` past the max level.
fn level_scale(dzi_level: usize, max_dzi_level: usize) -> Option<u64> {
    let shift = max_dzi_level.checked_sub(dzi_level)?;
    1u64.checked_shl(shift as u32)
}

/// Dimensions at a DZI level: `ceil(dim / 2^(max - L))`.
pub fn dzi_level_dimensions(
    width: u32,
    height: u32,
    dzi_level: usize,
    max_dzi_level: usize,
) -> Option<(u32, u32)> {
    let scale = level_scale(dzi_level, max_dzi_level)?;
    let w = u64::from(width).div_ceil(scale).max(1);
    let h = u64::from(height).div_ceil(scale).max(1);
    Some((w as u32, h as u32))
}

/// Downsample of a DZI level relative to full resolution.
pub fn dzi_level_downsample(dzi_level: usize, max_dzi_level: usize) -> Option<f64> {
    level_scale(dzi_level, max_dzi_level).map(|s| s as f64)
}

pub fn dzi_tile_count(level_width: u32, level_height: u32, tile_size: u32) -> (u32, u32) {
    let tiles_x = level_width.div_ceil(tile_size);
    let tiles_y = level_height.div_ceil(tile_size);
    (tiles_x.max(1), tiles_y.max(1))
}

/// Parse `"3_5.jpg"` (or `.jpeg`, or no extension) into `(x, y)`.
pub fn parse_dzi_tile_coords(filename: &str) -> Option<(u32, u32)> {
    let name = filename
        .strip_suffix(".jpg")
        .or_else(|| filename.strip_suffix(".jpeg"))
        .unwrap_or(filename);

    let (x, y) = name.split_once('_')?;
    Some((x.parse().ok()?, y.parse().ok()?))
}

// =============================================================================
// Request paths
// =============================================================================

/// What a `/dzi/...` path addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DziPath<'a> {
    /// `<image>` or `<image>.dzi`
    Descriptor { image: &'a str },
    /// `<image>_files/<level>/<x>_<y>.jpg`
    Tile {
        image: &'a str,
        level: usize,
        x: u32,
        y: u32,
    },
}

/// Split a DZI request path. `None` when a `_files/` path is malformed.
pub fn parse_dzi_path(path: &str) -> Option<DziPath<'_>> {
    match path.rsplit_once("_files/") {
        Some((image, rest)) => {
            let (level, file) = rest.split_once('/')?;
            let level = level.parse().ok()?;
            let (x, y) = parse_dzi_tile_coords(file)?;
            let image = image.strip_suffix(".dzi").unwrap_or(image);
            Some(DziPath::Tile { image, level, x, y })
        }
        None => Some(DziPath::Descriptor {
            image: path.strip_suffix(".dzi").unwrap_or(path),
        }),
    }
}

// =============================================================================
// Tile geometry
// =============================================================================

/// Area a DZI tile covers, in full-resolution pixels, and its output size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DziTileRegion {
    /// Full-resolution pixels per DZI pixel
    pub downsample: f64,
    pub full_x0: f64,
    pub full_y0: f64,
    pub full_x1: f64,
    pub full_y1: f64,
    pub out_width: u32,
    pub out_height: u32,
}

/// Locate DZI tile `(x, y)` of `dzi_level`, rejecting anything outside the grid.
pub fn dzi_tile_region(
    width: u32,
    height: u32,
    tile_size: u32,
    dzi_level: usize,
    x: u32,
    y: u32,
) -> Result<DziTileRegion, TileError> {
    let max_level = calculate_max_dzi_level(width, height);
    let (level_width, level_height) = dzi_level_dimensions(width, height, dzi_level, max_level)
        .ok_or(TileError::InvalidLevel {
            level: dzi_level,
            level_count: max_level + 1,
        })?;
    let downsample = dzi_level_downsample(dzi_level, max_level).unwrap_or(1.0);

    let (tiles_x, tiles_y) = dzi_tile_count(level_width, level_height, tile_size);
    if x >= tiles_x || y >= tiles_y {
        return Err(TileError::TileOutOfBounds {
            level: dzi_level,
            x,
            y,
            max_x: tiles_x,
            max_y: tiles_y,
        });
    }

    let x0 = x * tile_size;
    let y0 = y * tile_size;
    let x1 = (x0 + tile_size).min(level_width);
    let y1 = (y0 + tile_size).min(level_height);

    Ok(DziTileRegion {
        downsample,
        full_x0: x0 as f64 * downsample,
        full_y0: y0 as f64 * downsample,
        full_x1: (x1 as f64 * downsample).min(width as f64),
        full_y1: (y1 as f64 * downsample).min(height as f64),
        out_width: x1 - x0,
        out_height: y1 - y0,
    })
}
