//! Format-agnostic view of an opened image's level structure.
//!
//! Both the pyramid TIFF reader and the flat-image fallback implement
//! [`SlideReader`], so descriptors, DZI level math and bounds checks do not
//! care which one backs a given file.

use serde::Serialize;

use crate::format::tiff::best_level_index;

// =============================================================================
// Level Information
// =============================================================================

/// Snapshot of one level's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelInfo {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,

    /// Level 0 has downsample 1.0
    pub downsample: f64,
}

// =============================================================================
// SlideReader Trait
// =============================================================================

/// Level metadata of an opened image.
///
/// Level 0 is always full resolution. A flat image has exactly one level.
pub trait SlideReader: Send + Sync {
    fn level_count(&self) -> usize;

    /// Geometry of `level`, `None` when out of range.
    fn level_info(&self, level: usize) -> Option<LevelInfo>;

    /// Full-resolution `(width, height)`.
    fn dimensions(&self) -> (u32, u32) {
        self.level_info(0)
            .map(|info| (info.width, info.height))
            .unwrap_or((0, 0))
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.level_info(level).map(|info| (info.width, info.height))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.level_info(level).map(|info| info.downsample)
    }

    /// Nominal tile size; edge tiles may be smaller.
    fn tile_size(&self, level: usize) -> Option<(u32, u32)> {
        self.level_info(level)
            .map(|info| (info.tile_width, info.tile_height))
    }

    fn tile_count(&self, level: usize) -> Option<(u32, u32)> {
        self.level_info(level).map(|info| (info.tiles_x, info.tiles_y))
    }

    /// Level with the largest downsample that does not exceed `downsample`.
    fn best_level_for_downsample(&self, downsample: f64) -> usize {
        best_level_index(
            (0..self.level_count()).filter_map(|l| self.level_downsample(l)),
            downsample,
        )
    }

    /// Visible size of tile `(x, y)` on `level`, cut at the image border.
    fn tile_dimensions(&self, level: usize, x: u32, y: u32) -> Option<(u32, u32)> {
        let info = self.level_info(level)?;
        if x >= info.tiles_x || y >= info.tiles_y {
            return None;
        }
        let w = (info.width - x * info.tile_width).min(info.tile_width);
        let h = (info.height - y * info.tile_height).min(info.tile_height);
        Some((w, h))
    }
}
