//! Tile Service for orchestrating tile generation.
//!
//! The TileService is the main entry point for structured image requests:
//! native pyramid tiles, Deep Zoom tiles and thumbnails. It orchestrates:
//! - Request validation
//! - Cache lookups
//! - Image access via the registry
//! - Decoding, compositing and JPEG re-encoding
//! - Result caching
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │          get_tile() / get_dzi_tile() / thumbnail        │    │
//! │  │  1. Validate params   4. Read + decode covering tiles   │    │
//! │  │  2. Check cache       5. Resize and encode              │    │
//! │  │  3. Get image         6. Cache & return                 │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌──────────────┐    ┌──────────────────┐  │
//! │    │ TileCache │      │ SlideRegistry│    │ JpegTileEncoder  │  │
//! │    └───────────┘      └──────────────┘    └──────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decoding and encoding are CPU bound and run on the blocking pool.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use futures::future::try_join_all;
use image::imageops::{self, FilterType};
use image::RgbImage;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info};

use crate::error::TileError;
use crate::format::{crop_tile, RawTile};
use crate::slide::{CachedSlide, SlideReader, SlideRegistry, SlideSource};

use super::cache::{TileCache, TileCacheKey, TileKind, DEFAULT_TILE_CACHE_CAPACITY};
use super::dzi::{dzi_tile_region, DEFAULT_DZI_TILE_SIZE};
use super::encoder::{is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY};

/// Default number of decoded flat images kept in memory.
pub const DEFAULT_DECODED_CAPACITY: usize = 4;

/// Default longest side of a thumbnail.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 512;

pub const MIN_THUMBNAIL_SIZE: u32 = 64;

pub const MAX_THUMBNAIL_SIZE: u32 = 2048;

/// Native tiles decoded per blocking task while compositing.
const COMPOSITE_BATCH: usize = 16;

// =============================================================================
// Tile Request
// =============================================================================

/// A request for a native or DZI tile.
#[derive(Debug, Clone)]
pub struct TileRequest {
    /// Image path relative to the served root
    pub path: String,

    /// Pyramid level (0 = full resolution), or DZI level for DZI tiles
    pub level: usize,

    /// Tile column
    pub tile_x: u32,

    /// Tile row
    pub tile_y: u32,

    /// JPEG quality (1-100)
    pub quality: u8,
}

impl TileRequest {
    /// Create a new tile request with default quality.
    pub fn new(path: impl Into<String>, level: usize, tile_x: u32, tile_y: u32) -> Self {
        Self::with_quality(path, level, tile_x, tile_y, DEFAULT_JPEG_QUALITY)
    }

    /// Create a new tile request with specified quality.
    pub fn with_quality(
        path: impl Into<String>,
        level: usize,
        tile_x: u32,
        tile_y: u32,
        quality: u8,
    ) -> Self {
        Self {
            path: path.into(),
            level,
            tile_x,
            tile_y,
            quality,
        }
    }
}

// =============================================================================
// Tile Response
// =============================================================================

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The encoded JPEG
    pub data: Bytes,

    /// Whether this tile was served from cache
    pub cache_hit: bool,

    /// The JPEG quality used for encoding
    pub quality: u8,
}

/// Tunables for [`TileService`].
#[derive(Debug, Clone, Copy)]
pub struct TileServiceOptions {
    /// Encoded tile cache size in bytes
    pub cache_capacity: usize,

    /// Number of decoded flat images kept in memory
    pub decoded_capacity: usize,

    /// Edge of DZI tiles
    pub dzi_tile_size: u32,

    /// Quality used when a request does not set one
    pub default_quality: u8,
}

impl Default for TileServiceOptions {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            decoded_capacity: DEFAULT_DECODED_CAPACITY,
            dzi_tile_size: DEFAULT_DZI_TILE_SIZE,
            default_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Counts returned by [`TileService::invalidate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub handles: usize,
    pub tiles: usize,
}

/// Pixel rectangle `[x0, x1) x [y0, y1)` on one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LevelRect {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl LevelRect {
    fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

// =============================================================================
// Tile Service
// =============================================================================

/// Service for generating and caching JPEG tiles.
///
/// # Example
///
/// ```ignore
/// use image_excluder::slide::{LocalSlideSource, SlideRegistry};
/// use image_excluder::tile::{TileRequest, TileService};
///
/// let registry = SlideRegistry::new(LocalSlideSource::new("/data")?);
/// let service = TileService::new(registry);
///
/// let response = service.get_tile(TileRequest::new("scan.tif", 0, 1, 2)).await?;
/// println!("{} bytes, cache hit: {}", response.data.len(), response.cache_hit);
/// ```
pub struct TileService<S: SlideSource> {
    registry: Arc<SlideRegistry<S>>,

    /// Encoded tiles
    cache: TileCache,

    /// Fully decoded flat images, keyed by resolved path
    decoded: Mutex<LruCache<String, Arc<RgbImage>>>,

    encoder: JpegTileEncoder,

    dzi_tile_size: u32,
}

impl<S: SlideSource> TileService<S> {
    pub fn new(registry: SlideRegistry<S>) -> Self {
        Self::with_options(Arc::new(registry), TileServiceOptions::default())
    }

    /// Create a tile service over a shared registry.
    pub fn with_options(registry: Arc<SlideRegistry<S>>, options: TileServiceOptions) -> Self {
        let decoded = NonZeroUsize::new(options.decoded_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            registry,
            cache: TileCache::with_capacity(options.cache_capacity),
            decoded: Mutex::new(LruCache::new(decoded)),
            encoder: JpegTileEncoder::new(options.default_quality),
            dzi_tile_size: options.dzi_tile_size.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<SlideRegistry<S>> {
        &self.registry
    }

    pub fn dzi_tile_size(&self) -> u32 {
        self.dzi_tile_size
    }

    pub fn default_quality(&self) -> u8 {
        self.encoder.default_quality()
    }

    /// Open (or reuse) an image and return its handle.
    pub async fn descriptor(&self, path: &str) -> Result<Arc<CachedSlide<S::Reader>>, TileError> {
        Ok(self.registry.get_slide(path).await?)
    }

    /// Get a native pyramid tile, using cache when available.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the path does not resolve to a file
    /// - `InvalidLevel` / `TileOutOfBounds` outside the pyramid
    /// - `InvalidQuality` for a quality outside 1..=100
    pub async fn get_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        check_quality(request.quality)?;
        let slide = self.descriptor(&request.path).await?;
        let level_count = slide.level_count();
        let (max_x, max_y) = slide.tile_count(request.level).ok_or(TileError::InvalidLevel {
            level: request.level,
            level_count,
        })?;
        if request.tile_x >= max_x || request.tile_y >= max_y {
            return Err(TileError::TileOutOfBounds {
                level: request.level,
                x: request.tile_x,
                y: request.tile_y,
                max_x,
                max_y,
            });
        }

        let key = TileCacheKey::new(
            slide.key(),
            TileKind::Native,
            request.level as u32,
            request.tile_x,
            request.tile_y,
            request.quality,
        );
        self.cached_or_render(key, request.quality, async {
            let image = self
                .native_tile_image(&slide, request.level, request.tile_x, request.tile_y)
                .await?;
            self.encode(image, request.quality).await
        })
        .await
    }

    /// Get a Deep Zoom tile; `request.level` is the DZI level.
    pub async fn get_dzi_tile(&self, request: TileRequest) -> Result<TileResponse, TileError> {
        check_quality(request.quality)?;
        let slide = self.descriptor(&request.path).await?;
        let (width, height) = slide.dimensions();
        let region = dzi_tile_region(
            width,
            height,
            self.dzi_tile_size,
            request.level,
            request.tile_x,
            request.tile_y,
        )?;

        let key = TileCacheKey::new(
            slide.key(),
            TileKind::Dzi,
            request.level as u32,
            request.tile_x,
            request.tile_y,
            request.quality,
        );
        self.cached_or_render(key, request.quality, async {
            let level = slide.best_level_for_downsample(region.downsample);
            let level_downsample = slide.level_downsample(level).unwrap_or(1.0);
            let (level_width, level_height) = slide.level_dimensions(level).unwrap_or((width, height));

            let rect = level_rect(
                (region.full_x0, region.full_y0, region.full_x1, region.full_y1),
                level_downsample,
                level_width,
                level_height,
            );
            debug!(
                path = slide.key(),
                dzi_level = request.level,
                level,
                "Rendering DZI tile"
            );
            let image = self
                .render_region(&slide, level, rect, region.out_width, region.out_height)
                .await?;
            self.encode(image, request.quality).await
        })
        .await
    }

    /// JPEG whose longest side is at most `max_size` (clamped to 64..=2048).
    ///
    /// Images smaller than `max_size` are not upscaled.
    pub async fn generate_thumbnail(
        &self,
        path: &str,
        max_size: u32,
        quality: u8,
    ) -> Result<TileResponse, TileError> {
        check_quality(quality)?;
        let max_size = max_size.clamp(MIN_THUMBNAIL_SIZE, MAX_THUMBNAIL_SIZE);
        let slide = self.descriptor(path).await?;
        let (width, height) = slide.dimensions();

        let key = TileCacheKey::new(slide.key(), TileKind::Thumbnail, max_size, 0, 0, quality);
        self.cached_or_render(key, quality, async {
            let (out_width, out_height) = thumbnail_size(width, height, max_size);
            let downsample = width as f64 / out_width as f64;
            let level = slide.best_level_for_downsample(downsample);
            let (level_width, level_height) = slide.level_dimensions(level).unwrap_or((width, height));
            let rect = LevelRect {
                x0: 0,
                y0: 0,
                x1: level_width,
                y1: level_height,
            };
            let image = self
                .render_region(&slide, level, rect, out_width, out_height)
                .await?;
            self.encode(image, quality).await
        })
        .await
    }

    /// Drop cached handles and tiles for one path, or for everything.
    pub async fn invalidate(&self, path: Option<&str>) -> Invalidation {
        let report = match path {
            Some(path) => {
                let key = self
                    .registry
                    .source()
                    .resolve(path)
                    .await
                    .unwrap_or_else(|_| path.to_string());
                let handles = usize::from(self.registry.invalidate(path).await);
                self.decoded.lock().await.pop(&key);
                Invalidation {
                    handles,
                    tiles: self.cache.invalidate_path(&key).await,
                }
            }
            None => {
                let handles = self.registry.cached_count().await;
                let tiles = self.cache.len().await;
                self.registry.clear().await;
                self.decoded.lock().await.clear();
                self.cache.clear().await;
                Invalidation { handles, tiles }
            }
        };
        info!(
            path = path.unwrap_or("*"),
            handles = report.handles,
            tiles = report.tiles,
            "Invalidated cache"
        );
        report
    }

    /// Get tile cache statistics as `(current_size, capacity, entry_count)`.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        let size = self.cache.size().await;
        let capacity = self.cache.capacity();
        let count = self.cache.len().await;
        (size, capacity, count)
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    async fn cached_or_render<F>(
        &self,
        key: TileCacheKey,
        quality: u8,
        render: F,
    ) -> Result<TileResponse, TileError>
    where
        F: std::future::Future<Output = Result<Bytes, TileError>>,
    {
        if let Some(data) = self.cache.get(&key).await {
            return Ok(TileResponse {
                data,
                cache_hit: true,
                quality,
            });
        }

        let data = render.await?;
        self.cache.put(key, data.clone()).await;
        Ok(TileResponse {
            data,
            cache_hit: false,
            quality,
        })
    }

    async fn encode(&self, image: RgbImage, quality: u8) -> Result<Bytes, TileError> {
        let encoder = self.encoder;
        run_blocking(move || encoder.encode(&image, quality)).await
    }

    /// Decoded native tile, cropped at the image border.
    async fn native_tile_image(
        &self,
        slide: &CachedSlide<S::Reader>,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<RgbImage, TileError> {
        match slide.flat() {
            Some(flat) => {
                let tile_size = flat.tile_size(0).map(|(w, _)| w).unwrap_or(1);
                let decoded = self.decoded_flat(slide).await?;
                run_blocking(move || {
                    crop_tile(&decoded, tile_size, tile_x, tile_y).ok_or(TileError::TileOutOfBounds {
                        level: 0,
                        x: tile_x,
                        y: tile_y,
                        max_x: decoded.width().div_ceil(tile_size),
                        max_y: decoded.height().div_ceil(tile_size),
                    })
                })
                .await
            }
            None => {
                let raw = slide.read_raw_tile(level, tile_x, tile_y).await?;
                run_blocking(move || raw.decode()).await
            }
        }
    }

    /// Render `rect` of `level`, scaled to `out_width` x `out_height`.
    ///
    /// Each covering tile is scaled into its slot of the output on its own, so
    /// memory stays bounded by the output size even when `rect` is large.
    async fn render_region(
        &self,
        slide: &CachedSlide<S::Reader>,
        level: usize,
        rect: LevelRect,
        out_width: u32,
        out_height: u32,
    ) -> Result<RgbImage, TileError> {
        if slide.is_flat() {
            let decoded = self.decoded_flat(slide).await?;
            return run_blocking(move || {
                let region =
                    imageops::crop_imm(&*decoded, rect.x0, rect.y0, rect.width(), rect.height())
                        .to_image();
                Ok(resize_to(region, out_width, out_height))
            })
            .await;
        }

        let info = slide.level_info(level).ok_or(TileError::InvalidLevel {
            level,
            level_count: slide.level_count(),
        })?;
        let first_col = rect.x0 / info.tile_width;
        let last_col = (rect.x1 - 1) / info.tile_width;
        let first_row = rect.y0 / info.tile_height;
        let last_row = (rect.y1 - 1) / info.tile_height;

        let coords: Vec<(u32, u32)> = (first_row..=last_row)
            .flat_map(|row| (first_col..=last_col).map(move |col| (col, row)))
            .collect();

        let mut canvas = RgbImage::new(out_width, out_height);
        for batch in coords.chunks(COMPOSITE_BATCH) {
            let raws: Vec<(u32, u32, RawTile)> =
                try_join_all(batch.iter().map(|&(col, row)| async move {
                    let raw = slide.read_raw_tile(level, col, row).await?;
                    Ok::<_, TileError>((col, row, raw))
                }))
                .await?;

            canvas = run_blocking(move || {
                for (col, row, raw) in raws {
                    let tile = raw.decode()?;
                    paste_scaled(
                        &mut canvas,
                        &tile,
                        col * info.tile_width,
                        row * info.tile_height,
                        rect,
                    );
                }
                Ok(canvas)
            })
            .await?;
        }

        Ok(canvas)
    }

    /// Fully decoded flat image, decoded at most once while cached.
    async fn decoded_flat(&self, slide: &CachedSlide<S::Reader>) -> Result<Arc<RgbImage>, TileError> {
        if let Some(image) = self.decoded.lock().await.get(slide.key()) {
            return Ok(image.clone());
        }

        let flat = slide
            .flat()
            .cloned()
            .ok_or_else(|| TileError::UnsupportedFormat {
                reason: format!("{} is not a flat image", slide.key()),
            })?;
        let bytes = slide.read_flat_bytes(self.registry.max_flat_bytes()).await?;
        let image = Arc::new(run_blocking(move || flat.decode(&bytes)).await?);
        debug!(path = slide.key(), width = image.width(), height = image.height(), "Decoded flat image");

        self.decoded
            .lock()
            .await
            .put(slide.key().to_string(), image.clone());
        Ok(image)
    }
}

fn check_quality(quality: u8) -> Result<(), TileError> {
    if is_valid_quality(quality) {
        Ok(())
    } else {
        Err(TileError::InvalidQuality { quality })
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, TileError>
where
    F: FnOnce() -> Result<T, TileError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| TileError::DecodeError {
            message: format!("worker task failed: {}", e),
        })?
}

/// Output size of a thumbnail: longest side `max_size`, never upscaled.
fn thumbnail_size(width: u32, height: u32, max_size: u32) -> (u32, u32) {
    let longest = width.max(height).max(1);
    if longest <= max_size {
        return (width.max(1), height.max(1));
    }
    let scale = max_size as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).clamp(1, max_size);
    let h = ((height as f64 * scale).round() as u32).clamp(1, max_size);
    (w, h)
}

/// Map a full-resolution rectangle onto a level with `downsample`.
fn level_rect(
    full: (f64, f64, f64, f64),
    downsample: f64,
    level_width: u32,
    level_height: u32,
) -> LevelRect {
    let (fx0, fy0, fx1, fy1) = full;
    let x0 = ((fx0 / downsample).floor() as u32).min(level_width.saturating_sub(1));
    let y0 = ((fy0 / downsample).floor() as u32).min(level_height.saturating_sub(1));
    let x1 = ((fx1 / downsample).ceil() as u32).clamp(x0 + 1, level_width.max(x0 + 1));
    let y1 = ((fy1 / downsample).ceil() as u32).clamp(y0 + 1, level_height.max(y0 + 1));
    LevelRect { x0, y0, x1, y1 }
}

fn resize_to(image: RgbImage, width: u32, height: u32) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image;
    }
    imageops::resize(&image, width, height, FilterType::Triangle)
}

/// Output coordinate of level coordinate `v` inside `rect`.
fn project(v: u32, start: u32, span: u32, out: u32) -> u32 {
    ((v - start) as f64 * out as f64 / span as f64).round() as u32
}

/// Scale the part of `tile` (placed at `left`, `top` on the level) inside
/// `rect` into its slot of `canvas`.
fn paste_scaled(canvas: &mut RgbImage, tile: &RgbImage, left: u32, top: u32, rect: LevelRect) {
    let cx0 = left.max(rect.x0);
    let cy0 = top.max(rect.y0);
    let cx1 = (left + tile.width()).min(rect.x1);
    let cy1 = (top + tile.height()).min(rect.y1);
    if cx1 <= cx0 || cy1 <= cy0 {
        return;
    }

    let (out_w, out_h) = canvas.dimensions();
    let dx0 = project(cx0, rect.x0, rect.width(), out_w);
    let dy0 = project(cy0, rect.y0, rect.height(), out_h);
    let dx1 = project(cx1, rect.x0, rect.width(), out_w);
    let dy1 = project(cy1, rect.y0, rect.height(), out_h);
    if dx1 <= dx0 || dy1 <= dy0 {
        return;
    }

    let piece = imageops::crop_imm(tile, cx0 - left, cy0 - top, cx1 - cx0, cy1 - cy0).to_image();
    let piece = resize_to(piece, dx1 - dx0, dy1 - dy0);
    imageops::replace(canvas, &piece, dx0 as i64, dy0 as i64);
}

// =============================================================================
// Tests
// =============================================================================
