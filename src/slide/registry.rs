//! Registry of opened images.
//!
//! The registry provides:
//! - one parsed handle per resolved path, reused by every request
//! - singleflight opening, so concurrent first requests parse the file once
//! - format auto-detection with a flat-image fallback
//!
//! Handles are never evicted on their own. They go away only through
//! [`SlideRegistry::invalidate`] or [`SlideRegistry::clear`].
//!
//! # Example
//!
//! ```ignore
//! use image_excluder::slide::{LocalSlideSource, SlideRegistry};
//!
//! let registry = SlideRegistry::new(LocalSlideSource::new("/data/slides")?);
//! let slide = registry.get_slide("case_01/scan.tif").await?;
//! println!("{} levels", slide.level_count());
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info};

use crate::error::{FormatError, IoError, TiffError};
use crate::format::{detect_kind, FlatImage, ImageKind, PyramidTiffReader, RawTile, DEFAULT_MAX_FLAT_BYTES};
use crate::io::RangeReader;

use super::reader::{LevelInfo, SlideReader};

// =============================================================================
// Configuration
// =============================================================================

/// Tile grid used to serve flat images.
pub const DEFAULT_FLAT_TILE_SIZE: u32 = 256;

// =============================================================================
// SlideSource Trait
// =============================================================================

/// Creates range readers from request paths.
#[async_trait]
pub trait SlideSource: Send + Sync {
    /// The type of range reader this source creates.
    type Reader: RangeReader + 'static;

    /// Map a request path to the key its handle is cached under.
    ///
    /// Two spellings of the same file must resolve to the same key.
    async fn resolve(&self, path: &str) -> Result<String, IoError> {
        Ok(path.to_string())
    }

    /// Create a range reader for a resolved key.
    async fn create_reader(&self, key: &str) -> Result<Self::Reader, IoError>;
}

// =============================================================================
// CachedSlide
// =============================================================================

/// An opened image: its reader plus the parsed level structure.
pub struct CachedSlide<R: RangeReader + 'static> {
    key: String,
    kind: ImageKind,
    reader: Arc<R>,
    inner: SlideInner,
}

enum SlideInner {
    Pyramid(PyramidTiffReader),
    Flat(FlatImage),
}

impl<R: RangeReader + 'static> CachedSlide<R> {
    /// Resolved key this handle is cached under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Container kind found in the magic bytes.
    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    /// `pyramid_tiff`, or `flat_<kind>` for the single-level fallback.
    pub fn format_name(&self) -> String {
        match &self.inner {
            SlideInner::Pyramid(_) => "pyramid_tiff".to_string(),
            SlideInner::Flat(flat) => format!("flat_{}", flat.kind().name()),
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.inner, SlideInner::Flat(_))
    }

    pub fn pyramid(&self) -> Option<&PyramidTiffReader> {
        match &self.inner {
            SlideInner::Pyramid(p) => Some(p),
            SlideInner::Flat(_) => None,
        }
    }

    pub fn flat(&self) -> Option<&FlatImage> {
        match &self.inner {
            SlideInner::Flat(f) => Some(f),
            SlideInner::Pyramid(_) => None,
        }
    }

    pub fn reader(&self) -> &R {
        self.reader.as_ref()
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.reader.size()
    }

    fn layout(&self) -> &dyn SlideReader {
        match &self.inner {
            SlideInner::Pyramid(p) => p,
            SlideInner::Flat(f) => f,
        }
    }

    /// Stored bytes of a pyramid tile. Flat images have no stored tiles.
    pub async fn read_raw_tile(
        &self,
        level: usize,
        tile_x: u32,
        tile_y: u32,
    ) -> Result<RawTile, TiffError> {
        match &self.inner {
            SlideInner::Pyramid(p) => {
                p.read_raw_tile(self.reader.as_ref(), level, tile_x, tile_y)
                    .await
            }
            SlideInner::Flat(_) => Err(TiffError::StripOrganization),
        }
    }

    /// Whole file of a flat image, for decoding.
    pub async fn read_flat_bytes(&self, max_bytes: u64) -> Result<Bytes, FormatError> {
        FlatImage::read_all(self.reader.as_ref(), max_bytes).await
    }
}

impl<R: RangeReader + 'static> SlideReader for CachedSlide<R> {
    fn level_count(&self) -> usize {
        self.layout().level_count()
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        self.layout().level_info(level)
    }
}

// =============================================================================
// SlideRegistry
// =============================================================================

type OpenResult<R> = Result<Arc<CachedSlide<R>>, FormatError>;

/// Registry of opened images keyed by resolved path.
pub struct SlideRegistry<S: SlideSource> {
    source: S,

    /// Opened handles, never evicted implicitly
    cache: RwLock<HashMap<String, Arc<CachedSlide<S::Reader>>>>,

    /// Opens in progress; waiters share the leader's result
    in_flight: Mutex<HashMap<String, Arc<OnceCell<OpenResult<S::Reader>>>>>,

    /// Bumped under the cache write lock by every invalidation. An open that
    /// started under an older generation is returned but not cached.
    generation: AtomicU64,

    /// Tile grid for flat images
    flat_tile_size: u32,

    /// Largest file decoded as a flat image
    max_flat_bytes: u64,
}

impl<S: SlideSource> SlideRegistry<S> {
    pub fn new(source: S) -> Self {
        Self::with_flat_options(source, DEFAULT_FLAT_TILE_SIZE, DEFAULT_MAX_FLAT_BYTES)
    }

    /// Registry with custom flat-image settings.
    ///
    /// # Arguments
    /// * `flat_tile_size` - Tile grid flat images are cut on
    /// * `max_flat_bytes` - Files above this size are not decoded as flat images
    pub fn with_flat_options(source: S, flat_tile_size: u32, max_flat_bytes: u64) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            flat_tile_size: flat_tile_size.max(1),
            max_flat_bytes,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn max_flat_bytes(&self) -> u64 {
        self.max_flat_bytes
    }

    /// Get an image handle, opening it if not already cached.
    ///
    /// Concurrent callers for the same path share one open. A failed open is
    /// not cached; the next request retries.
    pub async fn get_slide(&self, path: &str) -> OpenResult<S::Reader> {
        let key = self.source.resolve(path).await?;

        if let Some(slide) = self.cache.read().await.get(&key) {
            return Ok(slide.clone());
        }

        let cell = {
            let mut in_flight = self.in_flight.lock().await;
            in_flight
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let result = cell
            .get_or_init(|| async {
                // The previous leader may have finished between the cache check and here.
                if let Some(slide) = self.cache.read().await.get(&key) {
                    return Ok(slide.clone());
                }
                let generation = self.generation.load(Ordering::Acquire);
                let opened = self.open_slide_internal(&key).await.map(Arc::new);
                if let Ok(slide) = &opened {
                    let mut cache = self.cache.write().await;
                    if self.generation.load(Ordering::Acquire) == generation {
                        cache.insert(key.clone(), slide.clone());
                    } else {
                        debug!(path = %key, "Invalidated during open, not caching");
                    }
                }
                opened
            })
            .await
            .clone();

        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                in_flight.remove(&key);
            }
        }

        result
    }

    async fn open_slide_internal(&self, key: &str) -> Result<CachedSlide<S::Reader>, FormatError> {
        let reader = Arc::new(self.source.create_reader(key).await?);
        let kind = detect_kind(reader.as_ref()).await?;

        let inner = match kind {
            ImageKind::Unknown => {
                return Err(FormatError::UnsupportedFormat {
                    reason: format!("{} is not a TIFF, JPEG or PNG file", key),
                })
            }
            kind if kind.is_tiff() => match PyramidTiffReader::open(reader.as_ref()).await {
                Ok(pyramid) => SlideInner::Pyramid(pyramid),
                Err(err) if is_structural(&err) => {
                    debug!(path = key, error = %err, "Not a servable pyramid, trying flat decode");
                    let flat = self.open_flat(reader.as_ref(), kind).await.map_err(|flat_err| {
                        FormatError::UnsupportedFormat {
                            reason: format!("{}; flat decode failed: {}", err, flat_err),
                        }
                    })?;
                    SlideInner::Flat(flat)
                }
                Err(err) => return Err(err.into()),
            },
            kind => SlideInner::Flat(self.open_flat(reader.as_ref(), kind).await?),
        };

        let slide = CachedSlide {
            key: key.to_string(),
            kind,
            reader,
            inner,
        };
        let (width, height) = slide.dimensions();
        info!(
            path = key,
            format = %slide.format_name(),
            levels = slide.level_count(),
            width,
            height,
            "Opened image"
        );
        Ok(slide)
    }

    async fn open_flat(&self, reader: &S::Reader, kind: ImageKind) -> Result<FlatImage, FormatError> {
        FlatImage::open(reader, kind, self.flat_tile_size, self.max_flat_bytes).await
    }

    /// Reader for the raw byte endpoint.
    ///
    /// Reuses the cached handle's reader when the image is already open; any
    /// other file under the root gets a fresh reader that is not cached, since
    /// raw ranges never need the parsed structure.
    pub async fn raw_reader(&self, path: &str) -> Result<Arc<S::Reader>, IoError> {
        let key = self.source.resolve(path).await?;
        if let Some(slide) = self.cache.read().await.get(&key) {
            return Ok(Arc::clone(&slide.reader));
        }
        Ok(Arc::new(self.source.create_reader(&key).await?))
    }

    /// Drop the handle for one path. Returns whether one was cached.
    pub async fn invalidate(&self, path: &str) -> bool {
        let key = match self.source.resolve(path).await {
            Ok(key) => key,
            Err(_) => path.to_string(),
        };
        self.in_flight.lock().await.remove(&key);
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        cache.remove(&key).is_some()
    }

    /// Drop every handle.
    pub async fn clear(&self) {
        self.in_flight.lock().await.clear();
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        cache.clear();
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }
}

/// Errors about the file's structure, as opposed to failing to read it.
fn is_structural(err: &TiffError) -> bool {
    !matches!(err, TiffError::Io(IoError::NotFound(_) | IoError::Read(_)))
}

// =============================================================================
// Tests
// =============================================================================
