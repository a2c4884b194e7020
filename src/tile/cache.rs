//! LRU cache for encoded tiles.
//!
//! Keys identify the image path, the kind of tile (native, DZI, thumbnail),
//! its coordinates and the JPEG quality. The cache is bounded both by total
//! bytes and by entry count; the least recently used tiles go first.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

/// Default byte capacity (100 MB)
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 100 * 1024 * 1024;

const DEFAULT_MAX_ENTRIES: usize = 10_000;

// =============================================================================
// Cache Key
// =============================================================================

/// Which endpoint produced a cached tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    /// Native pyramid tile, `level` is the pyramid level
    Native,
    /// Deep Zoom tile, `level` is the DZI level
    Dzi,
    /// Thumbnail, `level` holds the requested max size
    Thumbnail,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileCacheKey {
    pub path: Arc<str>,
    pub kind: TileKind,
    pub level: u32,
    pub tile_x: u32,
    pub tile_y: u32,
    pub quality: u8,
}

impl TileCacheKey {
    pub fn new(
        path: impl Into<Arc<str>>,
        kind: TileKind,
        level: u32,
        tile_x: u32,
        tile_y: u32,
        quality: u8,
    ) -> Self {
        Self {
            path: path.into(),
            kind,
            level,
            tile_x,
            tile_y,
            quality,
        }
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

struct Inner {
    lru: LruCache<TileCacheKey, Bytes>,
    current_size: usize,
}

pub struct TileCache {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl Default for TileCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TILE_CACHE_CAPACITY)
    }
}

impl TileCache {
    /// Cache bounded to `max_size` bytes and the default entry limit.
    pub fn with_capacity(max_size: usize) -> Self {
        Self::with_capacity_and_entries(max_size, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::new(entries),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Look up a tile, marking it as recently used.
    pub async fn get(&self, key: &TileCacheKey) -> Option<Bytes> {
        self.inner.lock().await.lru.get(key).cloned()
    }

    /// Insert a tile, evicting least recently used entries while over capacity.
    ///
    /// A tile larger than the whole cache is not stored.
    pub async fn put(&self, key: TileCacheKey, data: Bytes) {
        if data.len() > self.max_size {
            return;
        }

        let mut inner = self.inner.lock().await;
        let added = data.len();
        if let Some((_, old)) = inner.lru.push(key, data) {
            // Either the same key was replaced or the entry limit evicted one.
            inner.current_size = inner.current_size.saturating_sub(old.len());
        }
        inner.current_size += added;

        while inner.current_size > self.max_size {
            match inner.lru.pop_lru() {
                Some((_, evicted)) => {
                    inner.current_size = inner.current_size.saturating_sub(evicted.len())
                }
                None => {
                    inner.current_size = 0;
                    break;
                }
            }
        }
    }

    /// Drop every cached tile of one image. Returns the number removed.
    pub async fn invalidate_path(&self, path: &str) -> usize {
        let mut inner = self.inner.lock().await;
        let keys: Vec<TileCacheKey> = inner
            .lru
            .iter()
            .filter(|(key, _)| &*key.path == path)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            if let Some(data) = inner.lru.pop(key) {
                inner.current_size = inner.current_size.saturating_sub(data.len());
            }
        }
        keys.len()
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.lru.clear();
        inner.current_size = 0;
    }

    /// Total bytes currently cached.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.current_size
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.lru.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }
}
