//! Tile service layer.
//!
//! Generates and caches the JPEG tiles the viewer asks for.
//!
//! # Architecture
//!
//! The tile service sits between the HTTP layer and the image abstraction:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  JPEG Encoder   │  │
//! │  │  (encoded    │  │  (decode →      │  │
//! │  │   JPEGs)     │  │   encode)       │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            SlideRegistry                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: native tiles, DZI tiles, thumbnails and invalidation
//! - [`TileCache`]: LRU cache for encoded JPEG tiles with size-based eviction
//! - [`TileCacheKey`]: path, tile kind, coordinates and quality
//! - [`JpegTileEncoder`]: encodes decoded tiles at the requested quality
//! - [`dzi`]: Deep Zoom level math and descriptor XML
//!
//! # Example
//!
//! ```
//! use image_excluder::tile::{TileCache, TileCacheKey, TileKind};
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = TileCache::with_capacity(50 * 1024 * 1024);
//!     let key = TileCacheKey::new("case/scan.tif", TileKind::Native, 0, 1, 2, 85);
//!
//!     if cache.get(&key).await.is_none() {
//!         cache.put(key.clone(), Bytes::from_static(b"jpeg")).await;
//!     }
//!     assert_eq!(cache.len().await, 1);
//! }
//! ```

mod cache;
pub mod dzi;
mod encoder;
mod service;

pub use cache::{TileCache, TileCacheKey, TileKind, DEFAULT_TILE_CACHE_CAPACITY};
pub use encoder::{
    clamp_quality, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use service::{
    Invalidation, TileRequest, TileResponse, TileService, TileServiceOptions,
    DEFAULT_DECODED_CAPACITY, DEFAULT_THUMBNAIL_SIZE, MAX_THUMBNAIL_SIZE, MIN_THUMBNAIL_SIZE,
};
