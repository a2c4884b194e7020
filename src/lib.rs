//! # Image Excluder
//!
//! A tile server for very large pyramid TIFF images on local disk, plus the
//! session model of a review tool that marks images for exclusion.
//!
//! Images are never loaded whole. Tiled TIFF and BigTIFF pyramids are read
//! tile by tile with positional reads; smaller PNG, JPEG and strip TIFF files
//! are decoded once and served as a single-level image.
//!
//! ## Features
//!
//! - **Deep Zoom**: DZI descriptors and tiles for OpenSeadragon-style viewers
//! - **Native tiles**: pyramid tiles addressed by level, column and row
//! - **Byte ranges**: raw file bytes with `Range` support for client-side readers
//! - **Caching**: one open handle per file and an LRU of encoded JPEG tiles
//! - **Review sessions**: paging, exclusions with reasons, JSON backups, CSV export
//!
//! ## Architecture
//!
//! - [`io`] - Positional range reads from local files
//! - [`mod@format`] - TIFF parsing, JPEG table handling, flat-image fallback
//! - [`slide`] - Image handles and the registry that caches them
//! - [`tile`] - Tile extraction, JPEG encoding and the tile cache
//! - [`server`] - Axum routes, handlers and range responses
//! - [`session`] - Review session state
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use image_excluder::{create_router, LocalSlideSource, RouterConfig, SlideRegistry, TileService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = LocalSlideSource::new("/data/slides").unwrap();
//!     let service = TileService::new(SlideRegistry::new(source));
//!     let router = create_router(service, RouterConfig::default());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod server;
pub mod session;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use config::{Cli, Command, InspectConfig, ReviewAction, ReviewConfig, ServeConfig};
pub use error::{FormatError, IoError, RangeError, SessionError, TiffError, TileError};
pub use format::tiff::{ByteOrder, Compression, PyramidLevel, TiffHeader, TiffPyramid, TiffTag};
pub use format::{detect_kind, is_tiff_header, FlatImage, ImageKind, PyramidTiffReader};
pub use io::{LocalFileReader, RangeReader};
pub use server::{
    create_router, create_router_with_state, AppState, ErrorResponse, InfoResponse, RouterConfig,
};
pub use session::{
    BackupStore, DescriptorOutcome, ExclusionMap, ReviewOptions, ReviewSession, ViewerMode,
    ViewerUrls,
};
pub use slide::{
    CachedSlide, LevelInfo, LocalSlideSource, SlideReader, SlideRegistry, SlideSource,
};
pub use tile::{
    TileCache, TileCacheKey, TileRequest, TileResponse, TileService, TileServiceOptions,
    DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY,
};
