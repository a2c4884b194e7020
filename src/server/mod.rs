//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │   /info  /dzi  /tiles  /thumbnail  /files  /cache/invalidate    │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    range    │  │        routes           │  │
//! │  │ (requests)  │  │ (raw bytes) │  │  (router, CORS, trace)  │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod range;
pub mod routes;

pub use handlers::{
    dzi_handler, files_handler, health_handler, info_handler, invalidate_handler,
    parse_tile_path, thumbnail_handler, tile_handler, ApiError, AppState, DziImageInfo,
    ErrorResponse, HealthResponse, InfoResponse, InvalidateResponse, LevelMetadataResponse,
    DEFAULT_CACHE_MAX_AGE,
};
pub use range::{
    clamp_range, content_type_for, default_range, parse_range_header, stream_range, ByteRange,
    DEFAULT_RANGE_CHUNK, STREAM_BUFFER_SIZE,
};
pub use routes::{create_router, create_router_with_state, RouterConfig};
