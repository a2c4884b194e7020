//! Router configuration for the image server.
//!
//! # Route Structure
//!
//! ```text
//! /health                                  - Health check
//! /info/{*path}                            - Image descriptor JSON
//! /dzi/{*path}                             - DZI descriptor and DZI tiles
//! /tiles/{*path}/{level}/{col}_{row}.jpg   - Native pyramid tiles
//! /files/{*path}                           - Raw bytes (GET, HEAD, Range)
//! /thumbnail/{*path}                       - Thumbnail JPEG
//! /cache/invalidate                        - Drop cached handles and tiles (POST)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use image_excluder::server::{create_router, RouterConfig};
//! use image_excluder::slide::{LocalSlideSource, SlideRegistry};
//! use image_excluder::tile::TileService;
//!
//! let registry = SlideRegistry::new(LocalSlideSource::new("/data/scans")?);
//! let tile_service = TileService::new(registry);
//!
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["http://localhost:8501".to_string()]);
//! let router = create_router(tile_service, config);
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:5000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use http::header::{
    HeaderName, ACCEPT_RANGES, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE,
};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    dzi_handler, files_handler, health_handler, info_handler, invalidate_handler,
    thumbnail_handler, tile_handler, AppState, DEFAULT_CACHE_MAX_AGE,
};
use super::range::DEFAULT_RANGE_CHUNK;
use crate::slide::SlideSource;
use crate::tile::TileService;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None = allow any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,

    /// Bytes returned by `/files` without a `Range` header
    pub range_chunk: u64,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterConfig {
    /// Any origin, 1 hour max-age, 1 MiB default chunk, tracing on.
    pub fn new() -> Self {
        Self {
            cors_origins: None,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            range_chunk: DEFAULT_RANGE_CHUNK,
            enable_tracing: true,
        }
    }

    /// Set specific allowed CORS origins.
    ///
    /// Pass an empty vec to disallow all cross-origin requests.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_range_chunk(mut self, bytes: u64) -> Self {
        self.range_chunk = bytes;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router over a tile service.
pub fn create_router<S>(tile_service: TileService<S>, config: RouterConfig) -> Router
where
    S: SlideSource + 'static,
{
    let state = AppState::new(tile_service)
        .with_cache_max_age(config.cache_max_age)
        .with_range_chunk(config.range_chunk);
    create_router_with_state(state, &config)
}

/// Create the application router over existing state.
pub fn create_router_with_state<S>(state: AppState<S>, config: &RouterConfig) -> Router
where
    S: SlideSource + 'static,
{
    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/info/{*path}", get(info_handler::<S>))
        .route("/dzi/{*path}", get(dzi_handler::<S>))
        .route("/tiles/{*path}", get(tile_handler::<S>))
        .route(
            "/files/{*path}",
            get(files_handler::<S>).head(files_handler::<S>),
        )
        .route("/thumbnail/{*path}", get(thumbnail_handler::<S>))
        .route("/cache/invalidate", post(invalidate_handler::<S>))
        .with_state(state)
        .layer(build_cors_layer(config));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::OPTIONS, Method::POST])
        .allow_headers([RANGE, CONTENT_TYPE, AUTHORIZATION])
        .expose_headers([
            CONTENT_RANGE,
            CONTENT_LENGTH,
            ACCEPT_RANGES,
            HeaderName::from_static("x-total-length"),
            HeaderName::from_static("x-tile-cache-hit"),
        ])
        .max_age(Duration::from_secs(86400));

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        // No origins allowed - this effectively disables CORS
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
