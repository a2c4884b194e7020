//! HTTP request handlers for the image server.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /info/{*path}` - Image descriptor JSON
//! - `GET /dzi/{*path}` - DZI descriptor, or a DZI tile for `..._files/{level}/{x}_{y}.jpg`
//! - `GET /tiles/{*path}/{level}/{col}_{row}.jpg` - Native pyramid tile
//! - `GET|HEAD /files/{*path}` - Raw file bytes with `Range` support
//! - `GET /thumbnail/{*path}` - Thumbnail JPEG
//! - `POST /cache/invalidate` - Drop cached handles and tiles

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{IoError, RangeError, TileError};
use crate::io::RangeReader;
use crate::slide::{CachedSlide, SlideReader, SlideSource};
use crate::tile::dzi::{calculate_max_dzi_level, generate_dzi_xml, parse_dzi_path, DziPath};
use crate::tile::{TileRequest, TileService, DEFAULT_THUMBNAIL_SIZE};

use super::range::{
    content_type_for, default_range, parse_range_header, stream_range, DEFAULT_RANGE_CHUNK,
    STREAM_BUFFER_SIZE,
};

/// Default `Cache-Control` max-age in seconds.
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S: SlideSource> {
    pub tile_service: Arc<TileService<S>>,

    /// `Cache-Control` max-age for tiles, descriptors and file bytes
    pub cache_max_age: u32,

    /// Bytes served by `/files` when no `Range` header is sent
    pub range_chunk: u64,
}

impl<S: SlideSource> AppState<S> {
    pub fn new(tile_service: TileService<S>) -> Self {
        Self::from_shared(Arc::new(tile_service))
    }

    /// State over a tile service that is also used elsewhere.
    pub fn from_shared(tile_service: Arc<TileService<S>>) -> Self {
        Self {
            tile_service,
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            range_chunk: DEFAULT_RANGE_CHUNK,
        }
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    pub fn with_range_chunk(mut self, range_chunk: u64) -> Self {
        self.range_chunk = range_chunk.max(1);
        self
    }

    fn cache_control(&self) -> String {
        format!("public, max-age={}", self.cache_max_age)
    }
}

impl<S: SlideSource> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
            range_chunk: self.range_chunk,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for tile requests.
#[derive(Debug, Default, Deserialize)]
pub struct TileQueryParams {
    /// JPEG quality 1-100; the service default when absent
    #[serde(default)]
    pub quality: Option<u8>,
}

/// Query parameters for thumbnail requests.
#[derive(Debug, Deserialize)]
pub struct ThumbnailQueryParams {
    /// Longest side of the thumbnail (clamped to 64..=2048)
    #[serde(default = "default_thumbnail_size")]
    pub max_size: u32,

    #[serde(default)]
    pub quality: Option<u8>,
}

fn default_thumbnail_size() -> u32 {
    DEFAULT_THUMBNAIL_SIZE
}

/// Query parameters for cache invalidation.
#[derive(Debug, Default, Deserialize)]
pub struct InvalidateQueryParams {
    /// Image to invalidate; everything when absent
    #[serde(default)]
    pub path: Option<String>,
}

/// Split a native tile path `"{image}/{level}/{col}_{row}.jpg"`.
///
/// Returns `(image, level, col, row)`.
pub fn parse_tile_path(path: &str) -> Option<(&str, usize, u32, u32)> {
    let (rest, file) = path.rsplit_once('/')?;
    let (image, level) = rest.rsplit_once('/')?;
    if image.is_empty() {
        return None;
    }
    let name = file
        .strip_suffix(".jpg")
        .or_else(|| file.strip_suffix(".jpeg"))
        .unwrap_or(file);
    let (col, row) = name.split_once('_')?;
    Some((image, level.parse().ok()?, col.parse().ok()?, row.parse().ok()?))
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error body returned for every error condition.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable kind, e.g. `not_found` or `out_of_range`
    pub error_kind: String,

    pub message: String,

    /// HTTP status code, repeated for clients that only see the body
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(error_kind: impl Into<String>, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            error_kind: error_kind.into(),
            message: message.into(),
            status: status.as_u16(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Metadata for a single level.
#[derive(Debug, Serialize)]
pub struct LevelMetadataResponse {
    /// 0 = full resolution
    pub level: usize,
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_x: u32,
    pub tiles_y: u32,
    pub downsample: f64,

    /// Stored codec, absent for flat images
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits_per_sample: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub samples_per_pixel: Option<u16>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub photometric: Option<u16>,
}

/// DZI-style image block, with string values as deep-zoom viewers expect.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DziImageInfo {
    pub format: String,
    pub overlap: String,
    pub tile_size: String,
    pub size: DziSizeInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DziSizeInfo {
    pub width: String,
    pub height: String,
}

impl DziImageInfo {
    pub fn new(width: u32, height: u32, tile_size: u32) -> Self {
        Self {
            format: "jpg".to_string(),
            overlap: "0".to_string(),
            tile_size: tile_size.to_string(),
            size: DziSizeInfo {
                width: width.to_string(),
                height: height.to_string(),
            },
        }
    }
}

/// Response from the descriptor endpoint.
#[derive(Debug, Serialize)]
pub struct InfoResponse {
    /// Path as requested
    pub path: String,

    /// `pyramid_tiff` or `flat_<kind>`
    pub format: String,

    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub level_count: usize,
    pub levels: Vec<LevelMetadataResponse>,

    /// Number of Deep Zoom levels (`max_level + 1`)
    pub dzi_levels: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "Image")]
    pub image: DziImageInfo,
}

impl InfoResponse {
    /// Describe an opened image. `path` is echoed back as given.
    pub fn from_slide<R: RangeReader + 'static>(
        path: String,
        slide: &CachedSlide<R>,
        dzi_tile_size: u32,
    ) -> Self {
        let (width, height) = slide.dimensions();

        let levels = (0..slide.level_count())
            .filter_map(|level| {
                let info = slide.level_info(level)?;
                let stored = slide
                    .pyramid()
                    .and_then(|p| p.pyramid().get_level(level));
                Some(LevelMetadataResponse {
                    level,
                    width: info.width,
                    height: info.height,
                    tile_width: info.tile_width,
                    tile_height: info.tile_height,
                    tiles_x: info.tiles_x,
                    tiles_y: info.tiles_y,
                    downsample: info.downsample,
                    compression: stored.map(|l| l.compression.name().to_string()),
                    bits_per_sample: stored.map(|l| l.layout.bits_per_sample),
                    samples_per_pixel: stored.map(|l| l.layout.samples_per_pixel),
                    photometric: stored.map(|l| l.layout.photometric),
                })
            })
            .collect();

        InfoResponse {
            format: slide.format_name(),
            width,
            height,
            file_size: slide.size(),
            level_count: slide.level_count(),
            levels,
            dzi_levels: calculate_max_dzi_level(width, height) + 1,
            description: slide
                .pyramid()
                .and_then(|p| p.description())
                .map(str::to_string),
            image: DziImageInfo::new(width, height, dzi_tile_size),
            path,
        }
    }
}

/// Response from the cache invalidation endpoint.
#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Image handles dropped
    pub handles: usize,

    /// Encoded tiles dropped
    pub tiles: usize,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Build a JSON error response, logging by class: 5xx at ERROR, 404 at DEBUG,
/// other 4xx at WARN.
fn error_response(status: StatusCode, error_kind: &'static str, message: String) -> Response {
    if status.is_server_error() {
        error!(
            error_kind,
            status = status.as_u16(),
            "Server error: {}",
            message
        );
    } else if status == StatusCode::NOT_FOUND {
        debug!(
            error_kind,
            status = status.as_u16(),
            "Resource not found: {}",
            message
        );
    } else {
        warn!(
            error_kind,
            status = status.as_u16(),
            "Client error: {}",
            message
        );
    }

    let body = ErrorResponse::new(error_kind, message, status);
    (status, Json(body)).into_response()
}

fn io_error_parts(err: &IoError) -> (StatusCode, &'static str, String) {
    match err {
        IoError::NotFound(path) => (
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Image not found: {}", path),
        ),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "io_error",
            format!("I/O error: {}", err),
        ),
    }
}

impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_kind, message) = match &self {
            TileError::NotFound { path } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Image not found: {}", path),
            ),

            TileError::InvalidLevel { level, level_count } => (
                StatusCode::BAD_REQUEST,
                "out_of_range",
                format!(
                    "Invalid level: {} (image has {} levels, valid range: 0-{})",
                    level,
                    level_count,
                    level_count.saturating_sub(1)
                ),
            ),

            TileError::TileOutOfBounds {
                level,
                x,
                y,
                max_x,
                max_y,
            } => (
                StatusCode::BAD_REQUEST,
                "out_of_range",
                format!(
                    "Tile ({}, {}) at level {} is out of bounds (max: {}, {})",
                    x,
                    y,
                    level,
                    max_x.saturating_sub(1),
                    max_y.saturating_sub(1)
                ),
            ),

            TileError::InvalidQuality { quality } => (
                StatusCode::BAD_REQUEST,
                "invalid_quality",
                format!("Invalid quality: {} (must be 1-100)", quality),
            ),

            TileError::UnsupportedFormat { reason } => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_format",
                format!("Unsupported format: {}", reason),
            ),

            TileError::Slide(tiff_err) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "unsupported_format",
                tiff_err.to_string(),
            ),

            TileError::Io(io_err) => io_error_parts(io_err),

            TileError::DecodeError { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "decode_error",
                format!("Failed to decode tile: {}", message),
            ),

            TileError::EncodeError { message } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "encode_error",
                format!("Failed to encode tile: {}", message),
            ),
        };

        error_response(status, error_kind, message)
    }
}

impl IntoResponse for RangeError {
    fn into_response(self) -> Response {
        match &self {
            RangeError::Invalid { header } => error_response(
                StatusCode::BAD_REQUEST,
                "invalid_range",
                format!("Invalid Range header: {}", header),
            ),
            RangeError::NotSatisfiable { size } => {
                let mut response = error_response(
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    "range_not_satisfiable",
                    format!("Range not satisfiable for {} bytes", size),
                );
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
                response
            }
            RangeError::Io(io_err) => {
                let (status, error_kind, message) = io_error_parts(io_err);
                error_response(status, error_kind, message)
            }
        }
    }
}

/// Any error a handler can return.
#[derive(Debug)]
pub enum ApiError {
    Tile(TileError),
    Range(RangeError),

    /// Path that does not match the route's shape (HTTP 400)
    InvalidPath(String),

    /// Response could not be assembled (HTTP 500)
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Tile(err) => err.into_response(),
            ApiError::Range(err) => err.into_response(),
            ApiError::InvalidPath(path) => error_response(
                StatusCode::BAD_REQUEST,
                "invalid_path",
                format!("Invalid request path: {}", path),
            ),
            ApiError::Internal(message) => {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "io_error", message)
            }
        }
    }
}

impl From<TileError> for ApiError {
    fn from(err: TileError) -> Self {
        ApiError::Tile(err)
    }
}

impl From<RangeError> for ApiError {
    fn from(err: RangeError) -> Self {
        ApiError::Range(err)
    }
}

impl From<IoError> for ApiError {
    fn from(err: IoError) -> Self {
        ApiError::Range(RangeError::Io(err))
    }
}

impl From<http::Error> for ApiError {
    fn from(err: http::Error) -> Self {
        ApiError::Internal(format!("failed to build response: {}", err))
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /health`
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /info/{*path}`
///
/// Descriptor of an image: format, dimensions, level table and a DZI-style
/// `Image` block. The viewer falls back to a thumbnail when this endpoint
/// returns an error.
pub async fn info_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
) -> Result<Json<InfoResponse>, ApiError> {
    let slide = state.tile_service.descriptor(&path).await?;
    Ok(Json(InfoResponse::from_slide(
        path,
        slide.as_ref(),
        state.tile_service.dzi_tile_size(),
    )))
}

/// `GET /dzi/{*path}`
///
/// `{image}` or `{image}.dzi` returns the XML descriptor;
/// `{image}_files/{level}/{x}_{y}.jpg` returns a DZI tile.
pub async fn dzi_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
    Query(query): Query<TileQueryParams>,
) -> Result<Response, ApiError> {
    let target = parse_dzi_path(&path).ok_or_else(|| ApiError::InvalidPath(path.clone()))?;

    match target {
        DziPath::Descriptor { image } => {
            let slide = state.tile_service.descriptor(image).await?;
            let (width, height) = slide.dimensions();
            let xml = generate_dzi_xml(width, height, state.tile_service.dzi_tile_size());

            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/xml")
                .header(header::CACHE_CONTROL, state.cache_control())
                .body(Body::from(xml))?)
        }
        DziPath::Tile { image, level, x, y } => {
            let quality = query
                .quality
                .unwrap_or_else(|| state.tile_service.default_quality());
            let request = TileRequest::with_quality(image, level, x, y, quality);
            let response = state.tile_service.get_dzi_tile(request).await?;
            jpeg_response(&state, response.data, response.cache_hit, response.quality)
        }
    }
}

/// `GET /tiles/{*path}/{level}/{col}_{row}.jpg`
///
/// A stored pyramid tile, decoded and re-encoded as JPEG. Edge tiles are cropped
/// to the image bounds.
pub async fn tile_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
    Query(query): Query<TileQueryParams>,
) -> Result<Response, ApiError> {
    let (image, level, col, row) =
        parse_tile_path(&path).ok_or_else(|| ApiError::InvalidPath(path.clone()))?;
    let quality = query
        .quality
        .unwrap_or_else(|| state.tile_service.default_quality());

    let request = TileRequest::with_quality(image, level, col, row, quality);
    let response = state.tile_service.get_tile(request).await?;
    jpeg_response(&state, response.data, response.cache_hit, response.quality)
}

/// `GET /thumbnail/{*path}?max_size=&quality=`
pub async fn thumbnail_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
    Query(query): Query<ThumbnailQueryParams>,
) -> Result<Response, ApiError> {
    let requested_size = query.max_size;
    let quality = query
        .quality
        .unwrap_or_else(|| state.tile_service.default_quality());

    let response = state
        .tile_service
        .generate_thumbnail(&path, requested_size, quality)
        .await?;

    let mut http_response =
        jpeg_response(&state, response.data, response.cache_hit, response.quality)?;
    let actual_size = requested_size.clamp(
        crate::tile::MIN_THUMBNAIL_SIZE,
        crate::tile::MAX_THUMBNAIL_SIZE,
    );
    if actual_size != requested_size {
        let headers = http_response.headers_mut();
        headers.insert("X-Thumbnail-Size-Clamped", HeaderValue::from_static("true"));
        headers.insert("X-Thumbnail-Actual-Size", HeaderValue::from(actual_size));
    }
    Ok(http_response)
}

/// `GET|HEAD /files/{*path}`
///
/// Literal file bytes. With a `Range` header: 206 with the requested span,
/// 416 when it starts past EOF, 400 when malformed. An open-ended range is
/// capped at one chunk. Without a header: 200 with the whole file, or its first
/// chunk for large files. `X-Total-Length` always carries the file size.
pub async fn files_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    method: Method,
    headers: HeaderMap,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let reader = state
        .tile_service
        .registry()
        .raw_reader(&path)
        .await
        .map_err(RangeError::from)?;
    let size = reader.size();

    let (status, range) = match headers.get(header::RANGE) {
        Some(value) => {
            let value = value.to_str().map_err(|_| RangeError::Invalid {
                header: String::from_utf8_lossy(value.as_bytes()).into_owned(),
            })?;
            (
                StatusCode::PARTIAL_CONTENT,
                parse_range_header(value, size, state.range_chunk)?,
            )
        }
        None => (StatusCode::OK, default_range(size, state.range_chunk)),
    };

    debug!(
        path = %path,
        start = range.start,
        len = range.len,
        size,
        status = status.as_u16(),
        "Serving file bytes"
    );

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, content_type_for(&path))
        .header(header::CONTENT_LENGTH, range.len.to_string())
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, state.cache_control())
        .header("X-Total-Length", size.to_string());
    if status == StatusCode::PARTIAL_CONTENT {
        builder = builder.header(header::CONTENT_RANGE, range.content_range(size));
    }

    let body = if method == Method::HEAD || range.len == 0 {
        Body::empty()
    } else {
        Body::from_stream(stream_range(reader, range, STREAM_BUFFER_SIZE))
    };
    Ok(builder.body(body)?)
}

/// `POST /cache/invalidate[?path=]`
pub async fn invalidate_handler<S: SlideSource>(
    State(state): State<AppState<S>>,
    Query(query): Query<InvalidateQueryParams>,
) -> Json<InvalidateResponse> {
    let report = state.tile_service.invalidate(query.path.as_deref()).await;
    Json(InvalidateResponse {
        path: query.path,
        handles: report.handles,
        tiles: report.tiles,
    })
}

fn jpeg_response<S: SlideSource>(
    state: &AppState<S>,
    data: bytes::Bytes,
    cache_hit: bool,
    quality: u8,
) -> Result<Response, ApiError> {
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CACHE_CONTROL, state.cache_control())
        .header("X-Tile-Cache-Hit", cache_hit.to_string())
        .header("X-Tile-Quality", quality.to_string())
        .body(Body::from(data))?)
}

// =============================================================================
// Tests
// =============================================================================
