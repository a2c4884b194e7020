//! Test utilities for integration tests.
//!
//! Builds small pyramid TIFFs in memory, writes them into temporary
//! directories and drives the router without binding a socket.

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;

use image_excluder::server::{create_router, RouterConfig};
use image_excluder::slide::{LocalSlideSource, SlideRegistry};
use image_excluder::tile::TileService;

// =============================================================================
// Tile Pixels
// =============================================================================

/// Solid color of tile `(tx, ty)` on `level`. Every tile in a generated
/// pyramid is distinct so a misplaced tile is visible.
pub fn tile_color(level: usize, tx: u32, ty: u32) -> [u8; 3] {
    [
        (30 + level * 60).min(250) as u8,
        (30 + (tx * 40) % 200) as u8,
        (30 + (ty * 40) % 200) as u8,
    ]
}

/// Whether two colors are within `tolerance` on every channel.
pub fn color_close(actual: [u8; 3], expected: [u8; 3], tolerance: u8) -> bool {
    actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| a.abs_diff(*e) <= tolerance)
}

pub fn center_pixel(image: &RgbImage) -> [u8; 3] {
    image.get_pixel(image.width() / 2, image.height() / 2).0
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder.encode_image(image).unwrap();
    buf
}

pub fn decode_jpeg(data: &[u8]) -> RgbImage {
    image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .unwrap()
        .to_rgb8()
}

pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..2] == [0xFF, 0xD8] && data[data.len() - 2..] == [0xFF, 0xD9]
}

/// A PNG with a horizontal gradient.
pub fn create_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, _| Rgb([(x % 256) as u8, 128, 64]));
    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Split a baseline JPEG into a tables-only stream and an abbreviated stream
/// without DQT/DHT segments.
pub fn split_jpeg_tables(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut tables = vec![0xFF, 0xD8];
    let mut abbreviated = vec![0xFF, 0xD8];
    let mut pos = 2;
    while pos + 4 <= jpeg.len() {
        let marker = jpeg[pos + 1];
        if marker == 0xDA {
            abbreviated.extend_from_slice(&jpeg[pos..]);
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let segment = &jpeg[pos..pos + 2 + len];
        if marker == 0xDB || marker == 0xC4 {
            tables.extend_from_slice(segment);
        } else {
            abbreviated.extend_from_slice(segment);
        }
        pos += 2 + len;
    }
    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, abbreviated)
}

// =============================================================================
// Pyramid TIFF Builder
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileCodec {
    /// Uncompressed chunky RGB
    Raw,
    /// Complete JPEG stream per tile
    Jpeg,
    /// Abbreviated JPEG tiles with shared JPEGTables
    JpegWithTables,
}

enum TagValue {
    Numbers(u16, Vec<u64>),
    Ascii(String),
}

/// Builder for tiled pyramid TIFF files.
///
/// Level `i` is level 0 halved `i` times (rounded up). Tile `(tx, ty)` of
/// level `l` is filled with [`tile_color`].
pub struct PyramidTiffBuilder {
    width: u32,
    height: u32,
    levels: usize,
    tile_size: u32,
    byte_order: ByteOrderType,
    bigtiff: bool,
    codec: TileCodec,
    description: Option<String>,
    photometric: Option<u64>,
}

impl PyramidTiffBuilder {
    pub fn new(width: u32, height: u32, levels: usize, tile_size: u32) -> Self {
        Self {
            width,
            height,
            levels,
            tile_size,
            byte_order: ByteOrderType::LittleEndian,
            bigtiff: false,
            codec: TileCodec::Raw,
            description: None,
            photometric: None,
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrderType) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_bigtiff(mut self, bigtiff: bool) -> Self {
        self.bigtiff = bigtiff;
        self
    }

    pub fn with_codec(mut self, codec: TileCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Tag every level with this PhotometricInterpretation instead of the
    /// codec's natural one.
    pub fn with_photometric(mut self, photometric: u16) -> Self {
        self.photometric = Some(photometric as u64);
        self
    }

    /// Dimensions of `level`.
    pub fn level_dimensions(&self, level: usize) -> (u32, u32) {
        let factor = 1u32 << level;
        (self.width.div_ceil(factor), self.height.div_ceil(factor))
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self.byte_order {
            ByteOrderType::LittleEndian => out.extend_from_slice(b"II"),
            ByteOrderType::BigEndian => out.extend_from_slice(b"MM"),
        }
        let mut next_ptr_pos;
        if self.bigtiff {
            self.put(&mut out, 43, 2);
            self.put(&mut out, 8, 2);
            self.put(&mut out, 0, 2);
            next_ptr_pos = out.len();
            self.put(&mut out, 0, 8);
        } else {
            self.put(&mut out, 42, 2);
            next_ptr_pos = out.len();
            self.put(&mut out, 0, 4);
        }

        for level in 0..self.levels {
            next_ptr_pos = self.write_level(&mut out, level, next_ptr_pos);
        }
        out
    }

    fn offset_size(&self) -> usize {
        if self.bigtiff {
            8
        } else {
            4
        }
    }

    fn put(&self, out: &mut Vec<u8>, value: u64, size: usize) {
        let bytes = value.to_be_bytes();
        let be = &bytes[8 - size..];
        match self.byte_order {
            ByteOrderType::BigEndian => out.extend_from_slice(be),
            ByteOrderType::LittleEndian => out.extend(be.iter().rev()),
        }
    }

    fn patch(&self, out: &mut [u8], pos: usize, value: u64) {
        let mut bytes = Vec::new();
        self.put(&mut bytes, value, self.offset_size());
        out[pos..pos + bytes.len()].copy_from_slice(&bytes);
    }

    fn tile_image(&self, level: usize, tx: u32, ty: u32) -> RgbImage {
        RgbImage::from_pixel(self.tile_size, self.tile_size, Rgb(tile_color(level, tx, ty)))
    }

    /// Append one level's tiles, out-of-line values and IFD. Returns the
    /// position of the IFD's next pointer.
    fn write_level(&self, out: &mut Vec<u8>, level: usize, prev_next_ptr: usize) -> usize {
        let (width, height) = self.level_dimensions(level);
        let tiles_x = width.div_ceil(self.tile_size);
        let tiles_y = height.div_ceil(self.tile_size);

        let mut jpeg_tables = None;
        let mut offsets = Vec::new();
        let mut counts = Vec::new();
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let tile = self.tile_image(level, tx, ty);
                let data = match self.codec {
                    TileCodec::Raw => tile.into_raw(),
                    TileCodec::Jpeg => encode_jpeg(&tile, 95),
                    TileCodec::JpegWithTables => {
                        let (tables, abbreviated) = split_jpeg_tables(&encode_jpeg(&tile, 95));
                        jpeg_tables.get_or_insert(tables);
                        abbreviated
                    }
                };
                offsets.push(out.len() as u64);
                counts.push(data.len() as u64);
                out.extend_from_slice(&data);
            }
        }

        let long_type = if self.bigtiff { 16 } else { 4 };
        let (compression, photometric) = match self.codec {
            TileCodec::Raw => (1, 2),
            TileCodec::Jpeg | TileCodec::JpegWithTables => (7, 6),
        };
        let photometric = self.photometric.unwrap_or(photometric);
        let mut entries: Vec<(u16, TagValue)> = vec![
            (256, TagValue::Numbers(4, vec![width as u64])),
            (257, TagValue::Numbers(4, vec![height as u64])),
            (258, TagValue::Numbers(3, vec![8, 8, 8])),
            (259, TagValue::Numbers(3, vec![compression])),
            (262, TagValue::Numbers(3, vec![photometric])),
            (277, TagValue::Numbers(3, vec![3])),
            (284, TagValue::Numbers(3, vec![1])),
            (322, TagValue::Numbers(4, vec![self.tile_size as u64])),
            (323, TagValue::Numbers(4, vec![self.tile_size as u64])),
            (324, TagValue::Numbers(long_type, offsets)),
            (325, TagValue::Numbers(long_type, counts)),
        ];
        if level == 0 {
            if let Some(description) = &self.description {
                entries.push((270, TagValue::Ascii(description.clone())));
            }
        }
        if let Some(tables) = jpeg_tables {
            entries.push((347, TagValue::Numbers(7, tables.into_iter().map(u64::from).collect())));
        }
        entries.sort_by_key(|(tag, _)| *tag);

        // Encode values; anything too large for the entry goes before the IFD.
        let inline = self.offset_size();
        let mut encoded = Vec::with_capacity(entries.len());
        for (tag, value) in &entries {
            let (field_type, count, bytes) = match value {
                TagValue::Numbers(field_type, values) => {
                    let size = match field_type {
                        3 => 2,
                        4 => 4,
                        16 => 8,
                        _ => 1,
                    };
                    let mut bytes = Vec::new();
                    for v in values {
                        self.put(&mut bytes, *v, size);
                    }
                    (*field_type, values.len() as u64, bytes)
                }
                TagValue::Ascii(text) => {
                    let mut bytes = text.as_bytes().to_vec();
                    bytes.push(0);
                    (2u16, bytes.len() as u64, bytes)
                }
            };
            let location = if bytes.len() > inline {
                if out.len() % 2 == 1 {
                    out.push(0);
                }
                let pos = out.len() as u64;
                out.extend_from_slice(&bytes);
                Err(pos)
            } else {
                Ok(bytes)
            };
            encoded.push((*tag, field_type, count, location));
        }

        if out.len() % 2 == 1 {
            out.push(0);
        }
        let ifd_pos = out.len() as u64;
        self.patch(out, prev_next_ptr, ifd_pos);

        self.put(out, encoded.len() as u64, if self.bigtiff { 8 } else { 2 });
        for (tag, field_type, count, location) in encoded {
            self.put(out, tag as u64, 2);
            self.put(out, field_type as u64, 2);
            self.put(out, count, if self.bigtiff { 8 } else { 4 });
            match location {
                Ok(mut bytes) => {
                    bytes.resize(inline, 0);
                    out.extend_from_slice(&bytes);
                }
                Err(pos) => self.put(out, pos, inline),
            }
        }
        let next_ptr = out.len();
        self.put(out, 0, inline);
        next_ptr
    }
}

/// The pyramid used by most tests: 1000x800, 4 levels, 256px tiles.
pub fn standard_pyramid() -> PyramidTiffBuilder {
    PyramidTiffBuilder::new(1000, 800, 4, 256)
}

// =============================================================================
// Test Root and Router
// =============================================================================

/// Temporary root directory served by a test router.
pub struct TestRoot {
    dir: TempDir,
}

impl TestRoot {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `data` to `name` (may contain subdirectories).
    pub fn write(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, data).unwrap();
        path
    }

    pub fn service(&self) -> TileService<LocalSlideSource> {
        let source = LocalSlideSource::new(self.dir.path()).unwrap();
        TileService::new(SlideRegistry::new(source))
    }

    pub fn router(&self) -> Router {
        self.router_with(RouterConfig::default())
    }

    pub fn router_with(&self, config: RouterConfig) -> Router {
        create_router(self.service(), config)
    }
}

impl Default for TestRoot {
    fn default() -> Self {
        Self::new()
    }
}

/// Response parts collected from a oneshot request.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .unwrap_or_else(|| panic!("missing header {}", name))
            .to_str()
            .unwrap()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

pub async fn send(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(router: Router, uri: &str) -> TestResponse {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

pub async fn get_with_range(router: Router, uri: &str, range: &str) -> TestResponse {
    let request = Request::builder()
        .uri(uri)
        .header("range", range)
        .body(Body::empty())
        .unwrap();
    send(router, request).await
}
