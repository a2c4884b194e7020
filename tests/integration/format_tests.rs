//! Format-specific integration tests.
//!
//! Tests verify:
//! - TIFF parser handles little-endian and big-endian files
//! - BigTIFF files are parsed correctly
//! - JPEG tiles, with and without shared JPEGTables, decode to the right pixels
//! - Strip TIFF, PNG and JPEG files fall back to a single flat level

use axum::http::StatusCode;
use image::{ImageFormat, Rgb, RgbImage};

use image_excluder::format::{detect_kind_from_bytes, ImageKind};

use super::test_utils::{
    center_pixel, color_close, decode_jpeg, encode_jpeg, get, is_valid_jpeg, standard_pyramid,
    tile_color, ByteOrderType, PyramidTiffBuilder, TestRoot, TileCodec,
};

/// Serve `tiff` as `name` and check its descriptor and one tile per level.
async fn assert_pyramid_serves(name: &str, builder: &PyramidTiffBuilder, tolerance: u8) {
    let root = TestRoot::new();
    root.write(name, &builder.build());
    let router = root.router();

    let response = get(router.clone(), &format!("/info/{}", name)).await;
    assert_eq!(response.status, StatusCode::OK, "{}", name);
    let info = response.json();
    assert_eq!(info["format"], "pyramid_tiff");
    assert_eq!(info["level_count"], 4);

    for level in 0..4 {
        let response = get(router.clone(), &format!("/tiles/{}/{}/0_0.jpg", name, level)).await;
        assert_eq!(response.status, StatusCode::OK, "{} level {}", name, level);
        assert!(is_valid_jpeg(&response.body));

        let tile = decode_jpeg(&response.body);
        let (width, height) = builder.level_dimensions(level);
        assert_eq!(tile.dimensions(), (width.min(256), height.min(256)));
        assert!(
            color_close(center_pixel(&tile), tile_color(level, 0, 0), tolerance),
            "{} level {}: {:?}",
            name,
            level,
            center_pixel(&tile)
        );
    }
}

// =============================================================================
// Byte Order and BigTIFF
// =============================================================================

#[tokio::test]
async fn test_little_endian_tiff() {
    let builder = standard_pyramid().with_byte_order(ByteOrderType::LittleEndian);
    let data = builder.build();
    assert_eq!(&data[..2], b"II");
    assert_eq!(detect_kind_from_bytes(&data), ImageKind::Tiff);

    assert_pyramid_serves("le.tif", &builder, 10).await;
}

#[tokio::test]
async fn test_big_endian_tiff() {
    let builder = standard_pyramid().with_byte_order(ByteOrderType::BigEndian);
    let data = builder.build();
    assert_eq!(&data[..2], b"MM");

    assert_pyramid_serves("be.tif", &builder, 10).await;
}

#[tokio::test]
async fn test_bigtiff() {
    let builder = standard_pyramid().with_bigtiff(true);
    let data = builder.build();
    assert_eq!(detect_kind_from_bytes(&data), ImageKind::BigTiff);

    assert_pyramid_serves("big.tif", &builder, 10).await;
}

#[tokio::test]
async fn test_big_endian_bigtiff() {
    let builder = standard_pyramid()
        .with_bigtiff(true)
        .with_byte_order(ByteOrderType::BigEndian);

    assert_pyramid_serves("big_be.tif", &builder, 10).await;
}

// =============================================================================
// JPEG Tiles
// =============================================================================

#[tokio::test]
async fn test_jpeg_tiles() {
    let builder = standard_pyramid().with_codec(TileCodec::Jpeg);
    assert_pyramid_serves("jpeg.tif", &builder, 12).await;

    let root = TestRoot::new();
    root.write("jpeg.tif", &builder.build());
    let response = get(root.router(), "/info/jpeg.tif").await;
    assert_eq!(response.json()["levels"][0]["compression"], "JPEG");
}

#[tokio::test]
async fn test_jpeg_tiles_with_shared_tables() {
    let builder = standard_pyramid().with_codec(TileCodec::JpegWithTables);
    assert_pyramid_serves("tables.tif", &builder, 12).await;
}

#[tokio::test]
async fn test_jpeg_tables_in_bigtiff() {
    let builder = standard_pyramid()
        .with_bigtiff(true)
        .with_codec(TileCodec::JpegWithTables);
    assert_pyramid_serves("tables_big.tif", &builder, 12).await;
}

#[tokio::test]
async fn test_rgb_tagged_jpeg_tiles_are_not_served_as_pyramid() {
    let builder = standard_pyramid()
        .with_codec(TileCodec::Jpeg)
        .with_photometric(2);
    let root = TestRoot::new();
    root.write("rgb_jpeg.tif", &builder.build());

    let response = get(root.router(), "/info/rgb_jpeg.tif").await;
    if response.status == StatusCode::OK {
        assert_eq!(response.json()["format"], "flat_tiff");
    } else {
        assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}

// =============================================================================
// Flat Fallback
// =============================================================================

#[tokio::test]
async fn test_strip_tiff_falls_back_to_flat() {
    let image = RgbImage::from_pixel(120, 90, Rgb([200, 40, 40]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Tiff).unwrap();

    let root = TestRoot::new();
    root.write("strips.tif", &buf.into_inner());

    let response = get(root.router(), "/info/strips.tif").await;
    assert_eq!(response.status, StatusCode::OK);
    let info = response.json();
    assert_eq!(info["format"], "flat_tiff");
    assert_eq!(info["level_count"], 1);
    assert_eq!(info["width"], 120);

    let response = get(root.router(), "/tiles/strips.tif/0/0_0.jpg").await;
    assert_eq!(response.status, StatusCode::OK);
    let tile = decode_jpeg(&response.body);
    assert_eq!(tile.dimensions(), (120, 90));
    assert!(color_close(center_pixel(&tile), [200, 40, 40], 10));
}

#[tokio::test]
async fn test_plain_jpeg_is_flat() {
    let image = RgbImage::from_pixel(64, 48, Rgb([20, 120, 220]));
    let root = TestRoot::new();
    root.write("photo.jpg", &encode_jpeg(&image, 95));

    let response = get(root.router(), "/info/photo.jpg").await;
    assert_eq!(response.status, StatusCode::OK);
    let info = response.json();
    assert_eq!(info["format"], "flat_jpeg");
    assert_eq!(info["level_count"], 1);
    assert_eq!(info["height"], 48);

    let response = get(root.router(), "/tiles/photo.jpg/1/0_0.jpg").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_truncated_tiff_is_rejected() {
    let data = standard_pyramid().build();
    let root = TestRoot::new();
    root.write("cut.tif", &data[..6]);

    let response = get(root.router(), "/info/cut.tif").await;
    assert!(response.status.is_client_error() || response.status.is_server_error());
    assert_ne!(response.status, StatusCode::OK);
    assert_ne!(response.status, StatusCode::NOT_FOUND);
}
