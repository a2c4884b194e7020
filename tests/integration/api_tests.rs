//! API integration tests for descriptors, tiles and error handling.
//!
//! Tests verify:
//! - Descriptor JSON and DZI XML for pyramid and flat images
//! - Native and DZI tiles carry the pixels of the right pyramid tile
//! - Error cases (missing file, out-of-range level, path escaping the root)
//! - HTTP response codes and headers

use axum::body::Body;
use axum::http::{Request, StatusCode};

use image_excluder::server::RouterConfig;

use super::test_utils::{
    center_pixel, color_close, create_png, decode_jpeg, get, is_valid_jpeg, send,
    standard_pyramid, tile_color, TestRoot,
};

fn pyramid_root() -> TestRoot {
    let root = TestRoot::new();
    root.write(
        "scan.tif",
        &standard_pyramid().with_description("test pyramid").build(),
    );
    root
}

// =============================================================================
// Health and Descriptor
// =============================================================================

#[tokio::test]
async fn test_health() {
    let root = TestRoot::new();
    let response = get(root.router(), "/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["status"], "healthy");
}

#[tokio::test]
async fn test_info_for_pyramid() {
    let root = pyramid_root();
    let response = get(root.router(), "/info/scan.tif").await;

    assert_eq!(response.status, StatusCode::OK);
    let info = response.json();
    assert_eq!(info["format"], "pyramid_tiff");
    assert_eq!(info["width"], 1000);
    assert_eq!(info["height"], 800);
    assert_eq!(info["level_count"], 4);
    assert_eq!(info["dzi_levels"], 11);
    assert_eq!(info["description"], "test pyramid");

    let levels = info["levels"].as_array().unwrap();
    assert_eq!(levels.len(), 4);
    assert_eq!(levels[2]["width"], 250);
    assert_eq!(levels[2]["height"], 200);
    assert_eq!(levels[2]["downsample"], 4.0);
    assert_eq!(levels[0]["tiles_x"], 4);
    assert_eq!(levels[0]["compression"], "None");

    // DZI style block with string values
    assert_eq!(info["Image"]["Format"], "jpg");
    assert_eq!(info["Image"]["Overlap"], "0");
    assert_eq!(info["Image"]["TileSize"], "256");
    assert_eq!(info["Image"]["Size"]["Width"], "1000");
    assert_eq!(info["Image"]["Size"]["Height"], "800");
}

#[tokio::test]
async fn test_info_for_flat_image_has_one_level() {
    let root = TestRoot::new();
    root.write("photo.png", &create_png(300, 200));

    let response = get(root.router(), "/info/photo.png").await;
    assert_eq!(response.status, StatusCode::OK);

    let info = response.json();
    assert_eq!(info["format"], "flat_png");
    assert_eq!(info["level_count"], 1);
    assert_eq!(info["levels"][0]["width"], 300);
    assert_eq!(info["levels"][0]["height"], 200);
    assert!(info["levels"][0].get("compression").is_none());
}

#[tokio::test]
async fn test_info_nested_and_slash_encoded_paths() {
    let root = TestRoot::new();
    let file = root.write("case/a/scan.tif", &standard_pyramid().build());

    let response = get(root.router(), "/info/case/a/scan.tif").await;
    assert_eq!(response.status, StatusCode::OK);

    // Absolute path inside the root, flattened the way the review UI does it
    let absolute = std::fs::canonicalize(&file).unwrap();
    let encoded = absolute.to_string_lossy().replace('/', "__SLASH__");
    let response = get(root.router(), &format!("/info/{}", encoded)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["width"], 1000);
}

#[tokio::test]
async fn test_dzi_descriptor_xml() {
    let root = pyramid_root();

    for uri in ["/dzi/scan.tif", "/dzi/scan.tif.dzi"] {
        let response = get(root.router(), uri).await;
        assert_eq!(response.status, StatusCode::OK, "{}", uri);
        assert!(response.header("content-type").contains("xml"));

        let xml = String::from_utf8(response.body.to_vec()).unwrap();
        assert!(xml.contains(r#"TileSize="256""#));
        assert!(xml.contains(r#"Width="1000""#));
        assert!(xml.contains(r#"Height="800""#));
    }
}

// =============================================================================
// Tiles
// =============================================================================

#[tokio::test]
async fn test_native_tile() {
    let root = pyramid_root();
    let response = get(root.router(), "/tiles/scan.tif/0/1_2.jpg").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-type"), "image/jpeg");
    assert!(response.headers.contains_key("cache-control"));
    assert_eq!(response.header("x-tile-cache-hit"), "false");
    assert!(is_valid_jpeg(&response.body));

    let tile = decode_jpeg(&response.body);
    assert_eq!(tile.dimensions(), (256, 256));
    assert!(color_close(center_pixel(&tile), tile_color(0, 1, 2), 10));
}

#[tokio::test]
async fn test_native_tile_edge_is_cropped() {
    let root = pyramid_root();
    let response = get(root.router(), "/tiles/scan.tif/0/3_3.jpg").await;

    assert_eq!(response.status, StatusCode::OK);
    let tile = decode_jpeg(&response.body);
    assert_eq!(tile.dimensions(), (1000 - 768, 800 - 768));
}

#[tokio::test]
async fn test_four_level_scenario() {
    let root = pyramid_root();

    let response = get(root.router(), "/tiles/scan.tif/2/0_0.jpg").await;
    assert_eq!(response.status, StatusCode::OK);
    let tile = decode_jpeg(&response.body);
    assert!(tile.width() <= 256 && tile.height() <= 256);
    assert!(color_close(center_pixel(&tile), tile_color(2, 0, 0), 10));

    let response = get(root.router(), "/tiles/scan.tif/5/0_0.jpg").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error_kind"], "out_of_range");
    assert_eq!(response.json()["status"], 400);
}

#[tokio::test]
async fn test_tile_outside_grid_is_out_of_range() {
    let root = pyramid_root();
    let response = get(root.router(), "/tiles/scan.tif/0/4_0.jpg").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error_kind"], "out_of_range");
}

#[tokio::test]
async fn test_repeated_tile_is_identical_and_cached() {
    let root = pyramid_root();
    let router = root.router();

    let first = get(router.clone(), "/tiles/scan.tif/1/1_1.jpg").await;
    let second = get(router, "/tiles/scan.tif/1/1_1.jpg").await;

    assert_eq!(first.body, second.body);
    assert_eq!(first.header("x-tile-cache-hit"), "false");
    assert_eq!(second.header("x-tile-cache-hit"), "true");
}

#[tokio::test]
async fn test_tile_quality_parameter() {
    let root = pyramid_root();

    let response = get(root.router(), "/tiles/scan.tif/0/0_0.jpg?quality=50").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("x-tile-quality"), "50");

    let response = get(root.router(), "/tiles/scan.tif/0/0_0.jpg?quality=0").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error_kind"], "invalid_quality");
}

#[tokio::test]
async fn test_dzi_tiles() {
    let root = pyramid_root();

    // Top DZI level is full resolution
    let response = get(root.router(), "/dzi/scan.tif_files/10/1_1.jpg").await;
    assert_eq!(response.status, StatusCode::OK);
    let tile = decode_jpeg(&response.body);
    assert_eq!(tile.dimensions(), (256, 256));
    assert!(color_close(center_pixel(&tile), tile_color(0, 1, 1), 10));

    // Two DZI levels down is pyramid level 2, one tile for the whole image
    let response = get(root.router(), "/dzi/scan.tif_files/8/0_0.jpg").await;
    assert_eq!(response.status, StatusCode::OK);
    let tile = decode_jpeg(&response.body);
    assert_eq!(tile.dimensions(), (250, 200));
    assert!(color_close(center_pixel(&tile), tile_color(2, 0, 0), 10));

    let response = get(root.router(), "/dzi/scan.tif_files/11/0_0.jpg").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error_kind"], "out_of_range");
}

#[tokio::test]
async fn test_dzi_tile_for_flat_image() {
    let root = TestRoot::new();
    root.write("photo.png", &create_png(300, 200));

    // 300px wide: max DZI level 9
    let response = get(root.router(), "/dzi/photo.png_files/9/1_0.jpg").await;
    assert_eq!(response.status, StatusCode::OK);
    let tile = decode_jpeg(&response.body);
    assert_eq!(tile.dimensions(), (300 - 256, 200));
}

#[tokio::test]
async fn test_thumbnail() {
    let root = pyramid_root();

    let response = get(root.router(), "/thumbnail/scan.tif?max_size=200").await;
    assert_eq!(response.status, StatusCode::OK);
    let thumb = decode_jpeg(&response.body);
    assert_eq!(thumb.width(), 200);
    assert_eq!(thumb.height(), 160);

    let response = get(root.router(), "/thumbnail/scan.tif?max_size=10").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("x-thumbnail-size-clamped"), "true");
    assert_eq!(response.header("x-thumbnail-actual-size"), "64");
}

// =============================================================================
// Errors
// =============================================================================

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let root = pyramid_root();
    let router = root.router();

    for uri in [
        "/info/missing.tif",
        "/dzi/missing.tif",
        "/tiles/missing.tif/0/0_0.jpg",
        "/thumbnail/missing.tif",
        "/files/missing.tif",
    ] {
        let response = get(router.clone(), uri).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND, "{}", uri);
        let body = response.json();
        assert_eq!(body["error_kind"], "not_found");
        assert_eq!(body["status"], 404);
    }

    // The other file is unaffected
    let response = get(router, "/info/scan.tif").await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_path_escaping_root_is_not_found() {
    let root = pyramid_root();
    let response = get(root.router(), "/info/..%2F..%2Fetc%2Fpasswd").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = get(root.router(), "/info/__SLASH__etc__SLASH__passwd").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsupported_format() {
    let root = TestRoot::new();
    root.write("notes.tif", b"this is not an image at all");

    let response = get(root.router(), "/info/notes.tif").await;
    assert_eq!(response.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(response.json()["error_kind"], "unsupported_format");

    // Raw bytes are still available
    let response = get(root.router(), "/files/notes.tif").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(&response.body[..], b"this is not an image at all");
}

#[tokio::test]
async fn test_malformed_tile_path() {
    let root = pyramid_root();
    let response = get(root.router(), "/tiles/scan.tif/zero/0_0.jpg").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error_kind"], "invalid_path");
}

// =============================================================================
// Cache Invalidation and CORS
// =============================================================================

#[tokio::test]
async fn test_invalidate_cache() {
    let root = pyramid_root();
    let router = root.router();

    let _ = get(router.clone(), "/tiles/scan.tif/0/0_0.jpg").await;
    let _ = get(router.clone(), "/tiles/scan.tif/0/1_0.jpg").await;

    let request = Request::builder()
        .method("POST")
        .uri("/cache/invalidate?path=scan.tif")
        .body(Body::empty())
        .unwrap();
    let response = send(router.clone(), request).await;
    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["handles"], 1);
    assert_eq!(body["tiles"], 2);

    let again = get(router, "/tiles/scan.tif/0/0_0.jpg").await;
    assert_eq!(again.header("x-tile-cache-hit"), "false");
}

#[tokio::test]
async fn test_cors_headers() {
    let root = pyramid_root();
    let request = Request::builder()
        .uri("/info/scan.tif")
        .header("origin", "http://viewer.example")
        .body(Body::empty())
        .unwrap();
    let response = send(root.router(), request).await;
    assert_eq!(response.header("access-control-allow-origin"), "*");

    let restricted = root.router_with(
        RouterConfig::default().with_cors_origins(vec!["http://allowed.example".into()]),
    );
    let request = Request::builder()
        .uri("/info/scan.tif")
        .header("origin", "http://allowed.example")
        .body(Body::empty())
        .unwrap();
    let response = send(restricted, request).await;
    assert_eq!(
        response.header("access-control-allow-origin"),
        "http://allowed.example"
    );
}
