//! Byte-range tests for the raw file endpoint.
//!
//! Tests verify:
//! - 206 responses carry exactly the requested span and a matching Content-Range
//! - Ranges past EOF are clamped; ranges starting past EOF are 416
//! - Without a Range header the first chunk is returned with X-Total-Length
//! - Bodies larger than the stream buffer arrive intact

use axum::body::Body;
use axum::http::{Request, StatusCode};

use image_excluder::server::RouterConfig;

use super::test_utils::{get, get_with_range, send, standard_pyramid, TestRoot};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn data_root(len: usize) -> (TestRoot, Vec<u8>) {
    let root = TestRoot::new();
    let data = pattern(len);
    root.write("data.tif", &data);
    (root, data)
}

#[tokio::test]
async fn test_range_inside_bounds() {
    let (root, data) = data_root(3000);
    let response = get_with_range(root.router(), "/files/data.tif", "bytes=100-199").await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.header("content-range"), "bytes 100-199/3000");
    assert_eq!(response.header("content-length"), "100");
    assert_eq!(response.header("accept-ranges"), "bytes");
    assert_eq!(response.header("content-type"), "image/tiff");
    assert_eq!(response.header("cache-control"), "public, max-age=3600");
    assert_eq!(&response.body[..], &data[100..200]);
}

#[tokio::test]
async fn test_range_past_eof_is_clamped() {
    let (root, data) = data_root(3000);
    let response = get_with_range(root.router(), "/files/data.tif", "bytes=2900-5000").await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.header("content-range"), "bytes 2900-2999/3000");
    assert_eq!(response.header("content-length"), "100");
    assert_eq!(&response.body[..], &data[2900..]);
}

#[tokio::test]
async fn test_open_ended_and_suffix_ranges() {
    let (root, data) = data_root(3000);

    let response = get_with_range(root.router(), "/files/data.tif", "bytes=2990-").await;
    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.header("content-range"), "bytes 2990-2999/3000");
    assert_eq!(&response.body[..], &data[2990..]);

    let response = get_with_range(root.router(), "/files/data.tif", "bytes=-50").await;
    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.header("content-range"), "bytes 2950-2999/3000");
    assert_eq!(&response.body[..], &data[2950..]);
}

#[tokio::test]
async fn test_range_starting_past_eof_is_unsatisfiable() {
    let (root, _) = data_root(3000);
    let response = get_with_range(root.router(), "/files/data.tif", "bytes=3000-3100").await;

    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(response.header("content-range"), "bytes */3000");
    assert_eq!(response.json()["error_kind"], "range_not_satisfiable");
    assert_eq!(response.json()["status"], 416);
}

#[tokio::test]
async fn test_invalid_range_headers() {
    let (root, _) = data_root(3000);

    for header in ["bytes=0-10,20-30", "bytes=abc", "items=0-10", "bytes=50-10"] {
        let response = get_with_range(root.router(), "/files/data.tif", header).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "{}", header);
        assert_eq!(response.json()["error_kind"], "invalid_range");
    }
}

#[tokio::test]
async fn test_no_range_returns_whole_small_file() {
    let (root, data) = data_root(3000);
    let response = get(root.router(), "/files/data.tif").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-length"), "3000");
    assert_eq!(response.header("x-total-length"), "3000");
    assert!(response.headers.get("content-range").is_none());
    assert_eq!(&response.body[..], &data[..]);
}

#[tokio::test]
async fn test_no_range_returns_first_chunk_of_large_file() {
    let (root, data) = data_root(3000);
    let router = root.router_with(RouterConfig::default().with_range_chunk(1024));
    let response = get(router, "/files/data.tif").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-length"), "1024");
    assert_eq!(response.header("x-total-length"), "3000");
    assert_eq!(&response.body[..], &data[..1024]);
}

#[tokio::test]
async fn test_open_ended_range_returns_one_chunk() {
    let (root, data) = data_root(3000);
    let router = root.router_with(RouterConfig::default().with_range_chunk(1024));

    let response = get_with_range(router.clone(), "/files/data.tif", "bytes=0-").await;
    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.header("content-length"), "1024");
    assert_eq!(response.header("content-range"), "bytes 0-1023/3000");
    assert_eq!(response.header("x-total-length"), "3000");
    assert_eq!(&response.body[..], &data[..1024]);

    // Near the end the chunk is clamped to EOF
    let response = get_with_range(router.clone(), "/files/data.tif", "bytes=2500-").await;
    assert_eq!(response.header("content-range"), "bytes 2500-2999/3000");
    assert_eq!(&response.body[..], &data[2500..]);

    // An explicit end is honoured past the chunk size
    let response = get_with_range(router, "/files/data.tif", "bytes=0-2999").await;
    assert_eq!(response.body.len(), 3000);
}

#[tokio::test]
async fn test_head_request_has_headers_only() {
    let (root, _) = data_root(3000);
    let request = Request::builder()
        .method("HEAD")
        .uri("/files/data.tif")
        .header("range", "bytes=0-9")
        .body(Body::empty())
        .unwrap();
    let response = send(root.router(), request).await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.header("content-range"), "bytes 0-9/3000");
    assert_eq!(response.header("x-total-length"), "3000");
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn test_large_range_streams_intact() {
    let len = 600 * 1024;
    let (root, data) = data_root(len);
    let header = format!("bytes=10-{}", len - 1);
    let response = get_with_range(root.router(), "/files/data.tif", &header).await;

    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(response.body.len(), len - 10);
    assert_eq!(&response.body[..], &data[10..]);
}

#[tokio::test]
async fn test_empty_file() {
    let root = TestRoot::new();
    root.write("empty.tif", b"");

    let response = get(root.router(), "/files/empty.tif").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.header("content-length"), "0");
    assert!(response.body.is_empty());

    let response = get_with_range(root.router(), "/files/empty.tif", "bytes=0-").await;
    assert_eq!(response.status, StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_range_over_cached_pyramid_matches_file() {
    let root = TestRoot::new();
    let tiff = standard_pyramid().build();
    root.write("scan.tif", &tiff);
    let router = root.router();

    // Open the handle through the descriptor first
    let info = get(router.clone(), "/info/scan.tif").await;
    assert_eq!(info.status, StatusCode::OK);

    let response = get_with_range(router, "/files/scan.tif", "bytes=0-7").await;
    assert_eq!(response.status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(&response.body[..], &tiff[..8]);
    assert_eq!(response.header("x-total-length"), tiff.len().to_string());
}

#[tokio::test]
async fn test_content_type_by_extension() {
    let root = TestRoot::new();
    root.write("a.png", b"not really a png");
    root.write("b.bin", b"bytes");

    let response = get(root.router(), "/files/a.png").await;
    assert_eq!(response.header("content-type"), "image/png");

    let response = get(root.router(), "/files/b.bin").await;
    assert_eq!(response.header("content-type"), "application/octet-stream");
}
