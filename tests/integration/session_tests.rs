//! Review session tests against a live tile router.
//!
//! Tests verify:
//! - Scanned images are reachable through the URLs handed to the viewer
//! - The viewer falls back to thumbnails when the descriptor is refused
//! - Exclusions survive a restart through the backup directory
//! - Legacy backup files still restore

use std::fs;
use std::path::Path;

use axum::http::StatusCode;
use image::{Rgb, RgbImage};

use image_excluder::session::{
    DescriptorOutcome, ReviewOptions, ReviewSession, ViewerMode, ViewerUrls, CSV_HEADER,
};

use super::test_utils::{create_png, encode_jpeg, get, standard_pyramid, TestRoot};

/// A review directory with two pyramids, a PNG, a JPEG, a fake TIFF and a text file.
fn review_root() -> TestRoot {
    let root = TestRoot::new();
    root.write("a_scan.tif", &standard_pyramid().build());
    root.write("b_scan.tiff", &standard_pyramid().build());
    root.write("c_photo.png", &create_png(80, 60));
    root.write(
        "d_photo.jpg",
        &encode_jpeg(&RgbImage::from_pixel(40, 30, Rgb([10, 200, 10])), 90),
    );
    root.write("e_broken.tif", b"this is not a tiff at all");
    root.write("notes.txt", b"ignore me");
    root
}

fn options(backups: Option<&Path>) -> ReviewOptions {
    ReviewOptions {
        images_per_page: 3,
        page_overlap: 1,
        backup_dir: backups.map(Path::to_path_buf),
        use_thumbnail_view: false,
    }
}

/// Strip the origin so the URL can be sent through `oneshot`.
fn local_uri(url: &str) -> &str {
    url.trim_start_matches("http://tiles.test")
}

#[tokio::test]
async fn test_scanned_images_open_in_viewer() {
    let root = review_root();
    let session = ReviewSession::open(root.path(), options(None)).unwrap();
    assert_eq!(session.images().len(), 5);
    assert!(session
        .images()
        .iter()
        .all(|p| p.extension().unwrap() != "txt"));

    let urls = ViewerUrls::new("http://tiles.test/");
    let router = root.router();

    for image in session.images().iter().filter(|p| !p.ends_with("e_broken.tif")) {
        let response = get(router.clone(), local_uri(&urls.dzi_url(image))).await;
        assert_eq!(response.status, StatusCode::OK, "{}", image.display());
        let xml = String::from_utf8(response.body.to_vec()).unwrap();
        assert!(xml.contains("<Image"), "{}", xml);

        let response = get(router.clone(), local_uri(&urls.thumbnail_url(image, 128))).await;
        assert_eq!(response.status, StatusCode::OK, "{}", image.display());
    }
}

#[tokio::test]
async fn test_viewer_mode_follows_descriptor_status() {
    let root = review_root();
    let session = ReviewSession::open(root.path(), options(None)).unwrap();
    let urls = ViewerUrls::new("http://tiles.test");
    let router = root.router();

    let good = session
        .images()
        .iter()
        .find(|p| p.ends_with("a_scan.tif"))
        .unwrap();
    let broken = session
        .images()
        .iter()
        .find(|p| p.ends_with("e_broken.tif"))
        .unwrap();

    let response = get(router.clone(), local_uri(&urls.info_url(good))).await;
    let outcome = DescriptorOutcome::from_status(response.status.as_u16());
    assert_eq!(outcome, DescriptorOutcome::Available);
    let mode = session.viewer_mode().on_descriptor(outcome);
    assert_eq!(mode, ViewerMode::AttemptingTileView);
    assert!(mode.shows_tiles());

    let response = get(router.clone(), local_uri(&urls.info_url(broken))).await;
    let outcome = DescriptorOutcome::from_status(response.status.as_u16());
    assert_eq!(outcome, DescriptorOutcome::Unsupported);
    let mode = session.viewer_mode().on_descriptor(outcome);
    assert_eq!(mode, ViewerMode::FallbackThumbnail);
    // The fallback sticks even if a later probe succeeds
    assert_eq!(
        mode.on_descriptor(DescriptorOutcome::Available),
        ViewerMode::FallbackThumbnail
    );

    let missing = root.path().join("gone.tif");
    let response = get(router, local_uri(&urls.info_url(&missing))).await;
    assert_eq!(
        DescriptorOutcome::from_status(response.status.as_u16()),
        DescriptorOutcome::NotFound
    );
}

#[tokio::test]
async fn test_exclusions_survive_restart() {
    let root = review_root();
    let backups = tempfile::tempdir().unwrap();

    {
        let mut session = ReviewSession::open(root.path(), options(Some(backups.path()))).unwrap();
        assert!(session.restored_from().is_none());
        session
            .exclude(Path::new("a_scan.tif"), "Blurry/Out of focus")
            .unwrap();
        session.next_page();
        session.exclude_page("Tissue fold").unwrap();
    }
    assert!(fs::read_dir(backups.path()).unwrap().next().is_some());

    let session = ReviewSession::open(root.path(), options(Some(backups.path()))).unwrap();
    assert!(session.restored_from().is_some());
    let status = session.status();
    assert_eq!(status.total_images, 5);
    // Page 1 of 5 images with 3 per page and overlap 1 covers images 2..5
    assert_eq!(status.excluded, 4);
    assert_eq!(status.included, 1);
    assert_eq!(status.reason_counts["Tissue fold"], 3);
    assert_eq!(session.current_page(), 1);

    let csv_path = root.path().join("excluded.csv");
    session.export_csv(&csv_path).unwrap();
    let csv = fs::read_to_string(&csv_path).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some(CSV_HEADER));
    assert_eq!(lines.count(), 4);
    assert!(csv.contains("a_scan,Blurry/Out of focus,"));
}

#[tokio::test]
async fn test_legacy_backup_restores() {
    let root = review_root();
    let backups = tempfile::tempdir().unwrap();
    let image = fs::canonicalize(root.path().join("c_photo.png")).unwrap();
    let key = image.to_string_lossy().into_owned();

    let legacy = serde_json::json!({
        "timestamp": "2024-03-01T09:30:00",
        "excluded_images": { key: "Pen marks" },
        "current_page": 0,
        "exclusion_reasons": ["Pen marks", "Other"],
    });
    fs::write(
        backups.path().join("session_backup_20240301_093000.json"),
        serde_json::to_vec_pretty(&legacy).unwrap(),
    )
    .unwrap();

    let session = ReviewSession::open(root.path(), options(Some(backups.path()))).unwrap();
    let record = session.exclusions().get(&image).unwrap();
    assert_eq!(record.reason, "Pen marks");
    assert_eq!(
        record.excluded_at.format("%Y-%m-%d %H:%M").to_string(),
        "2024-03-01 09:30"
    );
    assert_eq!(session.reasons().as_slice(), ["Pen marks", "Other"]);
    assert_eq!(session.status().excluded, 1);
}

#[tokio::test]
async fn test_unknown_image_is_refused() {
    let root = review_root();
    let mut session = ReviewSession::open(root.path(), options(None)).unwrap();

    assert!(session.exclude(Path::new("notes.txt"), "Other").is_err());
    assert!(session.exclude(Path::new("nope.tif"), "Other").is_err());
    assert_eq!(session.status().excluded, 0);
}
