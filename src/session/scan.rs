//! Image discovery for a review directory.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::SessionError;

/// Extensions picked up by a scan, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["tif", "tiff", "jpg", "jpeg", "png"];

/// Whether `path` has one of [`IMAGE_EXTENSIONS`].
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// List the images directly inside `dir`, as absolute paths sorted by path.
///
/// Not recursive. A missing directory yields an empty list.
pub fn scan_directory(dir: &Path) -> Result<Vec<PathBuf>, SessionError> {
    if !dir.is_dir() {
        debug!(dir = %dir.display(), "Review directory does not exist");
        return Ok(Vec::new());
    }
    let dir = std::fs::canonicalize(dir).map_err(|e| SessionError::io(dir, e))?;

    let entries = std::fs::read_dir(&dir).map_err(|e| SessionError::io(&dir, e))?;
    let mut images = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| SessionError::io(&dir, e))?;
        let path = entry.path();
        if path.is_file() && is_image_file(&path) {
            images.push(path);
        }
    }
    images.sort();

    debug!(dir = %dir.display(), count = images.len(), "Scanned review directory");
    Ok(images)
}
