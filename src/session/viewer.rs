//! Viewer URLs and the tile-view / thumbnail fallback state machine.

use std::path::Path;

use crate::slide::encode_path_id;

/// Builds tile server URLs for an image.
///
/// Paths are flattened with `__SLASH__` so an absolute path fits in one URL
/// segment; the remaining characters are percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerUrls {
    base_url: String,
}

impl ViewerUrls {
    /// `base_url` is the tile server origin, e.g. `http://127.0.0.1:5000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Single URL segment naming `path`.
    pub fn encoded_path(path: &Path) -> String {
        urlencoding::encode(&encode_path_id(&path.to_string_lossy())).into_owned()
    }

    /// DZI descriptor URL handed to the deep-zoom viewer.
    pub fn dzi_url(&self, path: &Path) -> String {
        format!("{}/dzi/{}", self.base_url, Self::encoded_path(path))
    }

    pub fn info_url(&self, path: &Path) -> String {
        format!("{}/info/{}", self.base_url, Self::encoded_path(path))
    }

    pub fn thumbnail_url(&self, path: &Path, max_size: u32) -> String {
        format!(
            "{}/thumbnail/{}?max_size={}",
            self.base_url,
            Self::encoded_path(path),
            max_size
        )
    }
}

/// Result of asking the tile server for an image's descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorOutcome {
    /// 2xx: the image can be tiled
    Available,
    /// 404
    NotFound,
    /// 415
    Unsupported,
    /// Any other error status, or no response at all
    Failed,
}

impl DescriptorOutcome {
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => DescriptorOutcome::Available,
            404 => DescriptorOutcome::NotFound,
            415 => DescriptorOutcome::Unsupported,
            _ => DescriptorOutcome::Failed,
        }
    }

    pub fn is_available(self) -> bool {
        self == DescriptorOutcome::Available
    }
}

/// How one image card is rendered.
///
/// Starts in `AttemptingTileView` and drops to `FallbackThumbnail` on the
/// first failed descriptor. The fallback is final for the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerMode {
    AttemptingTileView,
    FallbackThumbnail,
}

impl ViewerMode {
    /// Initial mode; `use_thumbnail_view` skips the tile view entirely.
    pub fn initial(use_thumbnail_view: bool) -> Self {
        if use_thumbnail_view {
            ViewerMode::FallbackThumbnail
        } else {
            ViewerMode::AttemptingTileView
        }
    }

    pub fn on_descriptor(self, outcome: DescriptorOutcome) -> Self {
        match (self, outcome) {
            (ViewerMode::AttemptingTileView, DescriptorOutcome::Available) => {
                ViewerMode::AttemptingTileView
            }
            _ => ViewerMode::FallbackThumbnail,
        }
    }

    pub fn shows_tiles(self) -> bool {
        self == ViewerMode::AttemptingTileView
    }
}
