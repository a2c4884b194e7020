//! Command-line configuration.
//!
//! Three subcommands:
//!
//! - `serve` - run the tile server over a root directory
//! - `inspect` - print the descriptor of one image
//! - `review` - work with a review session from the terminal
//!
//! # Environment Variables
//!
//! Every `serve` option can be set with an `EXCLUDER_` prefixed variable:
//!
//! - `EXCLUDER_ROOT` - Directory images are served from (required)
//! - `EXCLUDER_HOST` - Bind address (default: 0.0.0.0)
//! - `EXCLUDER_PORT` - Port (default: 5000)
//! - `EXCLUDER_CACHE_TILES` - Encoded tile cache size in bytes (default: 100MB)
//! - `EXCLUDER_CACHE_DECODED` - Decoded flat images kept in memory (default: 4)
//! - `EXCLUDER_TILE_SIZE` - DZI tile edge (default: 256)
//! - `EXCLUDER_JPEG_QUALITY` - Default JPEG quality (default: 85)
//! - `EXCLUDER_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `EXCLUDER_RANGE_CHUNK` - Bytes returned by `/files` without a Range header (default: 1MB)
//! - `EXCLUDER_MAX_FLAT_BYTES` - Largest non-pyramid image decoded (default: 256MB)
//! - `EXCLUDER_CORS_ORIGINS` - Comma-separated allowed origins (default: any)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::format::DEFAULT_MAX_FLAT_BYTES;
use crate::server::{DEFAULT_CACHE_MAX_AGE, DEFAULT_RANGE_CHUNK};
use crate::session::{DEFAULT_BACKUP_DIR, DEFAULT_IMAGES_PER_PAGE, DEFAULT_PAGE_OVERLAP};
use crate::tile::dzi::DEFAULT_DZI_TILE_SIZE;
use crate::tile::{
    DEFAULT_DECODED_CAPACITY, DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Tile server the review session links to.
pub const DEFAULT_TILE_SERVER_URL: &str = "http://127.0.0.1:5000";

/// Default CSV export file.
pub const DEFAULT_EXPORT_FILE: &str = "excluded_images.csv";

/// Accepted DZI tile edges.
pub const MIN_TILE_SIZE: u32 = 64;
pub const MAX_TILE_SIZE: u32 = 4096;

// =============================================================================
// CLI Arguments
// =============================================================================

/// Image Excluder - tile server and review tool for large microscopy images.
#[derive(Parser, Debug, Clone)]
#[command(name = "image-excluder")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve tiles, descriptors and raw bytes for images under a directory.
    Serve(ServeConfig),

    /// Print the descriptor of a single image as JSON.
    Inspect(InspectConfig),

    /// Inspect or change a review session.
    Review(ReviewConfig),
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Directory images are served from. Request paths resolve inside it.
    #[arg(long, env = "EXCLUDER_ROOT")]
    pub root: PathBuf,

    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "EXCLUDER_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "EXCLUDER_PORT")]
    pub port: u16,

    /// Encoded tile cache size in bytes.
    #[arg(long, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "EXCLUDER_CACHE_TILES")]
    pub cache_tiles: usize,

    /// Number of decoded flat images kept in memory.
    #[arg(long, default_value_t = DEFAULT_DECODED_CAPACITY, env = "EXCLUDER_CACHE_DECODED")]
    pub cache_decoded: usize,

    /// Edge length of DZI tiles.
    #[arg(long, default_value_t = DEFAULT_DZI_TILE_SIZE, env = "EXCLUDER_TILE_SIZE")]
    pub tile_size: u32,

    /// Default JPEG quality for tile encoding (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "EXCLUDER_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "EXCLUDER_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Bytes returned by `/files` when no Range header is sent.
    #[arg(long, default_value_t = DEFAULT_RANGE_CHUNK, env = "EXCLUDER_RANGE_CHUNK")]
    pub range_chunk: u64,

    /// Largest non-pyramid image, in bytes, that will be decoded.
    #[arg(long, default_value_t = DEFAULT_MAX_FLAT_BYTES, env = "EXCLUDER_MAX_FLAT_BYTES")]
    pub max_flat_bytes: u64,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "EXCLUDER_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.root.is_dir() {
            return Err(format!(
                "Root directory does not exist: {}. Set --root or EXCLUDER_ROOT",
                self.root.display()
            ));
        }

        if self.cache_tiles == 0 {
            return Err("cache_tiles must be greater than 0".to_string());
        }
        if self.cache_decoded == 0 {
            return Err("cache_decoded must be greater than 0".to_string());
        }

        if !(MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if !(MIN_TILE_SIZE..=MAX_TILE_SIZE).contains(&self.tile_size) {
            return Err(format!(
                "tile_size must be between {} and {}",
                MIN_TILE_SIZE, MAX_TILE_SIZE
            ));
        }

        if self.range_chunk == 0 {
            return Err("range_chunk must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// Inspect
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    /// Image file to describe.
    pub path: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

// =============================================================================
// Review
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ReviewConfig {
    /// Directory of images under review.
    #[arg(long, env = "EXCLUDER_REVIEW_DIR")]
    pub dir: PathBuf,

    /// Where session backups are written.
    #[arg(long, default_value = DEFAULT_BACKUP_DIR, env = "EXCLUDER_BACKUP_DIR")]
    pub backup_dir: PathBuf,

    /// Do not read or write backups.
    #[arg(long, default_value_t = false)]
    pub no_backups: bool,

    /// Images shown per page.
    #[arg(long, default_value_t = DEFAULT_IMAGES_PER_PAGE)]
    pub per_page: usize,

    /// Images shared by consecutive pages.
    #[arg(long, default_value_t = DEFAULT_PAGE_OVERLAP)]
    pub overlap: usize,

    /// Tile server used for viewer URLs.
    #[arg(long, default_value = DEFAULT_TILE_SERVER_URL, env = "EXCLUDER_TILE_SERVER_URL")]
    pub tile_server: String,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub action: ReviewAction,
}

impl ReviewConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.per_page == 0 {
            return Err("per_page must be greater than 0".to_string());
        }
        match url::Url::parse(&self.tile_server) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(format!(
                    "tile_server must be an http(s) URL, got scheme '{}'",
                    url.scheme()
                ))
            }
            Err(e) => return Err(format!("tile_server is not a valid URL: {}", e)),
        }
        Ok(())
    }

    /// Backup directory, unless backups are disabled.
    pub fn backup_dir(&self) -> Option<PathBuf> {
        (!self.no_backups).then(|| self.backup_dir.clone())
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ReviewAction {
    /// Print image, exclusion and per-reason counts.
    Status,

    /// List the images on one page with their viewer URLs.
    Page {
        /// Zero-based page number (clamped to the last page).
        #[arg(default_value_t = 0)]
        page: usize,
    },

    /// Exclude images, or every image on a page.
    Exclude {
        /// Images to exclude, absolute or relative to the review directory.
        #[arg(required_unless_present = "page")]
        paths: Vec<PathBuf>,

        /// Why the images are excluded.
        #[arg(short, long)]
        reason: String,

        /// Exclude the not-yet-excluded images on this page instead.
        #[arg(long, conflicts_with = "paths")]
        page: Option<usize>,
    },

    /// Include previously excluded images again.
    Include {
        #[arg(required_unless_present = "page")]
        paths: Vec<PathBuf>,

        /// Include every excluded image on this page instead.
        #[arg(long, conflicts_with = "paths")]
        page: Option<usize>,
    },

    /// Write the exclusion list as CSV.
    Export {
        #[arg(short, long, default_value = DEFAULT_EXPORT_FILE)]
        output: PathBuf,
    },

    /// Write a backup of the session now.
    Backup,

    /// List exclusion reasons, optionally adding one.
    Reasons {
        #[arg(long)]
        add: Option<String>,
    },
}

// =============================================================================
// Tests
// =============================================================================
