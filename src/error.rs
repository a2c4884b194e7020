use std::path::PathBuf;

use thiserror::Error;

/// I/O errors that can occur when reading image files from disk
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// File does not exist, or resolves outside the served root
    #[error("File not found: {0}")]
    NotFound(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Underlying read or open failure
    #[error("Read error: {0}")]
    Read(String),
}

impl IoError {
    /// Build an `IoError` from a `std::io::Error`, keeping "not found" distinct.
    pub fn from_std(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(path.to_string()),
            _ => IoError::Read(format!("{}: {}", path, err)),
        }
    }
}

/// Errors raised while opening an image and building its descriptor
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File is neither a tiled pyramid nor a decodable raster (HTTP 415)
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// IFD offset points outside the file
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Compression scheme we cannot decode tiles for
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Pixel layout we cannot decode tiles for (bit depth, planar, samples)
    #[error("Unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors surfaced by the tile service for structured tile requests.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Image path does not resolve to a file under the root
    #[error("Image not found: {path}")]
    NotFound { path: String },

    /// Level index is past the last pyramid level
    #[error("Invalid level {level}: image has {level_count} levels")]
    InvalidLevel { level: usize, level_count: usize },

    /// Tile column/row is outside the level's tile grid
    #[error("Tile ({x}, {y}) out of bounds for level {level} (grid is {max_x}x{max_y})")]
    TileOutOfBounds {
        level: usize,
        x: u32,
        y: u32,
        max_x: u32,
        max_y: u32,
    },

    #[error("Invalid JPEG quality {quality}: must be between 1 and 100")]
    InvalidQuality { quality: u8 },

    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },

    #[error("I/O error: {0}")]
    Io(IoError),

    /// Structural error while reading tile data out of the container
    #[error("TIFF error: {0}")]
    Slide(TiffError),

    #[error("Failed to decode tile: {message}")]
    DecodeError { message: String },

    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },
}

impl From<IoError> for TileError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::NotFound(path) => TileError::NotFound { path },
            other => TileError::Io(other),
        }
    }
}

impl From<TiffError> for TileError {
    fn from(err: TiffError) -> Self {
        match err {
            TiffError::Io(io) => io.into(),
            other => TileError::Slide(other),
        }
    }
}

impl From<FormatError> for TileError {
    fn from(err: FormatError) -> Self {
        match err {
            FormatError::Io(io) => io.into(),
            FormatError::Tiff(tiff) => tiff.into(),
            FormatError::UnsupportedFormat { reason } => TileError::UnsupportedFormat { reason },
        }
    }
}

/// Errors from the raw byte-range endpoint.
#[derive(Debug, Clone, Error)]
pub enum RangeError {
    /// `Range` header that does not parse as a single byte range (HTTP 400)
    #[error("Invalid Range header: {header}")]
    Invalid { header: String },

    /// Range starts at or past end of file (HTTP 416)
    #[error("Range not satisfiable for resource of {size} bytes")]
    NotSatisfiable { size: u64 },

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Errors from the review session (persistence and bookkeeping).
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Path is not one of the session's discovered images
    #[error("Image is not part of this session: {0}")]
    UnknownImage(PathBuf),

    #[error("Exclusion reason must not be empty")]
    EmptyReason,

    #[error("No backups found in {0}")]
    NoBackup(PathBuf),
}

impl SessionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SessionError::Io {
            path: path.into(),
            source,
        }
    }
}
