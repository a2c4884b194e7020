//! Image format readers.
//!
//! Files are classified by their magic bytes ([`detect::detect_kind`]). Tiled
//! TIFF and BigTIFF pyramids are served tile by tile through
//! [`PyramidTiffReader`]; everything else the `image` crate can decode is
//! exposed as a single-level [`FlatImage`].

pub mod detect;
pub mod flat;
pub mod jpeg;
pub mod pyramid_tiff;
pub mod tiff;

pub use detect::{detect_kind, detect_kind_from_bytes, is_tiff_header, ImageKind};
pub use flat::{crop_tile, FlatImage, DEFAULT_MAX_FLAT_BYTES};
pub use jpeg::{merge_jpeg_tables, needs_tables, prepare_tile_jpeg};
pub use pyramid_tiff::{PyramidTiffReader, RawTile};
