//! Image abstraction layer.
//!
//! Sits between the format readers and the tile service:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │            SlideRegistry                │
//! │  (one handle per path, auto-detection)  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideReader Trait             │
//! │      (format-agnostic level info)       │
//! └────────────────────┬────────────────────┘
//!                      │
//!          ┌───────────┴───────────┐
//!          ▼                       ▼
//! ┌───────────────────┐    ┌─────────────────┐
//! │ PyramidTiffReader │    │    FlatImage    │
//! │  (tiled TIFF)     │    │ (single level)  │
//! └───────────────────┘    └─────────────────┘
//! ```

mod local_source;
mod reader;
mod registry;

pub use local_source::{decode_path_id, encode_path_id, LocalSlideSource, SLASH_PLACEHOLDER};
pub use reader::{LevelInfo, SlideReader};
pub use registry::{CachedSlide, SlideRegistry, SlideSource, DEFAULT_FLAT_TILE_SIZE};
