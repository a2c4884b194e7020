//! Review session manager.
//!
//! A reviewer walks a directory of images page by page and marks the ones that
//! should be left out of a dataset, each with a reason. The session keeps:
//!
//! - the scanned image list ([`scan_directory`])
//! - exclusions with reason and time ([`ExclusionMap`])
//! - overlapping pages ([`Pager`])
//! - JSON backups written after every change ([`BackupStore`])
//! - CSV export of the final exclusion list ([`export_csv_file`])
//!
//! Images are displayed through the tile server. [`ViewerUrls`] builds the URLs
//! and [`ViewerMode`] decides whether a card shows deep-zoom tiles or the
//! fallback thumbnail.
//!
//! # Example
//!
//! ```
//! use std::path::{Path, PathBuf};
//! use image_excluder::session::{ReviewOptions, ReviewSession};
//!
//! let mut session = ReviewSession::with_images(
//!     "/data",
//!     vec![PathBuf::from("/data/a.tif"), PathBuf::from("/data/b.tif")],
//!     ReviewOptions::default(),
//! );
//! session.exclude(Path::new("/data/a.tif"), "grid").unwrap();
//! assert_eq!(session.status().excluded, 1);
//! ```

mod backup;
mod exclusions;
mod export;
mod pagination;
mod review;
mod scan;
mod viewer;

pub use backup::{backup_file_name, BackupStore, SavedExclusion, SessionBackup, DEFAULT_BACKUP_DIR};
pub use exclusions::{ExclusionMap, ExclusionRecord, ReasonList, DEFAULT_EXCLUSION_REASONS};
pub use export::{export_csv_file, to_csv_string, write_csv, CSV_HEADER};
pub use pagination::{Pager, DEFAULT_IMAGES_PER_PAGE, DEFAULT_PAGE_OVERLAP};
pub use review::{ReviewOptions, ReviewSession, SessionStatus};
pub use scan::{is_image_file, scan_directory, IMAGE_EXTENSIONS};
pub use viewer::{DescriptorOutcome, ViewerMode, ViewerUrls};
