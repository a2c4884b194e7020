//! The review session: scanned images, exclusions, paging and backups.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SessionError;

use super::backup::{BackupStore, SavedExclusion, SessionBackup};
use super::exclusions::{ExclusionMap, ReasonList};
use super::export::export_csv_file;
use super::pagination::{Pager, DEFAULT_IMAGES_PER_PAGE, DEFAULT_PAGE_OVERLAP};
use super::scan::scan_directory;
use super::viewer::ViewerMode;

/// Options for opening a [`ReviewSession`].
#[derive(Debug, Clone)]
pub struct ReviewOptions {
    pub images_per_page: usize,
    pub page_overlap: usize,
    /// Where backups are written. `None` disables backups.
    pub backup_dir: Option<PathBuf>,
    pub use_thumbnail_view: bool,
}

impl Default for ReviewOptions {
    fn default() -> Self {
        Self {
            images_per_page: DEFAULT_IMAGES_PER_PAGE,
            page_overlap: DEFAULT_PAGE_OVERLAP,
            backup_dir: None,
            use_thumbnail_view: false,
        }
    }
}

/// Summary counts for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub total_images: usize,
    pub excluded: usize,
    pub included: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub reason_counts: BTreeMap<String, usize>,
}

/// A reviewer's pass over one directory of images.
///
/// Every exclusion change writes a backup when a backup directory is set.
#[derive(Debug)]
pub struct ReviewSession {
    dir: PathBuf,
    images: Vec<PathBuf>,
    exclusions: ExclusionMap,
    reasons: ReasonList,
    pager: Pager,
    current_page: usize,
    use_thumbnail_view: bool,
    backups: Option<BackupStore>,
    restored_from: Option<PathBuf>,
}

impl ReviewSession {
    /// Scan `dir` and restore the newest backup, if there is one.
    pub fn open(dir: impl Into<PathBuf>, options: ReviewOptions) -> Result<Self, SessionError> {
        let dir = dir.into();
        let images = scan_directory(&dir)?;
        let mut session = Self::with_images(dir, images, options);

        if session.backups.is_some() && session.exclusions.is_empty() {
            match session.restore_latest() {
                Ok(path) => info!(backup = %path.display(), "Restored previous session"),
                Err(SessionError::NoBackup(_)) => {}
                // A bad backup should not block a fresh review.
                Err(e) => warn!(error = %e, "Could not restore previous session"),
            }
        }

        info!(
            dir = %session.dir.display(),
            images = session.images.len(),
            excluded = session.exclusions.len(),
            "Opened review session"
        );
        Ok(session)
    }

    /// Build a session over an already known image list. Nothing is restored.
    pub fn with_images(dir: impl Into<PathBuf>, mut images: Vec<PathBuf>, options: ReviewOptions) -> Self {
        images.sort();
        images.dedup();
        Self {
            dir: dir.into(),
            images,
            exclusions: ExclusionMap::new(),
            reasons: ReasonList::default(),
            pager: Pager::new(options.images_per_page, options.page_overlap),
            current_page: 0,
            use_thumbnail_view: options.use_thumbnail_view,
            backups: options.backup_dir.map(BackupStore::new),
            restored_from: None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn images(&self) -> &[PathBuf] {
        &self.images
    }

    pub fn exclusions(&self) -> &ExclusionMap {
        &self.exclusions
    }

    pub fn reasons(&self) -> &ReasonList {
        &self.reasons
    }

    pub fn pager(&self) -> Pager {
        self.pager
    }

    pub fn backups(&self) -> Option<&BackupStore> {
        self.backups.as_ref()
    }

    /// Backup the session was restored from on open.
    pub fn restored_from(&self) -> Option<&Path> {
        self.restored_from.as_deref()
    }

    pub fn use_thumbnail_view(&self) -> bool {
        self.use_thumbnail_view
    }

    pub fn set_use_thumbnail_view(&mut self, value: bool) {
        self.use_thumbnail_view = value;
    }

    /// Starting viewer mode for each image card.
    pub fn viewer_mode(&self) -> ViewerMode {
        ViewerMode::initial(self.use_thumbnail_view)
    }

    // =========================================================================
    // Paging
    // =========================================================================

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn total_pages(&self) -> usize {
        self.pager.total_pages(self.images.len())
    }

    /// Images on the current page.
    pub fn page_images(&self) -> &[PathBuf] {
        let range = self.pager.page_range(self.current_page, self.images.len());
        &self.images[range]
    }

    pub fn go_to_page(&mut self, page: usize) -> usize {
        self.current_page = self.pager.clamp_page(page, self.images.len());
        self.current_page
    }

    pub fn next_page(&mut self) -> usize {
        self.go_to_page(self.current_page.saturating_add(1))
    }

    pub fn prev_page(&mut self) -> usize {
        self.go_to_page(self.current_page.saturating_sub(1))
    }

    // =========================================================================
    // Exclusions
    // =========================================================================

    /// Find the scanned image `path` refers to.
    ///
    /// Relative paths are taken relative to the session directory.
    pub fn resolve_image(&self, path: &Path) -> Option<PathBuf> {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.dir.join(path)
        };
        let candidates = [
            Some(path.to_path_buf()),
            Some(joined.clone()),
            std::fs::canonicalize(&joined).ok(),
        ];
        candidates
            .into_iter()
            .flatten()
            .find(|candidate| self.images.binary_search(candidate).is_ok())
    }

    fn require_image(&self, path: &Path) -> Result<PathBuf, SessionError> {
        self.resolve_image(path)
            .ok_or_else(|| SessionError::UnknownImage(path.to_path_buf()))
    }

    /// Exclude one image. A reason not yet listed is added to the reasons.
    pub fn exclude(&mut self, path: &Path, reason: &str) -> Result<(), SessionError> {
        let image = self.require_image(path)?;
        self.reasons.add(reason)?;
        self.exclusions.exclude(image.clone(), reason)?;
        debug!(image = %image.display(), reason = reason.trim(), "Excluded image");
        self.autosave()
    }

    /// Include an image again. Returns `false` if it was not excluded.
    pub fn include(&mut self, path: &Path) -> Result<bool, SessionError> {
        let image = self.require_image(path)?;
        if self.exclusions.include(&image).is_none() {
            return Ok(false);
        }
        debug!(image = %image.display(), "Included image");
        self.autosave()?;
        Ok(true)
    }

    /// Exclude every not-yet-excluded image on the current page.
    ///
    /// Returns how many images were newly excluded.
    pub fn exclude_page(&mut self, reason: &str) -> Result<usize, SessionError> {
        self.reasons.add(reason)?;
        let pending: Vec<PathBuf> = self
            .page_images()
            .iter()
            .filter(|image| !self.exclusions.is_excluded(image))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }
        for image in &pending {
            self.exclusions.exclude(image.clone(), reason)?;
        }
        info!(page = self.current_page, count = pending.len(), "Excluded page");
        self.autosave()?;
        Ok(pending.len())
    }

    /// Include every excluded image on the current page.
    pub fn include_page(&mut self) -> Result<usize, SessionError> {
        let excluded: Vec<PathBuf> = self
            .page_images()
            .iter()
            .filter(|image| self.exclusions.is_excluded(image))
            .cloned()
            .collect();
        if excluded.is_empty() {
            return Ok(0);
        }
        for image in &excluded {
            self.exclusions.include(image);
        }
        info!(page = self.current_page, count = excluded.len(), "Included page");
        self.autosave()?;
        Ok(excluded.len())
    }

    /// Add a custom reason. Returns `false` if it was already listed.
    pub fn add_reason(&mut self, reason: &str) -> Result<bool, SessionError> {
        let added = self.reasons.add(reason)?;
        if added {
            self.autosave()?;
        }
        Ok(added)
    }

    pub fn status(&self) -> SessionStatus {
        let reason_counts = self
            .exclusions
            .reason_counts()
            .into_iter()
            .map(|(reason, count)| (reason.to_string(), count))
            .collect();
        SessionStatus {
            total_images: self.images.len(),
            excluded: self.exclusions.len(),
            included: self
                .images
                .iter()
                .filter(|image| !self.exclusions.is_excluded(image))
                .count(),
            current_page: self.current_page,
            total_pages: self.total_pages(),
            reason_counts,
        }
    }

    // =========================================================================
    // Export and backups
    // =========================================================================

    pub fn export_csv(&self, path: &Path) -> Result<(), SessionError> {
        export_csv_file(path, &self.exclusions)?;
        info!(path = %path.display(), rows = self.exclusions.len(), "Exported exclusions");
        Ok(())
    }

    /// Snapshot of the session as saved at `at`.
    pub fn to_backup(&self, at: DateTime<Local>) -> SessionBackup {
        SessionBackup {
            timestamp: at.to_rfc3339(),
            excluded_images: self
                .exclusions
                .iter()
                .map(|(path, record)| (path.clone(), SavedExclusion::Record(record.clone())))
                .collect(),
            current_page: self.current_page,
            images_per_page: self.pager.per_page(),
            image_files: self.images.clone(),
            exclusion_reasons: self.reasons.as_slice().to_vec(),
            use_thumbnail_view: self.use_thumbnail_view,
            total_images: self.images.len(),
            excluded_count: self.exclusions.len(),
        }
    }

    /// Write a backup now. `None` when backups are disabled.
    pub fn save_backup(&self) -> Result<Option<PathBuf>, SessionError> {
        let Some(store) = &self.backups else {
            return Ok(None);
        };
        let now = Local::now();
        store.save(&self.to_backup(now), now).map(Some)
    }

    fn autosave(&self) -> Result<(), SessionError> {
        self.save_backup().map(|_| ())
    }

    /// Replace exclusions, reasons and view state with the newest backup.
    ///
    /// The scanned image list is kept as is.
    pub fn restore_latest(&mut self) -> Result<PathBuf, SessionError> {
        let Some(store) = &self.backups else {
            return Err(SessionError::NoBackup(self.dir.clone()));
        };
        let Some((path, backup)) = store.load_latest()? else {
            return Err(SessionError::NoBackup(store.dir().to_path_buf()));
        };
        self.apply_backup(backup);
        self.restored_from = Some(path.clone());
        Ok(path)
    }

    /// Load the session state from `backup`.
    pub fn apply_backup(&mut self, backup: SessionBackup) {
        let saved_at = backup.saved_at().unwrap_or_else(Local::now);

        self.exclusions.clear();
        for (path, saved) in backup.excluded_images {
            self.exclusions.restore(path, saved.into_record(saved_at));
        }
        if !backup.exclusion_reasons.is_empty() {
            self.reasons = ReasonList::from_saved(backup.exclusion_reasons);
        }
        self.use_thumbnail_view = backup.use_thumbnail_view;
        self.current_page = self.pager.clamp_page(backup.current_page, self.images.len());
    }
}
