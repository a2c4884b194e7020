//! JSON session backups.
//!
//! Each save writes `session_backup_YYYYMMDD_HHMMSS.json` into the backup
//! directory. The newest file by modification time is the one restored on
//! startup.
//!
//! Older backups stored each exclusion as a bare reason string; those load
//! with the backup's own timestamp as the exclusion time.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SessionError;

use super::exclusions::{ExclusionRecord, DEFAULT_EXCLUSION_REASONS};
use super::pagination::DEFAULT_IMAGES_PER_PAGE;

/// Default directory for backup files, relative to the working directory.
pub const DEFAULT_BACKUP_DIR: &str = "backups";

const BACKUP_PREFIX: &str = "session_backup_";

/// One exclusion as stored in a backup file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SavedExclusion {
    Record(ExclusionRecord),
    /// Legacy form: just the reason
    Reason(String),
}

impl SavedExclusion {
    pub fn reason(&self) -> &str {
        match self {
            SavedExclusion::Record(record) => &record.reason,
            SavedExclusion::Reason(reason) => reason,
        }
    }

    /// Convert to a record, using `fallback` as the time for legacy entries.
    pub fn into_record(self, fallback: DateTime<Local>) -> ExclusionRecord {
        match self {
            SavedExclusion::Record(record) => record,
            SavedExclusion::Reason(reason) => ExclusionRecord {
                reason,
                excluded_at: fallback,
            },
        }
    }
}

fn default_images_per_page() -> usize {
    DEFAULT_IMAGES_PER_PAGE
}

fn default_reasons() -> Vec<String> {
    DEFAULT_EXCLUSION_REASONS
        .iter()
        .map(|r| r.to_string())
        .collect()
}

/// Snapshot of a review session as written to disk.
///
/// Every field has a default so partial files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionBackup {
    /// ISO-8601 time of the save
    #[serde(default)]
    pub timestamp: String,

    #[serde(default)]
    pub excluded_images: BTreeMap<PathBuf, SavedExclusion>,

    #[serde(default)]
    pub current_page: usize,

    #[serde(default = "default_images_per_page")]
    pub images_per_page: usize,

    #[serde(default)]
    pub image_files: Vec<PathBuf>,

    #[serde(default = "default_reasons")]
    pub exclusion_reasons: Vec<String>,

    #[serde(default)]
    pub use_thumbnail_view: bool,

    #[serde(default)]
    pub total_images: usize,

    #[serde(default)]
    pub excluded_count: usize,
}

impl SessionBackup {
    /// Saved time, accepting RFC 3339 or a naive local `YYYY-MM-DDTHH:MM:SS[.f]`.
    pub fn saved_at(&self) -> Option<DateTime<Local>> {
        if let Ok(time) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return Some(time.with_timezone(&Local));
        }
        let naive = NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local.from_local_datetime(&naive).earliest()
    }
}

/// File name for a backup saved at `time`.
pub fn backup_file_name(time: DateTime<Local>) -> String {
    format!("{}{}.json", BACKUP_PREFIX, time.format("%Y%m%d_%H%M%S"))
}

/// Directory of session backups.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `backup` under a name derived from its save time.
    pub fn save(&self, backup: &SessionBackup, at: DateTime<Local>) -> Result<PathBuf, SessionError> {
        fs::create_dir_all(&self.dir).map_err(|e| SessionError::io(&self.dir, e))?;
        let path = self.dir.join(backup_file_name(at));

        let file = File::create(&path).map_err(|e| SessionError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, backup).map_err(|e| SessionError::Json {
            path: path.clone(),
            source: e,
        })?;
        writer.flush().map_err(|e| SessionError::io(&path, e))?;

        info!(
            path = %path.display(),
            excluded = backup.excluded_count,
            "Saved session backup"
        );
        Ok(path)
    }

    /// Backup files, newest first. A missing directory has none.
    pub fn list(&self) -> Result<Vec<PathBuf>, SessionError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SessionError::io(&self.dir, e)),
        };

        let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| SessionError::io(&self.dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, path));
        }
        files.sort_by(|a, b| b.cmp(a));
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    /// Newest backup file, if any.
    pub fn latest(&self) -> Result<Option<PathBuf>, SessionError> {
        Ok(self.list()?.into_iter().next())
    }

    /// Read one backup file.
    pub fn load(path: &Path) -> Result<SessionBackup, SessionError> {
        let file = File::open(path).map_err(|e| SessionError::io(path, e))?;
        let backup: SessionBackup =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| SessionError::Json {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(
            path = %path.display(),
            excluded = backup.excluded_images.len(),
            "Loaded session backup"
        );
        Ok(backup)
    }

    /// Read the newest backup.
    pub fn load_latest(&self) -> Result<Option<(PathBuf, SessionBackup)>, SessionError> {
        match self.latest()? {
            Some(path) => {
                let backup = Self::load(&path)?;
                Ok(Some((path, backup)))
            }
            None => Ok(None),
        }
    }
}
