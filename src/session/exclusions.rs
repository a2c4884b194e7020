//! Exclusion bookkeeping and the list of selectable reasons.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Reasons offered before any custom reason is added.
pub const DEFAULT_EXCLUSION_REASONS: [&str; 6] = [
    "grid",
    "little or no tissue",
    "scanning artifact",
    "partially scanned",
    "non-representative tissue",
    "different depth available",
];

/// Why and when an image was excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionRecord {
    pub reason: String,
    pub excluded_at: DateTime<Local>,
}

impl ExclusionRecord {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            excluded_at: Local::now(),
        }
    }
}

/// Excluded images keyed by path. Iteration is in path order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExclusionMap {
    entries: BTreeMap<PathBuf, ExclusionRecord>,
}

impl ExclusionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude `path`, replacing any earlier reason.
    pub fn exclude(&mut self, path: impl Into<PathBuf>, reason: &str) -> Result<(), SessionError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SessionError::EmptyReason);
        }
        self.entries.insert(path.into(), ExclusionRecord::new(reason));
        Ok(())
    }

    /// Put back a record as it was saved.
    pub fn restore(&mut self, path: PathBuf, record: ExclusionRecord) {
        self.entries.insert(path, record);
    }

    /// Remove an exclusion, returning the record if there was one.
    pub fn include(&mut self, path: &Path) -> Option<ExclusionRecord> {
        self.entries.remove(path)
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&ExclusionRecord> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &ExclusionRecord)> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of exclusions per reason, sorted by reason.
    pub fn reason_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for record in self.entries.values() {
            *counts.entry(record.reason.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Ordered, deduplicated list of exclusion reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonList {
    reasons: Vec<String>,
}

impl Default for ReasonList {
    fn default() -> Self {
        Self {
            reasons: DEFAULT_EXCLUSION_REASONS
                .iter()
                .map(|r| r.to_string())
                .collect(),
        }
    }
}

impl ReasonList {
    /// Build from saved reasons, dropping blanks and duplicates.
    pub fn from_saved(saved: Vec<String>) -> Self {
        let mut list = Self {
            reasons: Vec::with_capacity(saved.len()),
        };
        for reason in saved {
            let _ = list.add(&reason);
        }
        list
    }

    /// Append a custom reason. Returns `false` if it was already listed.
    pub fn add(&mut self, reason: &str) -> Result<bool, SessionError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SessionError::EmptyReason);
        }
        if self.contains(reason) {
            return Ok(false);
        }
        self.reasons.push(reason.to_string());
        Ok(true)
    }

    pub fn contains(&self, reason: &str) -> bool {
        self.reasons.iter().any(|r| r == reason)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.reasons
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}
