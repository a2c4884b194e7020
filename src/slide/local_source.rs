//! Slide source rooted at a local directory.
//!
//! Request paths are relative to the root. `__SLASH__` is decoded to `/`, so
//! clients that flatten paths into one URL segment still work. An absolute
//! path is accepted only when it resolves inside the root. Anything that
//! escapes the root, through `..` or a symlink, is reported as not found.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::task;

use crate::error::IoError;
use crate::io::LocalFileReader;

use super::registry::SlideSource;

/// Path separator placeholder used in flattened URL segments.
pub const SLASH_PLACEHOLDER: &str = "__SLASH__";

/// Decode `__SLASH__` placeholders back to `/`.
pub fn decode_path_id(raw: &str) -> String {
    raw.replace(SLASH_PLACEHOLDER, "/")
}

/// Flatten a path into a single URL segment.
pub fn encode_path_id(path: &str) -> String {
    path.replace('/', SLASH_PLACEHOLDER)
}

#[derive(Debug, Clone)]
pub struct LocalSlideSource {
    root: PathBuf,
}

impl LocalSlideSource {
    /// Create a source serving files under `root`.
    ///
    /// The root is canonicalized once so containment checks compare resolved paths.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, IoError> {
        let root = root.as_ref();
        let display = root.display().to_string();
        let root = std::fs::canonicalize(root).map_err(|e| IoError::from_std(&display, e))?;
        if !root.is_dir() {
            return Err(IoError::NotFound(display));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a request path to a canonical file path inside the root.
    ///
    /// Blocking filesystem call; async callers go through [`SlideSource::resolve`].
    pub fn resolve_path(&self, raw: &str) -> Result<PathBuf, IoError> {
        let decoded = decode_path_id(raw);
        let trimmed = decoded.trim();
        if trimmed.is_empty() {
            return Err(IoError::NotFound(raw.to_string()));
        }

        let candidate = Path::new(trimmed);
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(IoError::NotFound(raw.to_string()));
        }

        let joined = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        };

        let canonical = std::fs::canonicalize(&joined).map_err(|e| IoError::from_std(raw, e))?;
        if !canonical.starts_with(&self.root) || !canonical.is_file() {
            return Err(IoError::NotFound(raw.to_string()));
        }
        Ok(canonical)
    }

    /// Path of `file` relative to the root, with `/` separators.
    pub fn relative_id(&self, file: &Path) -> Option<String> {
        let relative = file.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl SlideSource for LocalSlideSource {
    type Reader = LocalFileReader;

    async fn resolve(&self, path: &str) -> Result<String, IoError> {
        let source = self.clone();
        let raw = path.to_string();
        let resolved = task::spawn_blocking(move || source.resolve_path(&raw))
            .await
            .map_err(|e| IoError::Read(format!("resolve task failed: {}", e)))??;
        Ok(resolved.to_string_lossy().into_owned())
    }

    async fn create_reader(&self, key: &str) -> Result<LocalFileReader, IoError> {
        let resolved = self.resolve(key).await?;
        LocalFileReader::open(PathBuf::from(&resolved), resolved).await
    }
}
