use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::task;

use super::range_reader::check_bounds;
use super::RangeReader;
use crate::error::IoError;

/// Local-disk implementation of RangeReader.
///
/// Reads are positional (`pread` on unix, `seek_read` on windows) and run on the
/// blocking pool, so one open file can serve any number of concurrent requests
/// without a shared cursor. The file size is read once on open.
#[derive(Clone)]
pub struct LocalFileReader {
    file: Arc<File>,
    path: PathBuf,
    size: u64,
    identifier: String,
}

impl LocalFileReader {
    /// Open `path` for reading.
    ///
    /// `identifier` is the caller's name for the file (usually the request path),
    /// used in errors and logs. Directories are reported as `NotFound`.
    pub async fn open(
        path: impl Into<PathBuf>,
        identifier: impl Into<String>,
    ) -> Result<Self, IoError> {
        let path = path.into();
        let identifier = identifier.into();

        let open_path = path.clone();
        let open_id = identifier.clone();
        let (file, size) = task::spawn_blocking(move || -> Result<(File, u64), IoError> {
            let file = File::open(&open_path).map_err(|e| IoError::from_std(&open_id, e))?;
            let metadata = file.metadata().map_err(|e| IoError::from_std(&open_id, e))?;
            if !metadata.is_file() {
                return Err(IoError::NotFound(open_id));
            }
            Ok((file, metadata.len()))
        })
        .await
        .map_err(|e| IoError::Read(format!("open task failed: {}", e)))??;

        Ok(Self {
            file: Arc::new(file),
            path,
            size,
            identifier,
        })
    }

    /// Filesystem path this reader was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RangeReader for LocalFileReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_bounds(offset, len, self.size)?;

        if len == 0 {
            return Ok(Bytes::new());
        }

        let file = Arc::clone(&self.file);
        let identifier = self.identifier.clone();
        task::spawn_blocking(move || {
            let mut buf = vec![0u8; len];
            read_at(&file, &mut buf, offset).map_err(|e| IoError::from_std(&identifier, e))?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|e| IoError::Read(format!("read task failed: {}", e)))?
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ))
            }
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
