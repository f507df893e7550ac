//! Where exported documents end up.

use std::path::{Path, PathBuf};

use super::ExportError;

/// Receives finished documents.
pub trait DownloadSink {
    /// Store `bytes` under (a variant of) `filename`; returns where it landed.
    fn deliver(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError>;
}

/// Saves into a directory, never overwriting: a clash gets ` (1)`, ` (2)`, …
/// appended to the stem, the way browsers name repeated downloads.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn free_path(&self, filename: &str) -> PathBuf {
        let candidate = self.dir.join(filename);
        if !candidate.exists() {
            return candidate;
        }
        let (stem, ext) = match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (filename, None),
        };
        (1..)
            .map(|n| match ext {
                Some(ext) => self.dir.join(format!("{stem} ({n}).{ext}")),
                None => self.dir.join(format!("{stem} ({n})")),
            })
            .find(|p| !p.exists())
            .unwrap_or(candidate)
    }
}

impl DownloadSink for DirectorySink {
    fn deliver(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
        let delivery = |source: std::io::Error| ExportError::Delivery {
            filename: filename.to_string(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(delivery)?;
        let path = self.free_path(filename);
        std::fs::write(&path, bytes).map_err(delivery)?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Export saved");
        Ok(path)
    }
}
