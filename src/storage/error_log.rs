use crate::storage::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// One link that exhausted its retry budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub url: String,
    pub tile_index: usize,
    pub attempts: u32,
    /// Last error observed
    pub error: String,
    pub logged_at: DateTime<Utc>,
}

impl ErrorLogEntry {
    pub fn new(
        url: impl Into<String>,
        tile_index: usize,
        attempts: u32,
        error: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            tile_index,
            attempts,
            error: error.into(),
            logged_at: Utc::now(),
        }
    }
}

/// Append-only JSON-lines log of failed links
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and syncs it to disk
    pub fn append(&self, entry: &ErrorLogEntry) -> StorageResult<()> {
        let write_err = |source| StorageError::Write {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).map_err(write_err)?;
        file.sync_data().map_err(write_err)?;
        Ok(())
    }

    /// Reads every decodable entry; a missing log reads as empty
    pub fn read_entries(&self) -> StorageResult<Vec<ErrorLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| StorageError::Read {
            path: self.path.display().to_string(),
            source,
        })?;

        let mut entries = Vec::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    "Skipping unreadable line {} of {}: {}",
                    number + 1,
                    self.path.display(),
                    e
                ),
            }
        }
        Ok(entries)
    }
}
