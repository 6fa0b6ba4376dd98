//! Checkpoint persistence and resume planning
//!
//! A checkpoint names the tile the crawl was working on when it last completed a link,
//! along with which links of that tile were done and which were still queued. On the next
//! run [`plan_resume`] compares the checkpoint against the freshly loaded catalog and
//! decides where to pick up.

use crate::catalog::{Tile, TileCatalog};
use crate::storage::atomic::write_atomic;
use crate::storage::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Durable pointer to the last fully processed link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Catalog position of the tile in progress
    pub source_index: usize,
    pub last_completed_url: String,
    /// Seed URL of the tile at `source_index`
    pub tile_url: String,
    /// Digest of the seed URLs of tiles `0..source_index`
    pub prefix_digest: String,
    /// Links of the tile in progress that were fully processed
    pub completed: Vec<String>,
    /// Links of the tile in progress that were discovered but not yet processed
    pub pending: Vec<String>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Captures the position after completing `last_completed_url` under `tile`
    pub fn capture(
        catalog: &TileCatalog,
        tile: &Tile,
        last_completed_url: impl Into<String>,
        completed: Vec<String>,
        pending: Vec<String>,
    ) -> Self {
        Self {
            source_index: tile.index,
            last_completed_url: last_completed_url.into(),
            tile_url: tile.seed_url.clone(),
            prefix_digest: catalog.prefix_digest(tile.index),
            completed,
            pending,
            saved_at: Utc::now(),
        }
    }
}

/// Reads and writes the checkpoint file
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the saved checkpoint
    ///
    /// # Returns
    ///
    /// * `Ok(Some(Checkpoint))` - A checkpoint from an earlier run
    /// * `Ok(None)` - No checkpoint exists, or the file was unreadable and has been set
    ///   aside as `<name>.corrupt.<timestamp>`
    /// * `Err(StorageError)` - The file could not be read or set aside
    pub fn load(&self) -> StorageResult<Option<Checkpoint>> {
        match self.read() {
            Err(StorageError::Corrupt { message, .. }) => {
                let aside = self.quarantine()?;
                tracing::warn!(
                    "Checkpoint {} is unreadable ({}); moved to {}",
                    self.path.display(),
                    message,
                    aside.display()
                );
                Ok(None)
            }
            other => other,
        }
    }

    /// Reads the checkpoint without touching the file
    ///
    /// An undecodable file is reported as [`StorageError::Corrupt`].
    pub fn read(&self) -> StorageResult<Option<Checkpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| StorageError::Read {
            path: self.path.display().to_string(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Persists a checkpoint, replacing the previous one atomically
    pub fn save(&self, checkpoint: &Checkpoint) -> StorageResult<()> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        write_atomic(&self.path, json.as_bytes())
    }

    /// Removes the checkpoint so the next run starts from the first tile
    pub fn clear(&self) -> StorageResult<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|source| StorageError::Write {
                path: self.path.display().to_string(),
                source,
            })?;
        }
        Ok(())
    }

    fn quarantine(&self) -> StorageResult<PathBuf> {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".corrupt.{}", Utc::now().timestamp()));
        let aside = self.path.with_file_name(name);

        std::fs::rename(&self.path, &aside).map_err(|source| StorageError::Write {
            path: aside.display().to_string(),
            source,
        })?;
        Ok(aside)
    }
}

/// How a resume relates to the previous run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    /// No checkpoint; start at the first tile
    Fresh,
    /// Catalog unchanged; continue inside the checkpointed tile
    Exact,
    /// Tiles before the checkpoint are unchanged but the checkpointed tile is not
    TileChanged,
    /// The catalog diverged before the checkpoint; start over from the first tile
    Diverged,
}

/// Where and how a run picks up
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePlan {
    pub kind: ResumeKind,
    /// First tile with unconsumed work; earlier tiles are treated as done
    pub start_tile: usize,
    /// Links of `start_tile` already processed
    pub completed: Vec<String>,
    /// Links of `start_tile` to re-queue alongside its seed
    pub pending: Vec<String>,
}

impl ResumePlan {
    fn from_tile(kind: ResumeKind, start_tile: usize) -> Self {
        Self {
            kind,
            start_tile,
            completed: Vec::new(),
            pending: Vec::new(),
        }
    }
}

/// Decides where to resume given the previous checkpoint and the current catalog
///
/// Work is never silently skipped: when the checkpoint cannot be matched against the
/// catalog, the plan falls back to the earliest point that is provably consumed.
pub fn plan_resume(checkpoint: Option<&Checkpoint>, catalog: &TileCatalog) -> ResumePlan {
    let Some(checkpoint) = checkpoint else {
        return ResumePlan::from_tile(ResumeKind::Fresh, 0);
    };

    let index = checkpoint.source_index;
    if index > catalog.len() || catalog.prefix_digest(index) != checkpoint.prefix_digest {
        tracing::warn!(
            "Catalog changed before checkpointed tile {}; restarting from the first tile",
            index
        );
        return ResumePlan::from_tile(ResumeKind::Diverged, 0);
    }

    match catalog.get(index) {
        Some(tile) if tile.seed_url == checkpoint.tile_url => ResumePlan {
            kind: ResumeKind::Exact,
            start_tile: index,
            completed: checkpoint.completed.clone(),
            pending: checkpoint.pending.clone(),
        },
        _ => {
            tracing::warn!(
                "Checkpointed tile {} ({}) no longer matches the catalog; restarting that tile",
                index,
                checkpoint.tile_url
            );
            ResumePlan::from_tile(ResumeKind::TileChanged, index)
        }
    }
}
