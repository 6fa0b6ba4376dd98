//! Storage module for durable crawl output
//!
//! This module owns everything the crawl writes to disk:
//! - the master dataset, merged field by field and persisted atomically
//! - the checkpoint that lets an interrupted run resume without repeating work
//! - the append-only error log of links that exhausted their retry budget
//!
//! All whole-file writes go through [`write_atomic`], so a crash mid-write leaves the
//! previous version of the file intact.

mod atomic;
mod checkpoint;
mod error_log;
mod master;

pub use atomic::write_atomic;
pub use checkpoint::{plan_resume, Checkpoint, CheckpointManager, ResumeKind, ResumePlan};
pub use error_log::{ErrorLog, ErrorLogEntry};
pub use master::{
    FieldEntry, FieldValue, MasterRecord, MasterStore, MergeOutcome, PersistPolicy, Provenance,
    RawFieldSet, UNKNOWN_MARKER,
};

use thiserror::Error;

/// Errors that can occur while reading or writing crawl output
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("Corrupt data in {path}: {message}")]
    Corrupt { path: String, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
