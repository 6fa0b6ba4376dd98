//! Tile-Harvest: a resumable, tile-driven listing harvester
//!
//! This crate crawls paginated listing pages seeded from a catalog of geographic tiles,
//! merges every sighting of an entity into a single field-level master dataset, and
//! checkpoints its progress so that an interrupted run resumes without repeating work.

pub mod catalog;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Tile-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
}

/// Tile catalog errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog source {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Catalog source {path} contains no usable tiles")]
    EmptySource { path: String },

    #[error("Invalid seed URL '{url}' on line {line} of {path}: {reason}")]
    InvalidSeed {
        path: String,
        line: usize,
        url: String,
        reason: String,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

// Re-export commonly used types
pub use catalog::{Bounds, Tile, TileCatalog};
pub use config::Config;
pub use crawler::{CrawlController, Frontier, Link, RunSummary, StopFlag};
pub use state::{LinkState, SessionState};
pub use storage::{CheckpointManager, FieldValue, MasterRecord, MasterStore, RawFieldSet};
pub use url::canonical_url;
