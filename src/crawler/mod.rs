//! Crawler module for tile-driven page harvesting
//!
//! This module contains the core crawling logic, including:
//! - The tile-batched crawl frontier
//! - Navigator sessions and their HTTP implementation
//! - Extraction adapters and the selector-driven extractor
//! - Fault recovery with bounded per-link retries
//! - Overall crawl coordination

mod coordinator;
mod extractor;
mod frontier;
mod navigator;
mod recovery;

pub use coordinator::{run_crawl, CrawlController, RunSummary, StopFlag};
pub use extractor::{Extraction, ExtractionAdapter, ExtractionError, SelectorExtractor};
pub use frontier::{Frontier, FrontierPoll, Link};
pub use navigator::{
    build_http_client, HttpLauncher, HttpNavigator, HttpPage, NavigationError, Navigator,
    SessionLauncher,
};
pub use recovery::{FaultRecovery, LoadOutcome, PageOf};
