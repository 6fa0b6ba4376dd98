//! Output module for reporting on crawl results
//!
//! This module handles:
//! - Loading statistics from the master dataset, checkpoint and error log
//! - Printing statistics and end-of-run summaries

pub mod stats;

pub use stats::{load_statistics, print_run_summary, print_statistics, FieldCoverage, RunStatistics};
