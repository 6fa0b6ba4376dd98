//! Statistics over persisted crawl output
//!
//! This module reads the master dataset, checkpoint and error log without modifying
//! them, and prints a human readable report.

use crate::config::OutputConfig;
use crate::crawler::RunSummary;
use crate::storage::{
    Checkpoint, CheckpointManager, ErrorLog, ErrorLogEntry, MasterStore, PersistPolicy,
    StorageError,
};
use std::collections::BTreeMap;

/// How complete one field is across the master dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldCoverage {
    pub known: usize,
    pub unknown: usize,
}

/// Snapshot of everything the crawl has written so far
#[derive(Debug, Clone)]
pub struct RunStatistics {
    /// Distinct entity ids in the master dataset
    pub total_records: usize,

    /// Records grouped by the zoom of the sighting that last improved them
    pub records_by_zoom: BTreeMap<u32, usize>,

    /// Known/unknown counts per field name
    pub field_coverage: BTreeMap<String, FieldCoverage>,

    /// Saved resume point, if any
    pub checkpoint: Option<Checkpoint>,

    /// Links that exhausted their retry budget
    pub failed_links: Vec<ErrorLogEntry>,
}

/// Loads statistics from the configured output files
///
/// # Arguments
///
/// * `output` - Paths of the master dataset, checkpoint and error log
///
/// # Returns
///
/// * `Ok(RunStatistics)` - Statistics; missing files count as empty
/// * `Err(StorageError)` - A file exists but could not be read
pub fn load_statistics(output: &OutputConfig) -> Result<RunStatistics, StorageError> {
    let store = MasterStore::open(&output.master_path, PersistPolicy::default())?;

    let mut records_by_zoom = BTreeMap::new();
    let mut field_coverage: BTreeMap<String, FieldCoverage> = BTreeMap::new();

    for (_, record) in store.iter() {
        *records_by_zoom.entry(record.provenance.zoom).or_insert(0) += 1;

        for (name, entry) in &record.fields {
            let coverage = field_coverage.entry(name.clone()).or_default();
            if entry.value.is_known() {
                coverage.known += 1;
            } else {
                coverage.unknown += 1;
            }
        }
    }

    let checkpoint = CheckpointManager::new(&output.checkpoint_path).read()?;
    let failed_links = ErrorLog::new(&output.error_log_path).read_entries()?;

    Ok(RunStatistics {
        total_records: store.count(),
        records_by_zoom,
        field_coverage,
        checkpoint,
        failed_links,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RunStatistics) {
    println!("=== Harvest Statistics ===\n");

    println!("Master dataset:");
    println!("  Records: {}", stats.total_records);
    for (zoom, count) in &stats.records_by_zoom {
        println!("  Zoom {}: {} records", zoom, count);
    }
    println!();

    if !stats.field_coverage.is_empty() {
        println!("Field coverage:");
        for (name, coverage) in &stats.field_coverage {
            let total = coverage.known + coverage.unknown;
            let percentage = if total > 0 {
                (coverage.known as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            println!(
                "  {}: {} known, {} unknown ({:.1}%)",
                name, coverage.known, coverage.unknown, percentage
            );
        }
        println!();
    }

    match &stats.checkpoint {
        Some(checkpoint) => {
            println!("Checkpoint:");
            println!("  Tile: {} ({})", checkpoint.source_index, checkpoint.tile_url);
            println!("  Last completed: {}", checkpoint.last_completed_url);
            println!(
                "  In tile: {} done, {} queued",
                checkpoint.completed.len(),
                checkpoint.pending.len()
            );
            println!("  Saved at: {}", checkpoint.saved_at.to_rfc3339());
        }
        None => println!("Checkpoint: none"),
    }
    println!();

    println!("Failed links: {}", stats.failed_links.len());
    for entry in stats.failed_links.iter().rev().take(5) {
        println!(
            "  - {} (tile {}, {} attempts): {}",
            entry.url, entry.tile_index, entry.attempts, entry.error
        );
    }
}

/// Prints the counters of a finished run
pub fn print_run_summary(summary: &RunSummary) {
    println!("=== Run Summary ===\n");
    println!("  Links completed: {}", summary.links_completed);
    println!("  Links failed: {}", summary.links_failed);
    println!(
        "  Records merged: {} ({} new, {} updated, {} rejected)",
        summary.records_merged,
        summary.records_inserted,
        summary.records_updated,
        summary.records_rejected
    );
    println!("  Session restarts: {}", summary.restarts);
    println!("  Extraction failures: {}", summary.extraction_failures);
    if summary.stopped {
        println!("\nStopped before the frontier was exhausted; rerun to resume.");
    }
}
