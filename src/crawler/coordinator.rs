//! Crawl controller - main crawl orchestration logic
//!
//! This module contains the crawl loop that ties the other components together:
//! - Resuming from the checkpoint and seeding the frontier
//! - Claiming links and loading them through the session pool
//! - Extracting, merging and persisting what each page yields
//! - Recording exhausted links and checkpointing after every link
//! - Honoring the stop flag between rounds

use crate::catalog::{load_catalog, TileCatalog};
use crate::config::{Config, CrawlerConfig};
use crate::crawler::extractor::{Extraction, ExtractionAdapter, SelectorExtractor};
use crate::crawler::frontier::{Frontier, FrontierPoll, Link};
use crate::crawler::navigator::{HttpLauncher, SessionLauncher};
use crate::crawler::recovery::{FaultRecovery, LoadOutcome, PageOf};
use crate::storage::{
    plan_resume, Checkpoint, CheckpointManager, ErrorLog, ErrorLogEntry, MasterStore,
    MergeOutcome, PersistPolicy, ResumeKind, ResumePlan,
};
use crate::url::canonical_url;
use crate::HarvestError;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative stop request shared between the controller and a signal handler
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the crawl to stop after the current round
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters describing one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub links_completed: u64,
    /// Links that exhausted their retry budget
    pub links_failed: u64,
    /// Records accepted by the master store (inserted, updated or unchanged)
    pub records_merged: u64,
    pub records_inserted: u64,
    pub records_updated: u64,
    /// Records dropped for lack of a usable id
    pub records_rejected: u64,
    pub restarts: u64,
    pub extraction_failures: u64,
    /// True if the run ended on a stop request rather than an empty frontier
    pub stopped: bool,
}

/// Drives the crawl for one run
pub struct CrawlController<L, E>
where
    L: SessionLauncher,
    E: ExtractionAdapter<PageOf<L>>,
{
    catalog: TileCatalog,
    frontier: Frontier,
    store: MasterStore,
    checkpoints: CheckpointManager,
    error_log: ErrorLog,
    extractor: E,
    slots: Vec<FaultRecovery<L>>,
    pacing: Duration,
    progress_interval: u64,
    stop: StopFlag,
    summary: RunSummary,
    /// Last link whose checkpoint has not been written yet
    unsaved: Option<Link>,
}

impl<L, E> CrawlController<L, E>
where
    L: SessionLauncher,
    E: ExtractionAdapter<PageOf<L>>,
{
    /// Creates a controller with one session slot per configured pool member
    ///
    /// # Arguments
    ///
    /// * `settings` - Crawler behavior (pacing, retry budget, pool size, order)
    /// * `catalog` - Tiles to crawl, in order
    /// * `store` - Master dataset to merge into
    /// * `checkpoints` - Checkpoint file to resume from and update
    /// * `error_log` - Log receiving exhausted links
    /// * `launcher` - Starts navigator sessions
    /// * `extractor` - Turns pages into records and links
    pub fn new(
        settings: &CrawlerConfig,
        catalog: TileCatalog,
        store: MasterStore,
        checkpoints: CheckpointManager,
        error_log: ErrorLog,
        launcher: L,
        extractor: E,
    ) -> Self {
        let launcher = Arc::new(launcher);
        let slots = (0..settings.session_pool_size.max(1) as usize)
            .map(|slot| FaultRecovery::new(Arc::clone(&launcher), settings.retry_budget, slot))
            .collect();

        let frontier = Frontier::new(settings.order, settings.shuffle_seed)
            .with_max_per_tile(settings.max_pages_per_tile);

        Self {
            catalog,
            frontier,
            store,
            checkpoints,
            error_log,
            extractor,
            slots,
            pacing: Duration::from_millis(settings.pacing_delay),
            progress_interval: settings.progress_interval.max(1),
            stop: StopFlag::new(),
            summary: RunSummary::default(),
            unsaved: None,
        }
    }

    /// Uses an externally owned stop flag
    pub fn with_stop_flag(mut self, stop: StopFlag) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn store(&self) -> &MasterStore {
        &self.store
    }

    /// Runs the crawl until the frontier is empty or a stop is requested
    ///
    /// This method:
    /// 1. Plans the resume point from the checkpoint and seeds the frontier
    /// 2. Claims up to one link per session slot from the current tile
    /// 3. Loads the claimed links concurrently, pacing after each load
    /// 4. Extracts, merges and checkpoints each link in claim order
    /// 5. Flushes the master store and writes a final checkpoint
    /// 6. Closes every session, also when an earlier step failed
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run ended normally or on request
    /// * `Err(HarvestError)` - Output could not be persisted
    pub async fn run(&mut self) -> Result<RunSummary, HarvestError> {
        let checkpoint = self.checkpoints.load()?;
        let plan = plan_resume(checkpoint.as_ref(), &self.catalog);
        self.apply_plan(&plan);

        tracing::info!(
            "Starting crawl: {} tiles, {} links queued, {} session slot(s)",
            self.catalog.len(),
            self.frontier.pending_len(),
            self.slots.len()
        );

        let start_time = Instant::now();
        let finished = match self.crawl_rounds(start_time).await {
            Ok(()) => self.finish(),
            Err(e) => Err(e),
        };
        self.shutdown_slots().await;
        finished?;

        tracing::info!(
            "Crawl finished: {} links completed, {} failed, {} records in master store, {:?}",
            self.summary.links_completed,
            self.summary.links_failed,
            self.store.count(),
            start_time.elapsed()
        );

        Ok(self.summary.clone())
    }

    /// Claims, loads and processes rounds until the frontier empties or a stop is requested
    async fn crawl_rounds(&mut self, start_time: Instant) -> Result<(), HarvestError> {
        let mut processed: u64 = 0;

        loop {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested, ending crawl after {} links", processed);
                self.summary.stopped = true;
                return Ok(());
            }

            let claimed = self.claim();
            if claimed.is_empty() {
                tracing::info!("Frontier is empty, crawl complete");
                return Ok(());
            }

            let results = self.load_round(claimed).await;
            for (link, outcome) in results {
                self.process(link, outcome).await?;
                processed += 1;

                if processed % self.progress_interval == 0 {
                    self.report_progress(processed, start_time.elapsed());
                }
            }
        }
    }

    /// Seeds the frontier according to the resume plan
    fn apply_plan(&mut self, plan: &ResumePlan) {
        match plan.kind {
            ResumeKind::Fresh => {
                tracing::info!("No checkpoint found, starting from the first tile")
            }
            ResumeKind::Exact => tracing::info!(
                "Resuming inside tile {} ({} links done, {} queued)",
                plan.start_tile,
                plan.completed.len(),
                plan.pending.len()
            ),
            ResumeKind::TileChanged | ResumeKind::Diverged => {
                tracing::info!("Resuming from the start of tile {}", plan.start_tile)
            }
        }

        for tile in self.catalog.iter() {
            if tile.index < plan.start_tile {
                self.frontier.mark_visited(tile.seed_url.clone());
            } else if tile.index == plan.start_tile {
                self.frontier
                    .restore_tile(tile, &plan.completed, &plan.pending);
            } else {
                self.frontier.seed(std::iter::once(Link::seed(tile)));
            }
        }
    }

    /// Claims up to one link per slot
    ///
    /// The frontier refuses to leave a tile while links of it are in flight, so every
    /// link of a round belongs to the same tile.
    fn claim(&mut self) -> Vec<Link> {
        let mut claimed = Vec::with_capacity(self.slots.len());
        while claimed.len() < self.slots.len() {
            match self.frontier.next() {
                FrontierPoll::Ready(link) => claimed.push(link),
                FrontierPoll::Waiting | FrontierPoll::Empty => break,
            }
        }
        claimed
    }

    async fn load_round(&mut self, links: Vec<Link>) -> Vec<(Link, LoadOutcome<PageOf<L>>)> {
        let pacing = self.pacing;
        let loads = self
            .slots
            .iter_mut()
            .zip(links)
            .map(|(slot, link)| async move {
                tracing::debug!("Loading {}", link.url);
                let outcome = slot.load(&link.url).await;
                if matches!(outcome, LoadOutcome::Loaded { .. }) && !pacing.is_zero() {
                    tokio::time::sleep(pacing).await;
                }
                (link, outcome)
            });

        join_all(loads).await
    }

    /// Extracts, merges and checkpoints one loaded (or exhausted) link
    async fn process(
        &mut self,
        link: Link,
        outcome: LoadOutcome<PageOf<L>>,
    ) -> Result<(), HarvestError> {
        match outcome {
            LoadOutcome::Loaded { page, .. } => {
                let extraction = match self.extractor.extract(&page, &link.tile).await {
                    Ok(extraction) => extraction,
                    Err(e) => {
                        tracing::warn!("Extraction failed for {}: {}", link.url, e);
                        self.summary.extraction_failures += 1;
                        Extraction::default()
                    }
                };

                self.merge_records(&extraction);
                self.store.persist_if_due()?;

                let discovered: Vec<String> = extraction
                    .links
                    .iter()
                    .filter_map(|raw| match canonical_url(raw) {
                        Ok(url) => Some(url.to_string()),
                        Err(e) => {
                            tracing::debug!("Ignoring discovered link {}: {}", raw, e);
                            None
                        }
                    })
                    .collect();
                let queued = self.frontier.discovered(discovered, &link.tile);

                tracing::debug!(
                    "Processed {}: {} records, {} new links",
                    link.url,
                    extraction.records.len(),
                    queued
                );

                self.frontier.complete(&link);
                self.summary.links_completed += 1;
            }
            LoadOutcome::Exhausted {
                attempts,
                last_error,
            } => {
                tracing::error!(
                    "Giving up on {} after {} attempts: {}",
                    link.url,
                    attempts,
                    last_error
                );
                self.error_log.append(&ErrorLogEntry::new(
                    link.url.clone(),
                    link.tile.index,
                    attempts,
                    last_error.to_string(),
                ))?;
                self.frontier.fail(&link);
                self.summary.links_failed += 1;
            }
        }

        self.save_checkpoint(link)
    }

    fn merge_records(&mut self, extraction: &Extraction) {
        for raw in &extraction.records {
            match self.store.merge(raw) {
                MergeOutcome::Inserted => {
                    self.summary.records_merged += 1;
                    self.summary.records_inserted += 1;
                }
                MergeOutcome::Updated { .. } => {
                    self.summary.records_merged += 1;
                    self.summary.records_updated += 1;
                }
                MergeOutcome::Unchanged => self.summary.records_merged += 1,
                MergeOutcome::Rejected => self.summary.records_rejected += 1,
            }
        }
    }

    /// Writes the checkpoint for `link`, or defers it while merges are not yet durable
    fn save_checkpoint(&mut self, link: Link) -> Result<(), HarvestError> {
        if self.store.is_dirty() {
            tracing::trace!(
                "Deferring checkpoint for {} until the master store is persisted",
                link.url
            );
            self.unsaved = Some(link);
            return Ok(());
        }

        let checkpoint = Checkpoint::capture(
            &self.catalog,
            &link.tile,
            link.url.clone(),
            self.frontier.completed_in(&link.tile),
            self.frontier.pending_in(&link.tile),
        );
        self.checkpoints.save(&checkpoint)?;
        self.unsaved = None;
        Ok(())
    }

    /// Persists what is left of the master store, then the deferred checkpoint
    fn finish(&mut self) -> Result<(), HarvestError> {
        self.store.flush()?;
        if let Some(link) = self.unsaved.take() {
            self.save_checkpoint(link)?;
        }
        Ok(())
    }

    /// Closes every session, whether the run succeeded or not
    async fn shutdown_slots(&mut self) {
        for slot in &mut self.slots {
            self.summary.restarts += slot.restarts();
            slot.shutdown().await;
        }
    }

    fn report_progress(&self, processed: u64, elapsed: Duration) {
        let rate = processed as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
        tracing::info!(
            "Progress: {} links processed, {} pending, {} records, {:.2} links/sec",
            processed,
            self.frontier.pending_len(),
            self.store.count(),
            rate
        );
    }
}

/// Runs a complete crawl from a configuration
///
/// This is the main entry point used by the binary. It will:
/// 1. Load the tile catalog
/// 2. Open the master store, checkpoint and error log
/// 3. Build the HTTP launcher and selector extractor
/// 4. Run the crawl controller until done or stopped
///
/// # Arguments
///
/// * `config` - The validated configuration
/// * `stop` - Flag a signal handler can set to end the crawl gracefully
///
/// # Returns
///
/// * `Ok(RunSummary)` - Crawl finished or stopped cleanly
/// * `Err(HarvestError)` - Crawl could not start or could not persist its output
pub async fn run_crawl(config: &Config, stop: StopFlag) -> Result<RunSummary, HarvestError> {
    let catalog = load_catalog(&config.catalog.sources)?;
    let store = MasterStore::open(
        &config.output.master_path,
        PersistPolicy::every(config.crawler.persist_every),
    )?;
    let checkpoints = CheckpointManager::new(&config.output.checkpoint_path);
    let error_log = ErrorLog::new(&config.output.error_log_path);
    let extractor = SelectorExtractor::from_config(&config.extractor)?;
    let launcher = HttpLauncher::new(config.http.clone());

    let mut controller = CrawlController::new(
        &config.crawler,
        catalog,
        store,
        checkpoints,
        error_log,
        launcher,
        extractor,
    )
    .with_stop_flag(stop);

    controller.run().await
}
