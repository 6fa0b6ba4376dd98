//! Integration tests for the crawl controller
//!
//! Most tests drive the controller through scripted in-memory sessions so that load
//! failures, restarts and interruptions are deterministic. The last tests run the real
//! HTTP navigator and selector extractor against a mock server.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tile_harvest::catalog::{Bounds, CatalogEntry, Tile, TileCatalog};
use tile_harvest::config::{
    CatalogConfig, Config, CrawlOrder, CrawlerConfig, ExtractorConfig, FieldRule, HttpConfig,
    OutputConfig,
};
use tile_harvest::crawler::{
    run_crawl, CrawlController, Extraction, ExtractionAdapter, ExtractionError, NavigationError,
    Navigator, SessionLauncher, StopFlag,
};
use tile_harvest::output::load_statistics;
use tile_harvest::state::LinkState;
use tile_harvest::storage::{
    Checkpoint, CheckpointManager, ErrorLog, FieldValue, MasterRecord, MasterStore,
    PersistPolicy, Provenance, RawFieldSet,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const T0: &str = "https://listings.example/t0";
const T0_P2: &str = "https://listings.example/t0/p2";
const T1: &str = "https://listings.example/t1";

/// A page as the scripted site serves it
#[derive(Debug, Clone, Default)]
struct ScriptedPage {
    url: String,
    /// (id, price) pairs; a missing price is reported as unknown
    records: Vec<(String, Option<String>)>,
    links: Vec<String>,
}

/// Shared state of the scripted site, observed by the tests
#[derive(Default)]
struct Site {
    pages: HashMap<String, ScriptedPage>,
    /// Remaining failures per URL
    failures: Mutex<HashMap<String, u32>>,
    /// Every load attempt, in order
    loads: Mutex<Vec<String>>,
    launches: AtomicU32,
    closes: AtomicU32,
    active: AtomicUsize,
    peak: AtomicUsize,
    delay: Duration,
}

impl Site {
    fn page(mut self, url: &str, records: &[(&str, Option<&str>)], links: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            ScriptedPage {
                url: url.to_string(),
                records: records
                    .iter()
                    .map(|(id, price)| (id.to_string(), price.map(str::to_string)))
                    .collect(),
                links: links.iter().map(|l| l.to_string()).collect(),
            },
        );
        self
    }

    fn failing(self, url: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(url.to_string(), times);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }

    fn loads_of(&self, url: &str) -> usize {
        self.loads().iter().filter(|u| *u == url).count()
    }

    fn clear_loads(&self) {
        self.loads.lock().unwrap().clear();
    }
}

struct ScriptedSession {
    site: Arc<Site>,
    alive: bool,
}

#[async_trait]
impl Navigator for ScriptedSession {
    type Page = ScriptedPage;

    async fn load(&mut self, url: &str) -> Result<ScriptedPage, NavigationError> {
        if !self.alive {
            return Err(NavigationError::Fatal("session is closed".to_string()));
        }

        let now = self.site.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.site.peak.fetch_max(now, Ordering::SeqCst);
        if !self.site.delay.is_zero() {
            tokio::time::sleep(self.site.delay).await;
        }
        self.site.active.fetch_sub(1, Ordering::SeqCst);

        self.site.loads.lock().unwrap().push(url.to_string());

        let fail = {
            let mut failures = self.site.failures.lock().unwrap();
            match failures.get_mut(url) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            return Err(NavigationError::Transient(format!("timed out loading {}", url)));
        }

        self.site
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| NavigationError::Transient(format!("HTTP 404 for {}", url)))
    }

    async fn is_alive(&mut self) -> bool {
        self.alive
    }

    async fn close(&mut self) -> Result<(), NavigationError> {
        self.alive = false;
        self.site.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ScriptedLauncher {
    site: Arc<Site>,
}

#[async_trait]
impl SessionLauncher for ScriptedLauncher {
    type Session = ScriptedSession;

    async fn launch(&self) -> Result<ScriptedSession, NavigationError> {
        self.site.launches.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSession {
            site: Arc::clone(&self.site),
            alive: true,
        })
    }
}

/// Reads the scripted records; can be told to fail on, or stop after, given pages
#[derive(Default)]
struct ScriptedExtractor {
    fail_on: HashSet<String>,
    stop_after: Option<(String, StopFlag)>,
    /// Output directory whose files are checked before each extraction
    watch_dir: Option<PathBuf>,
    /// (page url, master file exists, checkpoint file exists)
    observed: Arc<Mutex<Vec<(String, bool, bool)>>>,
}

#[async_trait]
impl ExtractionAdapter<ScriptedPage> for ScriptedExtractor {
    async fn extract(
        &self,
        page: &ScriptedPage,
        tile: &Tile,
    ) -> Result<Extraction, ExtractionError> {
        if let Some(dir) = &self.watch_dir {
            self.observed.lock().unwrap().push((
                page.url.clone(),
                dir.join("master.json").exists(),
                dir.join("checkpoint.json").exists(),
            ));
        }

        if let Some((url, stop)) = &self.stop_after {
            if *url == page.url {
                stop.request_stop();
            }
        }

        if self.fail_on.contains(&page.url) {
            return Err(ExtractionError::Unparseable {
                url: page.url.clone(),
                reason: "record container missing".to_string(),
            });
        }

        let records = page
            .records
            .iter()
            .map(|(id, price)| {
                let price = price
                    .as_deref()
                    .map(FieldValue::from_text)
                    .unwrap_or(FieldValue::Unknown);
                RawFieldSet::new(
                    id.clone(),
                    tile.zoom,
                    Provenance::from_tile(tile, page.url.clone()),
                )
                .with_field("price", price)
            })
            .collect();

        Ok(Extraction {
            records,
            links: page.links.clone(),
        })
    }
}

/// Helper to create crawler settings for tests
fn create_test_config() -> CrawlerConfig {
    CrawlerConfig {
        pacing_delay: 0,
        retry_budget: 3,
        session_pool_size: 1,
        persist_every: 1,
        order: CrawlOrder::Fifo,
        max_pages_per_tile: None,
        progress_interval: 10,
        shuffle_seed: Some(7),
    }
}

fn create_test_catalog(tiles: &[(&str, u32)]) -> TileCatalog {
    TileCatalog::from_entries(
        tiles
            .iter()
            .map(|(url, zoom)| CatalogEntry {
                bounds: Bounds::new(4.55, -74.15, 4.56, -74.14),
                zoom: *zoom,
                seed_url: url.to_string(),
            })
            .collect(),
    )
}

/// Two tiles; the first paginates once, and its second page links back to the first
fn create_test_site() -> Site {
    Site::default()
        .page(T0, &[("101", None)], &[T0_P2])
        .page(T0_P2, &[("102", Some("$80"))], &[T0])
        .page(T1, &[("101", Some("$50"))], &[])
}

fn create_controller(
    dir: &TempDir,
    settings: &CrawlerConfig,
    catalog: TileCatalog,
    site: &Arc<Site>,
    extractor: ScriptedExtractor,
) -> CrawlController<ScriptedLauncher, ScriptedExtractor> {
    let store = MasterStore::open(
        &dir.path().join("master.json"),
        PersistPolicy::every(settings.persist_every),
    )
    .unwrap();

    CrawlController::new(
        settings,
        catalog,
        store,
        CheckpointManager::new(dir.path().join("checkpoint.json")),
        ErrorLog::new(dir.path().join("errors.jsonl")),
        ScriptedLauncher {
            site: Arc::clone(site),
        },
        extractor,
    )
}

fn master_snapshot(dir: &TempDir) -> BTreeMap<String, MasterRecord> {
    let store = MasterStore::open(&dir.path().join("master.json"), PersistPolicy::default())
        .unwrap();
    store
        .iter()
        .map(|(id, record)| (id.clone(), record.clone()))
        .collect()
}

#[tokio::test]
async fn test_crawl_merges_sightings_across_tiles() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(create_test_site());
    let catalog = create_test_catalog(&[(T0, 14), (T1, 16)]);

    let mut controller = create_controller(
        &dir,
        &create_test_config(),
        catalog,
        &site,
        ScriptedExtractor::default(),
    );
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.links_completed, 3);
    assert_eq!(summary.links_failed, 0);
    assert_eq!(summary.records_inserted, 2);
    assert_eq!(summary.records_updated, 1);
    assert!(!summary.stopped);

    // The back-link from page 2 to the seed must not cause a second load
    assert_eq!(site.loads(), vec![T0, T0_P2, T1]);

    let store = controller.store();
    assert_eq!(store.count(), 2);
    let listing = store.get("101").unwrap();
    assert_eq!(listing.value("price"), Some(&FieldValue::Known("$50".to_string())));
    assert_eq!(listing.quality("price"), Some(16));
    assert_eq!(listing.provenance.page_url, T1);

    // The persisted file agrees with the in-memory store
    assert_eq!(master_snapshot(&dir).len(), 2);

    let checkpoint = CheckpointManager::new(dir.path().join("checkpoint.json"))
        .read()
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.source_index, 1);
    assert_eq!(checkpoint.last_completed_url, T1);
    assert!(checkpoint.pending.is_empty());
}

#[tokio::test]
async fn test_two_failures_then_success_restarts_twice() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(Site::default().page(T0, &[("101", None)], &[]).failing(T0, 2));

    let mut controller = create_controller(
        &dir,
        &create_test_config(),
        create_test_catalog(&[(T0, 14)]),
        &site,
        ScriptedExtractor::default(),
    );
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.restarts, 2);
    assert_eq!(summary.links_completed, 1);
    assert_eq!(summary.links_failed, 0);
    assert_eq!(site.loads_of(T0), 3);
    // Initial launch plus one per restart
    assert_eq!(site.launches.load(Ordering::SeqCst), 3);

    assert!(ErrorLog::new(dir.path().join("errors.jsonl"))
        .read_entries()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_exhausted_link_is_logged_and_never_retried() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(create_test_site().failing(T0, 3));

    let mut controller = create_controller(
        &dir,
        &create_test_config(),
        create_test_catalog(&[(T0, 14), (T1, 16)]),
        &site,
        ScriptedExtractor::default(),
    );
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.links_failed, 1);
    // The crawl moves on to the next tile
    assert_eq!(summary.links_completed, 1);
    assert_eq!(site.loads_of(T0), 3);
    assert_eq!(site.loads_of(T0_P2), 0);

    assert_eq!(
        controller.frontier().state_of(T0),
        Some(LinkState::VisitedWithFailure)
    );
    assert_eq!(controller.frontier().state_of(T1), Some(LinkState::Visited));

    let entries = ErrorLog::new(dir.path().join("errors.jsonl"))
        .read_entries()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].url, T0);
    assert_eq!(entries[0].tile_index, 0);
    assert_eq!(entries[0].attempts, 3);
}

#[tokio::test]
async fn test_stop_and_resume_matches_uninterrupted_run() {
    let catalog = || create_test_catalog(&[(T0, 14), (T1, 16)]);

    // Reference: one uninterrupted run
    let reference_dir = TempDir::new().unwrap();
    let reference_site = Arc::new(create_test_site());
    create_controller(
        &reference_dir,
        &create_test_config(),
        catalog(),
        &reference_site,
        ScriptedExtractor::default(),
    )
    .run()
    .await
    .unwrap();

    // Interrupted after the first seed page
    let dir = TempDir::new().unwrap();
    let site = Arc::new(create_test_site());
    let stop = StopFlag::new();
    let extractor = ScriptedExtractor {
        stop_after: Some((T0.to_string(), stop.clone())),
        ..Default::default()
    };
    let summary = create_controller(&dir, &create_test_config(), catalog(), &site, extractor)
        .with_stop_flag(stop)
        .run()
        .await
        .unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.links_completed, 1);

    let checkpoint = CheckpointManager::new(dir.path().join("checkpoint.json"))
        .read()
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.source_index, 0);
    assert_eq!(checkpoint.completed, vec![T0.to_string()]);
    assert_eq!(checkpoint.pending, vec![T0_P2.to_string()]);

    // Second run picks up inside the first tile without reloading the seed
    site.clear_loads();
    let summary = create_controller(
        &dir,
        &create_test_config(),
        catalog(),
        &site,
        ScriptedExtractor::default(),
    )
    .run()
    .await
    .unwrap();

    assert!(!summary.stopped);
    assert_eq!(site.loads(), vec![T0_P2, T1]);
    assert_eq!(master_snapshot(&dir), master_snapshot(&reference_dir));
}

#[tokio::test]
async fn test_resume_after_crash_between_merge_and_checkpoint() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(create_test_site());
    let catalog = create_test_catalog(&[(T0, 14)]);

    create_controller(
        &dir,
        &create_test_config(),
        catalog.clone(),
        &site,
        ScriptedExtractor::default(),
    )
    .run()
    .await
    .unwrap();
    let before = master_snapshot(&dir);

    // Page 2 reached the master file but its checkpoint never did
    let stale = Checkpoint::capture(
        &catalog,
        catalog.get(0).unwrap(),
        T0,
        vec![T0.to_string()],
        vec![T0_P2.to_string()],
    );
    CheckpointManager::new(dir.path().join("checkpoint.json"))
        .save(&stale)
        .unwrap();

    site.clear_loads();
    let summary = create_controller(
        &dir,
        &create_test_config(),
        catalog,
        &site,
        ScriptedExtractor::default(),
    )
    .run()
    .await
    .unwrap();

    // Page 2 is processed again, and merging it again changes nothing
    assert_eq!(site.loads(), vec![T0_P2]);
    assert_eq!(summary.records_inserted, 0);
    assert_eq!(summary.records_updated, 0);
    assert_eq!(summary.records_merged, 1);
    assert_eq!(master_snapshot(&dir), before);
}

#[tokio::test]
async fn test_corrupt_checkpoint_restarts_from_first_tile() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("checkpoint.json"), "{ not json").unwrap();
    let site = Arc::new(create_test_site());

    let summary = create_controller(
        &dir,
        &create_test_config(),
        create_test_catalog(&[(T0, 14), (T1, 16)]),
        &site,
        ScriptedExtractor::default(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.links_completed, 3);
    assert_eq!(site.loads()[0], T0);

    let set_aside = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().contains(".corrupt."));
    assert!(set_aside);
}

#[tokio::test]
async fn test_pool_loads_links_of_one_tile_concurrently() {
    let dir = TempDir::new().unwrap();
    let links = [
        "https://listings.example/t0/a",
        "https://listings.example/t0/b",
        "https://listings.example/t0/c",
        "https://listings.example/t0/d",
    ];
    let mut site = Site::default()
        .page(T0, &[], &links)
        .page(T1, &[("201", Some("$20"))], &[])
        .with_delay(Duration::from_millis(20));
    for (i, link) in links.iter().enumerate() {
        let id = format!("10{}", i);
        site = site.page(link, &[(id.as_str(), Some("$10"))], &[]);
    }
    let site = Arc::new(site);

    let settings = CrawlerConfig {
        session_pool_size: 3,
        ..create_test_config()
    };
    let summary = create_controller(
        &dir,
        &settings,
        create_test_catalog(&[(T0, 14), (T1, 16)]),
        &site,
        ScriptedExtractor::default(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.links_completed, 6);
    assert_eq!(summary.records_inserted, 5);

    let peak = site.peak.load(Ordering::SeqCst);
    assert!(peak >= 2, "expected concurrent loads, peak was {}", peak);
    assert!(peak <= 3, "pool size exceeded, peak was {}", peak);

    // The second tile starts only after every link of the first is done
    assert_eq!(site.loads().last().map(String::as_str), Some(T1));
}

#[tokio::test]
async fn test_extraction_failure_still_completes_link() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(create_test_site());
    let extractor = ScriptedExtractor {
        fail_on: HashSet::from([T0_P2.to_string()]),
        ..Default::default()
    };

    let mut controller = create_controller(
        &dir,
        &create_test_config(),
        create_test_catalog(&[(T0, 14)]),
        &site,
        extractor,
    );
    let summary = controller.run().await.unwrap();

    assert_eq!(summary.extraction_failures, 1);
    assert_eq!(summary.links_completed, 2);
    assert_eq!(summary.links_failed, 0);
    assert_eq!(controller.frontier().state_of(T0_P2), Some(LinkState::Visited));
    assert!(controller.store().get("102").is_none());
}

#[tokio::test]
async fn test_stop_before_run_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(create_test_site());

    let stop = StopFlag::new();
    stop.request_stop();
    let summary = create_controller(
        &dir,
        &create_test_config(),
        create_test_catalog(&[(T0, 14)]),
        &site,
        ScriptedExtractor::default(),
    )
    .with_stop_flag(stop)
    .run()
    .await
    .unwrap();

    assert!(summary.stopped);
    assert_eq!(summary.links_completed, 0);
    assert!(site.loads().is_empty());
    assert!(CheckpointManager::new(dir.path().join("checkpoint.json"))
        .read()
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_page_cap_per_tile() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(
        Site::default()
            .page(
                T0,
                &[],
                &[
                    "https://listings.example/t0/a",
                    "https://listings.example/t0/b",
                    "https://listings.example/t0/c",
                ],
            )
            .page("https://listings.example/t0/a", &[], &[]),
    );

    let settings = CrawlerConfig {
        max_pages_per_tile: Some(2),
        ..create_test_config()
    };
    let summary = create_controller(
        &dir,
        &settings,
        create_test_catalog(&[(T0, 14)]),
        &site,
        ScriptedExtractor::default(),
    )
    .run()
    .await
    .unwrap();

    // The seed counts toward the cap
    assert_eq!(summary.links_completed, 2);
    assert_eq!(site.loads().len(), 2);
}

#[tokio::test]
async fn test_master_write_failure_aborts_run() {
    let dir = TempDir::new().unwrap();
    // A directory where the scratch file should go makes every master write fail
    std::fs::create_dir(dir.path().join("master.json.tmp")).unwrap();
    let site = Arc::new(create_test_site());

    let result = create_controller(
        &dir,
        &create_test_config(),
        create_test_catalog(&[(T0, 14), (T1, 16)]),
        &site,
        ScriptedExtractor::default(),
    )
    .run()
    .await;

    assert!(result.is_err());
    assert_eq!(site.loads(), vec![T0]);
    assert!(!dir.path().join("master.json").exists());
    assert!(!dir.path().join("checkpoint.json").exists());

    // Sessions are closed even though the run failed
    assert_eq!(site.launches.load(Ordering::SeqCst), 1);
    assert_eq!(site.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_checkpoint_deferred_until_master_persisted() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(create_test_site());
    let settings = CrawlerConfig {
        persist_every: 3,
        ..create_test_config()
    };
    let extractor = ScriptedExtractor {
        watch_dir: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let observed = Arc::clone(&extractor.observed);

    let mut controller = create_controller(
        &dir,
        &settings,
        create_test_catalog(&[(T0, 14)]),
        &site,
        extractor,
    );
    let summary = controller.run().await.unwrap();
    assert_eq!(summary.records_inserted, 2);

    // Two changing merges stay below the persist threshold, so neither file was written
    // while the crawl was running
    assert_eq!(
        *observed.lock().unwrap(),
        vec![
            (T0.to_string(), false, false),
            (T0_P2.to_string(), false, false),
        ]
    );

    // The final flush persists the master store, then the deferred checkpoint
    assert!(!controller.store().is_dirty());
    assert_eq!(master_snapshot(&dir).len(), 2);
    let checkpoint = CheckpointManager::new(dir.path().join("checkpoint.json"))
        .read()
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.last_completed_url, T0_P2);
    assert_eq!(
        checkpoint.completed,
        vec![T0.to_string(), T0_P2.to_string()]
    );
}

#[tokio::test]
async fn test_sessions_closed_after_run() {
    let dir = TempDir::new().unwrap();
    let site = Arc::new(create_test_site().failing(T0_P2, 1));
    let settings = CrawlerConfig {
        session_pool_size: 2,
        ..create_test_config()
    };

    let summary = create_controller(
        &dir,
        &settings,
        create_test_catalog(&[(T0, 14), (T1, 16)]),
        &site,
        ScriptedExtractor::default(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(summary.restarts, 1);
    assert_eq!(
        site.closes.load(Ordering::SeqCst),
        site.launches.load(Ordering::SeqCst)
    );
}

/// Helper to create a full configuration pointing at a temp directory
fn create_http_config(dir: &TempDir, catalog_path: std::path::PathBuf) -> Config {
    Config {
        crawler: CrawlerConfig {
            retry_budget: 2,
            ..create_test_config()
        },
        catalog: CatalogConfig {
            sources: vec![catalog_path],
        },
        output: OutputConfig {
            master_path: dir.path().join("master.json"),
            checkpoint_path: dir.path().join("checkpoint.json"),
            error_log_path: dir.path().join("errors.jsonl"),
        },
        http: HttpConfig {
            timeout: 5,
            connect_timeout: 5,
            ..HttpConfig::default()
        },
        extractor: ExtractorConfig {
            record_selector: "div.card".to_string(),
            id_selector: "a.listing".to_string(),
            id_attribute: "href".to_string(),
            fields: vec![FieldRule {
                name: "price".to_string(),
                selector: "span.price".to_string(),
                attribute: None,
            }],
            next_link_selector: Some("a.next".to_string()),
        },
    }
}

#[tokio::test]
async fn test_http_crawl_end_to_end() {
    let mock_server = MockServer::start().await;
    let base_url = mock_server.uri();

    let first_page = r#"
        <html><body>
            <div class="card"><a class="listing" href="/rooms/101?adults=2">Loft</a><span class="price">$50</span></div>
            <div class="card"><a class="listing" href="/rooms/102">Cabin</a></div>
            <a class="next" href="/s?page=2">Next</a>
        </body></html>
    "#;
    let second_page = r#"
        <html><body>
            <div class="card"><a class="listing" href="/rooms/103">Studio</a><span class="price"> $70 </span></div>
        </body></html>
    "#;

    Mock::given(method("GET"))
        .and(path("/s"))
        .and(query_param("zoom", "14"))
        .respond_with(ResponseTemplate::new(200).set_body_string(first_page))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/s"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(second_page))
        .mount(&mock_server)
        .await;

    // Exhausts the retry budget of two
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let catalog_path = dir.path().join("tiles.jsonl");
    let catalog = format!(
        "{{\"zoom_level\": 14, \"sw_lat\": 4.55, \"sw_lng\": -74.15, \"ne_lat\": 4.56, \"ne_lng\": -74.14, \"url\": \"{0}/s?zoom=14\"}}\n\
         {{\"zoom_level\": 15, \"sw_lat\": 4.56, \"sw_lng\": -74.14, \"ne_lat\": 4.57, \"ne_lng\": -74.13, \"url\": \"{0}/broken?zoom=15\"}}\n",
        base_url
    );
    std::fs::write(&catalog_path, catalog).unwrap();

    let config = create_http_config(&dir, catalog_path);
    let summary = run_crawl(&config, StopFlag::new()).await.unwrap();

    assert_eq!(summary.links_completed, 2);
    assert_eq!(summary.links_failed, 1);
    assert_eq!(summary.records_inserted, 3);

    let stats = load_statistics(&config.output).unwrap();
    assert_eq!(stats.total_records, 3);
    assert_eq!(stats.records_by_zoom.get(&14), Some(&3));
    assert_eq!(stats.failed_links.len(), 1);
    assert_eq!(stats.failed_links[0].url, format!("{}/broken?zoom=15", base_url));
    assert_eq!(stats.checkpoint.map(|c| c.source_index), Some(1));

    let master = master_snapshot(&dir);
    assert_eq!(
        master["101"].value("price"),
        Some(&FieldValue::Known("$50".to_string()))
    );
    assert_eq!(master["102"].value("price"), Some(&FieldValue::Unknown));
    assert_eq!(
        master["103"].value("price"),
        Some(&FieldValue::Known("$70".to_string()))
    );
    assert_eq!(
        master["103"].provenance.page_url,
        format!("{}/s?page=2", base_url)
    );
}

#[tokio::test]
async fn test_http_rerun_after_completion_loads_nothing_new() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/s"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div class="card"><a class="listing" href="/rooms/9">x</a></div>"#,
        ))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let catalog_path = dir.path().join("tiles.jsonl");
    std::fs::write(
        &catalog_path,
        format!(
            "{{\"zoom_level\": 14, \"sw_lat\": 4.55, \"sw_lng\": -74.15, \"ne_lat\": 4.56, \"ne_lng\": -74.14, \"url\": \"{}/s?zoom=14\"}}\n",
            mock_server.uri()
        ),
    )
    .unwrap();
    let config = create_http_config(&dir, catalog_path);

    let first = run_crawl(&config, StopFlag::new()).await.unwrap();
    assert_eq!(first.links_completed, 1);

    // The checkpoint covers the whole catalog, so the seed is not fetched again
    let second = run_crawl(&config, StopFlag::new()).await.unwrap();
    assert_eq!(second.links_completed, 0);
    assert_eq!(load_statistics(&config.output).unwrap().total_records, 1);
}
