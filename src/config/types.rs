use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Tile-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub catalog: CatalogConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub http: HttpConfig,
    pub extractor: ExtractorConfig,
}

/// Order in which pending links of one tile are served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlOrder {
    /// Uniformly random among the tile's pending links
    #[default]
    Random,
    /// First discovered, first served
    Fifo,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Delay after a page load before extraction runs (milliseconds)
    #[serde(rename = "pacing-delay")]
    pub pacing_delay: u64,

    /// Maximum navigation attempts per link
    #[serde(rename = "retry-budget")]
    pub retry_budget: u32,

    /// Number of navigator sessions loading pages concurrently
    #[serde(rename = "session-pool-size")]
    pub session_pool_size: u32,

    /// Merges between master store writes; 1 persists after every link
    #[serde(rename = "persist-every")]
    pub persist_every: u32,

    /// Serving order within a tile
    pub order: CrawlOrder,

    /// Upper bound on links admitted per tile (seed included)
    #[serde(rename = "max-pages-per-tile")]
    pub max_pages_per_tile: Option<u32>,

    /// Links between progress log lines
    #[serde(rename = "progress-interval")]
    pub progress_interval: u64,

    /// Fixed seed for the random serving order
    #[serde(rename = "shuffle-seed")]
    pub shuffle_seed: Option<u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            pacing_delay: 3000,
            retry_budget: 3,
            session_pool_size: 1,
            persist_every: 1,
            order: CrawlOrder::Random,
            max_pages_per_tile: None,
            progress_interval: 10,
            shuffle_seed: None,
        }
    }
}

/// Tile catalog sources
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// JSON-lines tile files, consumed in the order listed
    pub sources: Vec<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the master dataset (JSON)
    #[serde(rename = "master-path")]
    pub master_path: PathBuf,

    /// Path to the checkpoint file (JSON)
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: PathBuf,

    /// Path to the append-only error log (JSON lines)
    #[serde(rename = "error-log-path")]
    pub error_log_path: PathBuf,
}

/// HTTP navigator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "user-agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    pub timeout: u64,

    /// Connection timeout (seconds)
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("tile-harvest/{}", env!("CARGO_PKG_VERSION")),
            timeout: 30,
            connect_timeout: 10,
        }
    }
}

/// Selector rules for the built-in extraction adapter
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractorConfig {
    /// Selector matching one element per listing
    #[serde(rename = "record-selector")]
    pub record_selector: String,

    /// Selector (inside a record) of the element carrying the listing id
    #[serde(rename = "id-selector")]
    pub id_selector: String,

    /// Attribute holding the id; its last path segment becomes the record id
    #[serde(rename = "id-attribute", default = "default_id_attribute")]
    pub id_attribute: String,

    /// Field rules, evaluated inside each record
    #[serde(default)]
    pub fields: Vec<FieldRule>,

    /// Selector of outbound pagination links
    #[serde(rename = "next-link-selector")]
    pub next_link_selector: Option<String>,
}

fn default_id_attribute() -> String {
    "href".to_string()
}

/// One extracted field
#[derive(Debug, Clone, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub selector: String,
    /// Attribute to read; the element's text is used when absent
    pub attribute: Option<String>,
}
