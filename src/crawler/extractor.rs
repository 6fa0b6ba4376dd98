//! Extraction adapters
//!
//! An extraction adapter turns a loaded page into raw field-sets plus outbound links.
//! The crawl loop is generic over the adapter; [`SelectorExtractor`] is the built-in
//! one, driven entirely by CSS selectors from the configuration.

use crate::catalog::Tile;
use crate::config::ExtractorConfig;
use crate::crawler::navigator::HttpPage;
use crate::storage::{FieldValue, Provenance, RawFieldSet, UNKNOWN_MARKER};
use crate::ConfigError;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

/// Failure to extract anything from a loaded page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("Cannot extract from {url}: {reason}")]
    Unparseable { url: String, reason: String },

    #[error("Extraction failed: {0}")]
    Other(String),
}

/// Everything extracted from one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub records: Vec<RawFieldSet>,
    /// Absolute outbound URLs to queue under the same tile
    pub links: Vec<String>,
}

/// Converts a loaded page into records and links
#[async_trait]
pub trait ExtractionAdapter<P: Sync>: Send + Sync {
    async fn extract(&self, page: &P, tile: &Tile) -> Result<Extraction, ExtractionError>;
}

struct CompiledField {
    name: String,
    selector: Selector,
    attribute: Option<String>,
}

/// Configuration-driven extractor over HTML pages
///
/// Each element matching the record selector yields one [`RawFieldSet`]:
/// - the id is the last path segment (query dropped) of the id attribute
/// - each field rule reads its attribute, or the element text, from the first match
/// - fields whose selector matches nothing are reported as unknown
///
/// Every record carries the tile's zoom as its quality.
pub struct SelectorExtractor {
    record: Selector,
    id: Selector,
    id_attribute: String,
    fields: Vec<CompiledField>,
    next_link: Option<Selector>,
}

impl SelectorExtractor {
    /// Compiles the selectors of an extractor configuration
    pub fn from_config(config: &ExtractorConfig) -> Result<Self, ConfigError> {
        let fields = config
            .fields
            .iter()
            .map(|rule| {
                Ok(CompiledField {
                    name: rule.name.clone(),
                    selector: compile(&rule.selector)?,
                    attribute: rule.attribute.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            record: compile(&config.record_selector)?,
            id: compile(&config.id_selector)?,
            id_attribute: config.id_attribute.clone(),
            fields,
            next_link: config
                .next_link_selector
                .as_deref()
                .map(compile)
                .transpose()?,
        })
    }

    /// Extracts records and links from an HTML document
    ///
    /// # Arguments
    ///
    /// * `html` - The page body
    /// * `base_url` - URL relative links and ids are resolved against
    /// * `page_url` - URL recorded as the provenance of every record
    /// * `tile` - Tile the page was loaded under
    pub fn extract_html(
        &self,
        html: &str,
        base_url: &Url,
        page_url: &str,
        tile: &Tile,
    ) -> Extraction {
        let document = Html::parse_document(html);

        let records = document
            .select(&self.record)
            .map(|card| {
                let id = self.record_id(card, base_url);
                self.fields.iter().fold(
                    RawFieldSet::new(id, tile.zoom, Provenance::from_tile(tile, page_url)),
                    |raw, field| {
                        let value = read_field(card, field);
                        raw.with_field(field.name.clone(), value)
                    },
                )
            })
            .collect();

        let mut links = Vec::new();
        if let Some(next) = &self.next_link {
            for element in document.select(next) {
                let resolved = element
                    .value()
                    .attr("href")
                    .and_then(|href| resolve_link(href, base_url));
                if let Some(url) = resolved {
                    if !links.contains(&url) {
                        links.push(url);
                    }
                }
            }
        }

        Extraction { records, links }
    }

    fn record_id(&self, card: ElementRef<'_>, base_url: &Url) -> String {
        card.select(&self.id)
            .next()
            .and_then(|element| element.value().attr(&self.id_attribute))
            .and_then(|value| id_from_attribute(value, base_url))
            .unwrap_or_else(|| UNKNOWN_MARKER.to_string())
    }
}

#[async_trait]
impl ExtractionAdapter<HttpPage> for SelectorExtractor {
    async fn extract(&self, page: &HttpPage, tile: &Tile) -> Result<Extraction, ExtractionError> {
        let base_url = Url::parse(&page.final_url).map_err(|e| ExtractionError::Unparseable {
            url: page.final_url.clone(),
            reason: e.to_string(),
        })?;
        Ok(self.extract_html(&page.body, &base_url, &page.url, tile))
    }
}

fn compile(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

fn read_field(card: ElementRef<'_>, field: &CompiledField) -> FieldValue {
    let Some(element) = card.select(&field.selector).next() else {
        return FieldValue::Unknown;
    };

    match &field.attribute {
        Some(attribute) => element
            .value()
            .attr(attribute)
            .map(FieldValue::from_text)
            .unwrap_or_default(),
        None => FieldValue::from_text(&element.text().collect::<String>()),
    }
}

/// Last non-empty path segment of `value`, resolved against `base_url`
fn id_from_attribute(value: &str, base_url: &Url) -> Option<String> {
    let url = base_url.join(value.trim()).ok()?;
    url.path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// Resolves an href to an absolute http(s) URL
///
/// Returns None for empty hrefs, fragment-only anchors, `javascript:`, `mailto:`,
/// `tel:` and `data:` links, and anything that does not resolve to http(s).
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let absolute = base_url.join(href).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute.to_string()),
        _ => None,
    }
}
