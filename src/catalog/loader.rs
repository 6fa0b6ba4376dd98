use crate::catalog::{Bounds, TileCatalog};
use crate::url::canonical_url;
use crate::CatalogError;
use serde::Deserialize;
use std::path::Path;

/// One validated catalog line, ready to become a tile
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub bounds: Bounds,
    pub zoom: u32,
    pub seed_url: String,
}

/// On-disk shape of a catalog line; unknown keys (e.g. `tile_area_m2`) are ignored
#[derive(Debug, Deserialize)]
struct CatalogLine {
    zoom_level: f64,
    sw_lat: f64,
    sw_lng: f64,
    ne_lat: f64,
    ne_lng: f64,
    url: String,
}

/// Loads and concatenates catalog sources in the order given
///
/// # Arguments
///
/// * `paths` - JSON-lines tile files, one tile per line
///
/// # Returns
///
/// * `Ok(TileCatalog)` - Tiles from all sources, duplicates removed
/// * `Err(CatalogError)` - A source could not be read, held no tiles, or named an invalid seed
pub fn load_catalog<P: AsRef<Path>>(paths: &[P]) -> Result<TileCatalog, CatalogError> {
    let mut entries = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let label = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: label.clone(),
            source,
        })?;

        let parsed = parse_catalog_source(&label, &content)?;
        tracing::info!("Loaded {} tiles from {}", parsed.len(), label);
        entries.extend(parsed);
    }

    Ok(TileCatalog::from_entries(entries))
}

/// Parses the content of one catalog source
///
/// Blank lines are ignored and lines that are not valid JSON are skipped with a warning.
/// A decodable line naming an unusable seed URL or zoom is an error.
pub fn parse_catalog_source(label: &str, content: &str) -> Result<Vec<CatalogEntry>, CatalogError> {
    let mut entries = Vec::new();

    for (number, line) in content.lines().enumerate() {
        let line_no = number + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let raw: CatalogLine = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Skipping undecodable line {} of {}: {}", line_no, label, e);
                continue;
            }
        };

        let seed_url = canonical_url(&raw.url)
            .map_err(|e| CatalogError::InvalidSeed {
                path: label.to_string(),
                line: line_no,
                url: raw.url.clone(),
                reason: e.to_string(),
            })?
            .to_string();

        if raw.zoom_level < 0.0 || raw.zoom_level.fract() != 0.0 || raw.zoom_level > 30.0 {
            return Err(CatalogError::InvalidSeed {
                path: label.to_string(),
                line: line_no,
                url: raw.url,
                reason: format!("zoom level {} is not a whole number in 0..=30", raw.zoom_level),
            });
        }

        let bounds = Bounds::new(raw.sw_lat, raw.sw_lng, raw.ne_lat, raw.ne_lng);
        if !bounds.is_well_formed() {
            tracing::warn!(
                "Tile on line {} of {} has inverted or out-of-range bounds {}",
                line_no,
                label,
                bounds
            );
        }

        entries.push(CatalogEntry {
            bounds,
            zoom: raw.zoom_level as u32,
            seed_url,
        });
    }

    if entries.is_empty() {
        return Err(CatalogError::EmptySource {
            path: label.to_string(),
        });
    }

    Ok(entries)
}
