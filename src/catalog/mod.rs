//! Tile catalog: the ordered, immutable crawl scope of a run
//!
//! A catalog is loaded once from one or more JSON-lines sources. Each line describes one
//! tile (a bounding box observed at a zoom level) and the seed URL that lists it. The
//! order of tiles in the catalog is the order the crawl consumes them, and it is the
//! ordering the checkpoint points into.

mod loader;
mod tile;

pub use loader::{load_catalog, parse_catalog_source, CatalogEntry};
pub use tile::{Bounds, Tile};

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

/// Ordered collection of tiles defining one run's crawl scope
#[derive(Debug, Clone, Default)]
pub struct TileCatalog {
    tiles: Vec<Arc<Tile>>,
}

impl TileCatalog {
    /// Builds a catalog from already-validated entries, assigning indices in order
    ///
    /// Entries whose seed URL repeats an earlier tile are dropped; the first occurrence
    /// keeps its position.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut tiles = Vec::with_capacity(entries.len());

        for entry in entries {
            if !seen.insert(entry.seed_url.clone()) {
                tracing::debug!("Dropping duplicate catalog seed {}", entry.seed_url);
                continue;
            }
            let index = tiles.len();
            tiles.push(Arc::new(Tile::new(
                index,
                entry.bounds,
                entry.zoom,
                entry.seed_url,
            )));
        }

        Self { tiles }
    }

    /// Number of tiles in the catalog
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Returns true if the catalog has no tiles
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Gets the tile at a catalog position
    pub fn get(&self, index: usize) -> Option<&Arc<Tile>> {
        self.tiles.get(index)
    }

    /// Iterates tiles in crawl order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Tile>> {
        self.tiles.iter()
    }

    /// Digest of the ordered seed URLs of tiles `0..end`
    ///
    /// Two catalogs agree on their first `end` tiles iff their prefix digests match, which
    /// is how a checkpoint detects that its inputs changed between runs.
    pub fn prefix_digest(&self, end: usize) -> String {
        let mut hasher = Sha256::new();
        for tile in self.tiles.iter().take(end) {
            hasher.update(tile.seed_url.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    /// Counts tiles per zoom level, in ascending zoom order
    pub fn zoom_breakdown(&self) -> Vec<(u32, usize)> {
        let mut counts = std::collections::BTreeMap::new();
        for tile in &self.tiles {
            *counts.entry(tile.zoom).or_insert(0usize) += 1;
        }
        counts.into_iter().collect()
    }
}
