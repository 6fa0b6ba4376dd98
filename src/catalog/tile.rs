use serde::{Deserialize, Serialize};
use std::fmt;

/// Geographic bounding box of a tile, south-west and north-east corners
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub sw_lat: f64,
    pub sw_lng: f64,
    pub ne_lat: f64,
    pub ne_lng: f64,
}

impl Bounds {
    pub fn new(sw_lat: f64, sw_lng: f64, ne_lat: f64, ne_lng: f64) -> Self {
        Self {
            sw_lat,
            sw_lng,
            ne_lat,
            ne_lng,
        }
    }

    /// Returns true if the south-west corner lies south-west of the north-east corner
    pub fn is_well_formed(&self) -> bool {
        [self.sw_lat, self.sw_lng, self.ne_lat, self.ne_lng]
            .iter()
            .all(|v| v.is_finite())
            && self.sw_lat <= self.ne_lat
            && self.sw_lng <= self.ne_lng
            && (-90.0..=90.0).contains(&self.sw_lat)
            && (-90.0..=90.0).contains(&self.ne_lat)
            && (-180.0..=180.0).contains(&self.sw_lng)
            && (-180.0..=180.0).contains(&self.ne_lng)
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) - ({}, {})",
            self.sw_lat, self.sw_lng, self.ne_lat, self.ne_lng
        )
    }
}

/// One seed crawl region
///
/// Tiles are immutable once the catalog is loaded. Every link discovered while crawling a
/// tile carries a shared reference to it, and every record extracted under it inherits
/// the tile's zoom as its quality.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Position in the catalog ordering
    pub index: usize,

    pub bounds: Bounds,

    /// Zoom level the tile was generated for
    pub zoom: u32,

    /// Canonical URL of the tile's first listing page
    pub seed_url: String,
}

impl Tile {
    pub fn new(index: usize, bounds: Bounds, zoom: u32, seed_url: impl Into<String>) -> Self {
        Self {
            index,
            bounds,
            zoom,
            seed_url: seed_url.into(),
        }
    }
}
