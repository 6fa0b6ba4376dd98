//! URL handling module for Tile-Harvest
//!
//! Every link is canonicalised before it reaches the frontier; the URL string is the only
//! deduplication key a link has.

mod normalize;

pub use normalize::canonical_url;
