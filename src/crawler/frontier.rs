//! Crawl frontier: pending and visited links, batched by tile
//!
//! This module handles:
//! - Run-wide URL deduplication (a URL is served at most once per run)
//! - Tile-ordered batches, so the crawl finishes one tile before starting the next
//! - Random or FIFO serving order inside a batch
//! - Optional per-tile admission cap
//!
//! The frontier never advances to a later tile while links of the current tile are
//! in flight, because those links may still discover more pages of the same tile.

use crate::catalog::Tile;
use crate::config::CrawlOrder;
use crate::state::LinkState;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A URL to visit, tagged with the tile it was found under
///
/// Equality and hashing consider the URL only.
#[derive(Debug, Clone)]
pub struct Link {
    pub url: String,
    pub tile: Arc<Tile>,
}

impl Link {
    pub fn new(url: impl Into<String>, tile: Arc<Tile>) -> Self {
        Self {
            url: url.into(),
            tile,
        }
    }

    /// The seed link of a tile
    pub fn seed(tile: &Arc<Tile>) -> Self {
        Self::new(tile.seed_url.clone(), Arc::clone(tile))
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Link {}

impl Hash for Link {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Result of asking the frontier for work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrontierPoll {
    /// A link to process; it is now in flight
    Ready(Link),
    /// Nothing can be served until an in-flight link completes
    Waiting,
    /// No pending and no in-flight links remain
    Empty,
}

#[derive(Debug, Default)]
struct TileBatch {
    pending: VecDeque<Link>,
    /// Links ever queued for this tile, including restored ones
    admitted: usize,
    /// URLs that reached a terminal state, in completion order
    completed: Vec<String>,
}

/// Owned pending/visited link queue for one run
#[derive(Debug)]
pub struct Frontier {
    batches: BTreeMap<usize, TileBatch>,
    queued: HashSet<String>,
    in_flight: HashMap<String, Link>,
    visited: HashSet<String>,
    failed: HashSet<String>,
    order: CrawlOrder,
    rng: StdRng,
    max_per_tile: Option<usize>,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `order` - Serving order inside a tile batch
    /// * `shuffle_seed` - Fixed RNG seed for [`CrawlOrder::Random`]; entropy when `None`
    pub fn new(order: CrawlOrder, shuffle_seed: Option<u64>) -> Self {
        let rng = match shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            batches: BTreeMap::new(),
            queued: HashSet::new(),
            in_flight: HashMap::new(),
            visited: HashSet::new(),
            failed: HashSet::new(),
            order,
            rng,
            max_per_tile: None,
        }
    }

    /// Caps the number of links admitted per tile
    pub fn with_max_per_tile(mut self, cap: Option<u32>) -> Self {
        self.max_per_tile = cap.map(|c| c.max(1) as usize);
        self
    }

    /// Adds links not already known to the frontier
    ///
    /// Returns the number of links queued.
    pub fn seed(&mut self, links: impl IntoIterator<Item = Link>) -> usize {
        let mut added = 0;
        for link in links {
            if self.admit(link) {
                added += 1;
            }
        }
        added
    }

    /// Queues outbound links found on a page of `tile`
    ///
    /// Returns the number of links queued.
    pub fn discovered(
        &mut self,
        urls: impl IntoIterator<Item = String>,
        tile: &Arc<Tile>,
    ) -> usize {
        self.seed(urls.into_iter().map(|url| Link::new(url, Arc::clone(tile))))
    }

    /// Restores a partly crawled tile from a checkpoint
    ///
    /// `completed` URLs become visited and count toward the tile's cap; `pending` URLs
    /// are queued again. The tile's seed is queued unless it is among `completed`.
    pub fn restore_tile(&mut self, tile: &Arc<Tile>, completed: &[String], pending: &[String]) {
        for url in completed {
            if self.visited.insert(url.clone()) {
                let batch = self.batches.entry(tile.index).or_default();
                batch.admitted += 1;
                batch.completed.push(url.clone());
            }
        }

        self.seed(std::iter::once(Link::seed(tile)));
        self.discovered(pending.iter().cloned(), tile);
    }

    /// Records `url` as visited without queueing it
    pub fn mark_visited(&mut self, url: impl Into<String>) {
        let url = url.into();
        self.queued.remove(&url);
        for batch in self.batches.values_mut() {
            batch.pending.retain(|link| link.url != url);
        }
        self.visited.insert(url);
    }

    /// Claims the next link to process
    pub fn next(&mut self) -> FrontierPoll {
        let lowest_in_flight = self.in_flight.values().map(|l| l.tile.index).min();
        let lowest_pending = self
            .batches
            .iter()
            .find(|(_, batch)| !batch.pending.is_empty())
            .map(|(index, _)| *index);

        let serve = match (lowest_pending, lowest_in_flight) {
            (None, None) => return FrontierPoll::Empty,
            (None, Some(_)) => return FrontierPoll::Waiting,
            (Some(p), Some(f)) if p > f => return FrontierPoll::Waiting,
            (Some(p), _) => p,
        };

        self.prune_before(serve.min(lowest_in_flight.unwrap_or(serve)));

        let Some(batch) = self.batches.get_mut(&serve) else {
            return FrontierPoll::Empty;
        };
        let link = match self.order {
            CrawlOrder::Fifo => batch.pending.pop_front(),
            CrawlOrder::Random => {
                let pick = self.rng.gen_range(0..batch.pending.len());
                batch.pending.swap_remove_back(pick)
            }
        };

        match link {
            Some(link) => {
                self.debug_check_transition(&link.url, LinkState::InFlight);
                self.queued.remove(&link.url);
                self.in_flight.insert(link.url.clone(), link.clone());
                tracing::trace!("Serving {} from tile {}", link.url, serve);
                FrontierPoll::Ready(link)
            }
            None => FrontierPoll::Empty,
        }
    }

    /// Moves an in-flight link to visited
    ///
    /// Returns false if the link was not in flight.
    pub fn complete(&mut self, link: &Link) -> bool {
        self.finish(link, false)
    }

    /// Moves an in-flight link to visited-with-failure
    ///
    /// Returns false if the link was not in flight.
    pub fn fail(&mut self, link: &Link) -> bool {
        self.finish(link, true)
    }

    /// URLs of `tile` that reached a terminal state, in completion order
    pub fn completed_in(&self, tile: &Tile) -> Vec<String> {
        self.batches
            .get(&tile.index)
            .map(|batch| batch.completed.clone())
            .unwrap_or_default()
    }

    /// URLs of `tile` not yet terminal: queued links followed by in-flight links
    pub fn pending_in(&self, tile: &Tile) -> Vec<String> {
        let mut urls: Vec<String> = self
            .batches
            .get(&tile.index)
            .map(|batch| batch.pending.iter().map(|l| l.url.clone()).collect())
            .unwrap_or_default();

        let mut in_flight: Vec<String> = self
            .in_flight
            .values()
            .filter(|l| l.tile.index == tile.index)
            .map(|l| l.url.clone())
            .collect();
        in_flight.sort();
        urls.extend(in_flight);
        urls
    }

    /// Current state of a URL, if the frontier has seen it
    pub fn state_of(&self, url: &str) -> Option<LinkState> {
        if self.failed.contains(url) {
            Some(LinkState::VisitedWithFailure)
        } else if self.visited.contains(url) {
            Some(LinkState::Visited)
        } else if self.in_flight.contains_key(url) {
            Some(LinkState::InFlight)
        } else if self.queued.contains(url) {
            Some(LinkState::Pending)
        } else {
            None
        }
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.state_of(url).is_some_and(|state| state.is_terminal())
    }

    pub fn pending_len(&self) -> usize {
        self.queued.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of visited URLs, failures included
    pub fn visited_len(&self) -> usize {
        self.visited.len()
    }

    pub fn failed_len(&self) -> usize {
        self.failed.len()
    }

    fn admit(&mut self, link: Link) -> bool {
        if self.visited.contains(&link.url)
            || self.queued.contains(&link.url)
            || self.in_flight.contains_key(&link.url)
        {
            return false;
        }

        let batch = self.batches.entry(link.tile.index).or_default();
        if let Some(cap) = self.max_per_tile {
            if batch.admitted >= cap {
                tracing::debug!(
                    "Tile {} reached its cap of {} links; not queueing {}",
                    link.tile.index,
                    cap,
                    link.url
                );
                return false;
            }
        }

        batch.admitted += 1;
        self.queued.insert(link.url.clone());
        batch.pending.push_back(link);
        true
    }

    fn finish(&mut self, link: &Link, failed: bool) -> bool {
        if !self.in_flight.contains_key(&link.url) {
            return false;
        }
        let next = if failed {
            LinkState::VisitedWithFailure
        } else {
            LinkState::Visited
        };
        self.debug_check_transition(&link.url, next);

        let Some(link) = self.in_flight.remove(&link.url) else {
            return false;
        };

        self.visited.insert(link.url.clone());
        if failed {
            self.failed.insert(link.url.clone());
        }
        self.batches
            .entry(link.tile.index)
            .or_default()
            .completed
            .push(link.url);
        true
    }

    fn debug_check_transition(&self, url: &str, next: LinkState) {
        debug_assert!(
            self.state_of(url)
                .is_some_and(|current| current.can_transition_to(next)),
            "illegal transition of {} to {}",
            url,
            next
        );
    }

    /// Drops fully drained batches of tiles before `index`
    fn prune_before(&mut self, index: usize) {
        self.batches
            .retain(|tile, batch| *tile >= index || !batch.pending.is_empty());
    }
}
