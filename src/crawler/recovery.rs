//! Fault recovery for navigator sessions
//!
//! One [`FaultRecovery`] owns one session slot. Before each link it probes the session;
//! after each failed attempt it discards the session and launches a fresh one. A link
//! gets at most `retry_budget` attempts, after which it is reported as exhausted and
//! the crawl moves on.

use crate::crawler::navigator::{NavigationError, Navigator, SessionLauncher};
use crate::state::SessionState;
use std::sync::Arc;

/// Page type produced by a launcher's sessions
pub type PageOf<L> = <<L as SessionLauncher>::Session as Navigator>::Page;

/// Result of loading one link through a recovering session
#[derive(Debug)]
pub enum LoadOutcome<P> {
    Loaded { page: P, attempts: u32 },
    Exhausted { attempts: u32, last_error: NavigationError },
}

/// Owns a navigator session and keeps it healthy
pub struct FaultRecovery<L: SessionLauncher> {
    launcher: Arc<L>,
    session: Option<L::Session>,
    state: SessionState,
    retry_budget: u32,
    restarts: u64,
    slot: usize,
}

impl<L: SessionLauncher> FaultRecovery<L> {
    /// Creates an idle slot; the first session is launched on first use
    ///
    /// # Arguments
    ///
    /// * `launcher` - Shared session launcher
    /// * `retry_budget` - Attempts per link, at least 1
    /// * `slot` - Slot number used in log lines
    pub fn new(launcher: Arc<L>, retry_budget: u32, slot: usize) -> Self {
        Self {
            launcher,
            session: None,
            state: SessionState::Idle,
            retry_budget: retry_budget.max(1),
            restarts: 0,
            slot,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sessions discarded and relaunched so far
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Loads `url`, restarting the session after every failed attempt
    pub async fn load(&mut self, url: &str) -> LoadOutcome<PageOf<L>> {
        let mut last_error = NavigationError::Fatal("no attempt made".to_string());

        for attempt in 1..=self.retry_budget {
            match self.attempt(url).await {
                Ok(page) => {
                    if attempt > 1 {
                        tracing::info!(
                            "Slot {}: loaded {} on attempt {}",
                            self.slot,
                            url,
                            attempt
                        );
                    }
                    return LoadOutcome::Loaded {
                        page,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    tracing::warn!(
                        "Slot {}: attempt {}/{} for {} failed ({}): {}",
                        self.slot,
                        attempt,
                        self.retry_budget,
                        url,
                        if e.is_transient() { "transient" } else { "fatal" },
                        e
                    );
                    // Both kinds restart; a transient failure is retried on a fresh session
                    self.restart().await;
                    last_error = e;
                }
            }
        }

        LoadOutcome::Exhausted {
            attempts: self.retry_budget,
            last_error,
        }
    }

    /// Closes the current session, if any
    pub async fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                tracing::debug!("Slot {}: error closing session: {}", self.slot, e);
            }
        }
        self.state = SessionState::Idle;
    }

    async fn attempt(&mut self, url: &str) -> Result<PageOf<L>, NavigationError> {
        if self.state.is_usable() {
            let alive = match self.session.as_mut() {
                Some(session) => session.is_alive().await,
                None => false,
            };
            if !alive {
                tracing::info!("Slot {}: session failed liveness probe", self.slot);
                self.restart().await;
            }
        }

        if !self.state.is_usable() {
            self.launch().await?;
        }

        match self.session.as_mut() {
            Some(session) => session.load(url).await,
            None => Err(NavigationError::Fatal("no live session".to_string())),
        }
    }

    async fn launch(&mut self) -> Result<(), NavigationError> {
        let session = self.launcher.launch().await?;
        self.session = Some(session);
        self.state = SessionState::Healthy;
        tracing::debug!("Slot {}: session launched", self.slot);
        Ok(())
    }

    /// Discards the session and launches a replacement
    ///
    /// A failed launch leaves the slot `Restarting`; the next attempt launches again.
    async fn restart(&mut self) {
        self.state = SessionState::Restarting;
        self.restarts += 1;

        if let Some(mut old) = self.session.take() {
            if let Err(e) = old.close().await {
                tracing::debug!("Slot {}: error closing dead session: {}", self.slot, e);
            }
        }

        if let Err(e) = self.launch().await {
            tracing::warn!("Slot {}: relaunch failed: {}", self.slot, e);
        }
    }
}
