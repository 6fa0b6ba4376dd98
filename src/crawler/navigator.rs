//! Navigator sessions
//!
//! This module defines the seams between the crawl loop and whatever actually loads
//! pages:
//! - [`Navigator`]: one live session that loads URLs into page handles
//! - [`SessionLauncher`]: starts fresh sessions when the fault recovery controller
//!   discards a dead one
//!
//! It also provides a `reqwest` backed implementation of both. Each HTTP session owns
//! its own client, so a restart also discards pooled connections.

use crate::config::HttpConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Failure to load a page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NavigationError {
    /// The page could not be loaded this time (timeout, non-success status)
    #[error("transient navigation failure: {0}")]
    Transient(String),

    /// The session is unusable (closed, transport broken)
    #[error("session failure: {0}")]
    Fatal(String),
}

impl NavigationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// One live page-loading session
#[async_trait]
pub trait Navigator: Send {
    /// Handle to a loaded page, consumed by an extraction adapter
    type Page: Send + Sync;

    /// Loads `url` and returns a handle to the rendered page
    async fn load(&mut self, url: &str) -> Result<Self::Page, NavigationError>;

    /// Cheap liveness probe, run before every link
    async fn is_alive(&mut self) -> bool;

    /// Releases the session; later calls to `load` fail
    async fn close(&mut self) -> Result<(), NavigationError>;
}

/// Starts navigator sessions
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: Navigator;

    async fn launch(&self) -> Result<Self::Session, NavigationError>;
}

/// A page fetched over HTTP
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpPage {
    /// URL that was requested
    pub url: String,
    /// URL after redirects
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// Launches [`HttpNavigator`] sessions
#[derive(Debug, Clone)]
pub struct HttpLauncher {
    config: HttpConfig,
}

impl HttpLauncher {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionLauncher for HttpLauncher {
    type Session = HttpNavigator;

    async fn launch(&self) -> Result<HttpNavigator, NavigationError> {
        let client = build_http_client(&self.config)
            .map_err(|e| NavigationError::Fatal(format!("failed to build HTTP client: {}", e)))?;
        Ok(HttpNavigator {
            client: Some(client),
        })
    }
}

/// Builds an HTTP client from the navigator configuration
///
/// # Arguments
///
/// * `config` - User agent and timeouts
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &HttpConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout))
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .gzip(true)
        .brotli(true)
        .build()
}

/// A `reqwest` client session
#[derive(Debug)]
pub struct HttpNavigator {
    client: Option<Client>,
}

#[async_trait]
impl Navigator for HttpNavigator {
    type Page = HttpPage;

    /// Fetches `url` with a GET request
    ///
    /// # Error Classification
    ///
    /// | Condition | Error |
    /// |-----------|-------|
    /// | Non-success status | Transient |
    /// | Timeout | Transient |
    /// | Connection or other transport failure | Fatal |
    /// | Session already closed | Fatal |
    async fn load(&mut self, url: &str) -> Result<HttpPage, NavigationError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| NavigationError::Fatal("session is closed".to_string()))?;

        let response = client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        let final_url = response.url().to_string();

        if !status.is_success() {
            return Err(NavigationError::Transient(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        let body = response.text().await.map_err(classify)?;
        tracing::trace!("Loaded {} ({} bytes)", final_url, body.len());

        Ok(HttpPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            body,
        })
    }

    async fn is_alive(&mut self) -> bool {
        self.client.is_some()
    }

    async fn close(&mut self) -> Result<(), NavigationError> {
        self.client = None;
        Ok(())
    }
}

fn classify(error: reqwest::Error) -> NavigationError {
    if error.is_timeout() {
        NavigationError::Transient("request timed out".to_string())
    } else if error.is_connect() {
        NavigationError::Fatal(format!("connection failed: {}", error))
    } else {
        NavigationError::Fatal(error.to_string())
    }
}
