//! Loads the storefront search page for a slug inside a throwaway browser
//! session and hands back the rendered markup.

pub mod chrome;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::{
    DIAGNOSTIC_SNIPPET_CHARS, DIAGNOSTIC_TIMEOUT_MS, RESULTS_SELECTOR, SEARCH_QUERY_PARAMS,
    SELECTOR_POLL_INTERVAL_MS,
};
use crate::error::{AppError, Result};
use crate::types::Slug;

pub use chrome::ChromeLauncher;

/// Produces the rendered search-results markup for a slug.
#[async_trait]
pub trait ListingFetcher: Send + Sync {
    async fn fetch_listing_markup(&self, slug: &Slug) -> Result<String>;
}

/// Where the browser ended up after navigating.
#[derive(Debug, Clone, Default)]
pub struct PageInfo {
    pub url: Option<String>,
    /// HTTP status of the main document response, when the browser reported one.
    pub status: Option<u16>,
    pub title: Option<String>,
}

impl std::fmt::Display for PageInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (status: ", self.url.as_deref().unwrap_or("?"))?;
        match self.status {
            Some(code) => write!(f, "{code}")?,
            None => f.write_str("unavailable")?,
        }
        write!(f, ", title: {})", self.title.as_deref().unwrap_or("?"))
    }
}

/// One isolated browser page. `close` consumes the session, so it can run at
/// most once.
#[async_trait]
pub trait BrowsingSession: Send {
    /// Navigates and returns once network activity on the new page has settled.
    async fn goto(&mut self, url: &str) -> Result<()>;
    async fn page_info(&mut self) -> Result<PageInfo>;
    /// Single check: is `selector` present in the DOM right now?
    async fn has_selector(&mut self, selector: &str) -> Result<bool>;
    /// The first `max_chars` characters of the rendered body text.
    async fn text_preview(&mut self, max_chars: usize) -> Result<String>;
    async fn content(&mut self) -> Result<String>;
    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowsingSession>>;
}

/// Search page URL: slug in the path and in `setName`, plus the sealed
/// products facet.
pub fn search_url(base: &str, slug: &Slug) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| AppError::Config(format!("invalid storefront search url {base:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| AppError::Config(format!("storefront search url {base:?} cannot take a path")))?
        .pop_if_empty()
        .push(slug.as_str());
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in SEARCH_QUERY_PARAMS {
            query.append_pair(k, v);
        }
        query.append_pair("setName", slug.as_str());
    }
    Ok(url)
}

/// `ListingFetcher` that opens a fresh session per call and always closes it.
pub struct BrowserListingFetcher<L> {
    launcher: L,
    search_base: String,
    timeout: Duration,
}

impl<L: SessionLauncher> BrowserListingFetcher<L> {
    pub fn new(launcher: L, search_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            launcher,
            search_base: search_base.into(),
            timeout,
        }
    }
}

#[async_trait]
impl<L: SessionLauncher> ListingFetcher for BrowserListingFetcher<L> {
    async fn fetch_listing_markup(&self, slug: &Slug) -> Result<String> {
        let url = search_url(&self.search_base, slug)?;
        info!("Scraping: {url}");

        let mut session = self.launcher.launch().await?;
        let outcome = load_results(&mut *session, url.as_str(), self.timeout).await;
        if let Err(e) = session.close().await {
            warn!("Browser session close failed: {e}");
        }
        outcome
    }
}

async fn load_results(
    session: &mut dyn BrowsingSession,
    url: &str,
    timeout: Duration,
) -> Result<String> {
    let deadline = Instant::now() + timeout;
    let expired = |what: &str| {
        AppError::Navigation(format!("{what} did not finish within {}ms", timeout.as_millis()))
    };

    tokio::time::timeout_at(deadline, session.goto(url))
        .await
        .map_err(|_| expired("navigation"))??;

    match tokio::time::timeout_at(deadline, session.page_info()).await {
        Ok(Ok(info)) => info!("Landed on {info}"),
        Ok(Err(e)) => warn!("Could not read page info: {e}"),
        Err(_) => warn!("Page info not available before the deadline"),
    }

    let wait = wait_for_selector(session, RESULTS_SELECTOR, deadline);
    let found = match tokio::time::timeout_at(deadline, wait).await {
        Ok(res) => res?,
        Err(_) => false,
    };
    if !found {
        let preview = match tokio::time::timeout(
            Duration::from_millis(DIAGNOSTIC_TIMEOUT_MS),
            session.text_preview(DIAGNOSTIC_SNIPPET_CHARS),
        )
        .await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => format!("<unavailable: {e}>"),
            Err(_) => "<unavailable: timed out>".to_string(),
        };
        warn!("No {RESULTS_SELECTOR} on page, content preview: {preview:?}");
        return Err(expired(&format!("waiting for {RESULTS_SELECTOR}")));
    }
    info!("Found {RESULTS_SELECTOR}");

    tokio::time::timeout_at(deadline, session.content())
        .await
        .map_err(|_| expired("reading page content"))?
}

/// Polls until `selector` shows up or `deadline` passes.
async fn wait_for_selector(
    session: &mut dyn BrowsingSession,
    selector: &str,
    deadline: Instant,
) -> Result<bool> {
    let poll = Duration::from_millis(SELECTOR_POLL_INTERVAL_MS);
    loop {
        if session.has_selector(selector).await? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        tokio::time::sleep(poll.min(deadline - now)).await;
    }
}
