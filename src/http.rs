//! HTTP implementation of the [`Downloader`] boundary
//!
//! Fetches pages over `reqwest` and extracts links with `scraper`. Policy
//! stays minimal: no robots.txt, no caching, no retries; redirects and
//! timeouts follow the client configuration.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::downloader::{Document, Downloader};
use crate::error::{ExtractError, FetchError};

const USER_AGENT: &str = concat!("deepfetch/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SEC: u64 = 30;

/// Downloads pages over HTTP(S).
///
/// One instance holds one [`reqwest::Client`] and is shared by all
/// download workers; the client pools connections internally.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    /// Create a downloader with the crate user agent and a 30 second
    /// request timeout.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SEC))
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Box<dyn Document>, FetchError> {
        let requested = Url::parse(url).map_err(|e| FetchError::new(url, e))?;
        let response = self
            .client
            .get(requested)
            .send()
            .await
            .map_err(|e| FetchError::new(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(url, format!("unexpected status {status}")));
        }

        // Links resolve against the final URL, not the requested one, so
        // redirected pages with relative hrefs come out right.
        let base = response.url().clone();
        let body = response.text().await.map_err(|e| FetchError::new(url, e))?;
        Ok(Box::new(HtmlDocument { base, body }))
    }
}

/// A fetched HTML page; the body stays unparsed until links are asked for.
pub struct HtmlDocument {
    base: Url,
    body: String,
}

impl HtmlDocument {
    /// Build a document from an already fetched body, resolving links
    /// against `base`
    pub fn new(base: Url, body: impl Into<String>) -> Self {
        Self {
            base,
            body: body.into(),
        }
    }
}

#[async_trait::async_trait]
impl Document for HtmlDocument {
    async fn extract_links(&self) -> Result<Vec<String>, ExtractError> {
        let document = Html::parse_document(&self.body);
        let selector =
            Selector::parse("a[href]").map_err(|e| ExtractError::new(format!("bad selector: {e}")))?;

        let mut links = Vec::new();
        let mut seen = HashSet::new();
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            // Unresolvable hrefs are skipped, not errors; one mangled link
            // should not sink the whole page.
            let Ok(mut resolved) = self.base.join(href) else {
                continue;
            };
            resolved.set_fragment(None);
            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            let link = String::from(resolved);
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }
        Ok(links)
    }
}
