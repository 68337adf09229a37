//! The fetch/parse boundary the crawl pipeline drives
//!
//! The crawler core never touches the network or HTML itself; it calls
//! through these two traits. [`HttpDownloader`](crate::HttpDownloader) is
//! the production implementation; tests substitute in-memory graphs.

use crate::error::{ExtractError, FetchError};

/// Fetches a URL into a [`Document`].
///
/// One Downloader instance is shared by every worker of every crawl on a
/// [`Crawler`](crate::Crawler), so implementations must be `Send + Sync`
/// and safe to call concurrently. HTTP semantics (redirects, timeouts,
/// status handling) belong entirely to the implementation.
#[async_trait::async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch `url`, returning its document or a [`FetchError`] on any
    /// network or protocol failure.
    async fn download(&self, url: &str) -> Result<Box<dyn Document>, FetchError>;
}

/// A fetched page whose outgoing links can be extracted lazily.
///
/// The crawler calls [`extract_links`](Document::extract_links) at most
/// once per document, from the extraction pool; the link sequence is finite
/// and need not be restartable. Links must be absolute URLs.
#[async_trait::async_trait]
pub trait Document: Send {
    /// Extract the document's outgoing links, or fail with an
    /// [`ExtractError`] if the content is unusable.
    async fn extract_links(&self) -> Result<Vec<String>, ExtractError>;
}
