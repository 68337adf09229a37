//! Error types for the crawl pipeline
//!
//! Failures are terminal-but-local: a fetch or extraction error ends one
//! URL's traversal and is recorded against that URL, but never aborts the
//! crawl or any other in-flight branch.

/// A download-stage failure for a single URL.
///
/// Produced by [`Downloader`](crate::Downloader) implementations when the
/// network request or protocol handling fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to download {url}: {cause}")]
pub struct FetchError {
    /// The URL whose download failed
    pub url: String,
    /// Human-readable failure reason
    pub cause: String,
}

impl FetchError {
    /// Create a new FetchError for `url`
    pub fn new(url: impl Into<String>, cause: impl ToString) -> Self {
        Self {
            url: url.into(),
            cause: cause.to_string(),
        }
    }
}

/// An extraction-stage failure.
///
/// Produced by [`Document`](crate::Document) implementations when the
/// fetched content cannot yield its outgoing links.
#[derive(Debug, Clone, thiserror::Error)]
#[error("failed to extract links: {cause}")]
pub struct ExtractError {
    /// Human-readable failure reason
    pub cause: String,
}

impl ExtractError {
    /// Create a new ExtractError
    pub fn new(cause: impl ToString) -> Self {
        Self {
            cause: cause.to_string(),
        }
    }
}

/// The per-URL failure reason recorded in a crawl's error map.
///
/// A URL with any recorded error is excluded from
/// [`CrawlResult::downloaded`](crate::CrawlResult), even when its download
/// itself succeeded (extraction failure is terminal for that node).
#[derive(Debug, thiserror::Error)]
pub enum CrawlError {
    /// The download stage failed; the URL was never fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The URL was fetched but its links could not be extracted
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// The crawler was closed before the task could run
    #[error("crawler shut down before the task could run")]
    Shutdown,
}

/// Errors that can occur during crawler configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Download concurrency must be greater than 0
    #[error("download concurrency must be greater than 0, got {0}")]
    InvalidDownloaders(usize),

    /// Extraction concurrency must be greater than 0
    #[error("extraction concurrency must be greater than 0, got {0}")]
    InvalidExtractors(usize),
}

/// Returned by [`Crawler::crawl`](crate::Crawler::crawl) after
/// [`Crawler::close`](crate::Crawler::close): new crawls fail fast instead
/// of queueing work that would never run.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("crawler is closed")]
pub struct ClosedError;
