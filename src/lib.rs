//! Bounded-depth concurrent web crawler
//!
//! Given a seed URL and a depth limit, `deepfetch` fetches pages, extracts
//! their outgoing links, and recursively fetches those links up to the
//! depth bound. Downloads and link extraction run on two independently
//! sized worker pools, downloads to any single host are capped, and every
//! per-URL failure is recorded without aborting the rest of the crawl.
//!
//! ```ignore
//! use deepfetch::{Crawler, HttpDownloader};
//! use std::sync::Arc;
//!
//! let crawler = Crawler::builder()
//!     .downloaders(8)
//!     .extractors(4)
//!     .per_host(2)
//!     .build(Arc::new(HttpDownloader::new()?))?;
//!
//! let result = crawler.crawl("https://example.com/", 2).await?;
//! ```
//!
//! The network boundary is the [`Downloader`]/[`Document`] trait pair;
//! [`HttpDownloader`] is the bundled implementation, and tests drive the
//! pipeline with in-memory graphs instead.

// Core modules
pub mod crawler;
mod downloader;
mod error;
mod http;

// Public exports
pub use crawler::{CompletionTracker, CrawlResult, Crawler, CrawlerBuilder, HostLimiter};
pub use downloader::{Document, Downloader};
pub use error::{ClosedError, ConfigError, CrawlError, ExtractError, FetchError};
pub use http::{HtmlDocument, HttpDownloader};
