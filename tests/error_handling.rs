use deepfetch::*;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

const A: &str = "http://a.test/";
const B: &str = "http://b.test/";
const C: &str = "http://c.test/";

/// Downloader whose pages can fail at either stage: a URL can be missing
/// (fetch failure) or present but marked unparsable (extraction failure).
struct FlakyDownloader {
    pages: HashMap<String, Vec<String>>,
    broken_documents: HashSet<String>,
    fetch_log: Mutex<Vec<String>>,
}

impl FlakyDownloader {
    fn new() -> Self {
        Self {
            pages: HashMap::new(),
            broken_documents: HashSet::new(),
            fetch_log: Mutex::new(Vec::new()),
        }
    }

    fn page(mut self, url: &str, links: &[&str]) -> Self {
        self.pages
            .insert(url.to_string(), links.iter().map(|l| l.to_string()).collect());
        self
    }

    /// The page downloads fine but its link extraction fails
    fn broken_page(mut self, url: &str) -> Self {
        self.broken_documents.insert(url.to_string());
        self.pages.insert(url.to_string(), Vec::new());
        self
    }

    fn fetched(&self, url: &str) -> bool {
        self.fetch_log.lock().unwrap().iter().any(|u| u.as_str() == url)
    }
}

#[async_trait::async_trait]
impl Downloader for FlakyDownloader {
    async fn download(&self, url: &str) -> Result<Box<dyn Document>, FetchError> {
        self.fetch_log.lock().unwrap().push(url.to_string());
        if !self.pages.contains_key(url) {
            return Err(FetchError::new(url, "connection refused"));
        }
        if self.broken_documents.contains(url) {
            return Ok(Box::new(BrokenDoc));
        }
        Ok(Box::new(LinkDoc {
            links: self.pages[url].clone(),
        }))
    }
}

struct LinkDoc {
    links: Vec<String>,
}

#[async_trait::async_trait]
impl Document for LinkDoc {
    async fn extract_links(&self) -> Result<Vec<String>, ExtractError> {
        Ok(self.links.clone())
    }
}

struct BrokenDoc;

#[async_trait::async_trait]
impl Document for BrokenDoc {
    async fn extract_links(&self) -> Result<Vec<String>, ExtractError> {
        Err(ExtractError::new("malformed markup"))
    }
}

#[cfg(test)]
mod fetch_error_tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_root_yields_empty_downloaded() {
        let downloader = Arc::new(FlakyDownloader::new());
        let crawler = Crawler::new(downloader);

        let result = crawler.crawl(A, 3).await.unwrap();

        assert!(result.downloaded.is_empty());
        assert_eq!(result.errors.len(), 1);
        match result.errors.get(A) {
            Some(CrawlError::Fetch(err)) => {
                assert_eq!(err.url, A);
                assert_eq!(err.cause, "connection refused");
            }
            other => panic!("expected a fetch error for the root, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_branch_does_not_abort_siblings() {
        let downloader = Arc::new(FlakyDownloader::new().page(A, &[B, C]).page(C, &[]));
        let crawler = Crawler::new(downloader);

        let result = crawler.crawl(A, 2).await.unwrap();

        assert_eq!(result.downloaded.len(), 2);
        assert!(result.downloaded.contains(A));
        assert!(result.downloaded.contains(C));
        assert!(matches!(result.errors.get(B), Some(CrawlError::Fetch(_))));
    }

    #[tokio::test]
    async fn test_failed_node_children_never_scheduled() {
        // B does not resolve, so its (hypothetical) children are unreachable
        let downloader = Arc::new(FlakyDownloader::new().page(A, &[B]));
        let crawler = Crawler::new(downloader.clone());

        let result = crawler.crawl(A, 5).await.unwrap();

        assert_eq!(result.downloaded.len(), 1);
        assert!(downloader.fetched(B));
        assert!(!downloader.fetched(C));
    }
}

#[cfg(test)]
mod extract_error_tests {
    use super::*;

    #[tokio::test]
    async fn test_extract_failure_excludes_url_from_downloaded() {
        let downloader = Arc::new(FlakyDownloader::new().broken_page(A));
        let crawler = Crawler::new(downloader.clone());

        let result = crawler.crawl(A, 2).await.unwrap();

        // The download itself succeeded, but the node is terminal-failed
        assert!(downloader.fetched(A));
        assert!(result.downloaded.is_empty());
        assert!(matches!(result.errors.get(A), Some(CrawlError::Extract(_))));
    }

    #[tokio::test]
    async fn test_extraction_runs_even_at_depth_one() {
        let downloader = Arc::new(FlakyDownloader::new().broken_page(A));
        let crawler = Crawler::new(downloader);

        let result = crawler.crawl(A, 1).await.unwrap();

        assert!(result.downloaded.is_empty());
        assert!(result.errors.contains_key(A));
    }

    #[tokio::test]
    async fn test_extract_failure_on_inner_node() {
        let downloader = Arc::new(FlakyDownloader::new().page(A, &[B]).broken_page(B));
        let crawler = Crawler::new(downloader);

        let result = crawler.crawl(A, 3).await.unwrap();

        assert_eq!(result.downloaded.len(), 1);
        assert!(result.downloaded.contains(A));
        assert!(matches!(result.errors.get(B), Some(CrawlError::Extract(_))));
    }
}

#[cfg(test)]
mod error_display_tests {
    use super::*;

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::new("http://x.test/", "boom");
        assert_eq!(err.to_string(), "failed to download http://x.test/: boom");
    }

    #[test]
    fn test_extract_error_display() {
        let err = ExtractError::new("malformed markup");
        assert_eq!(err.to_string(), "failed to extract links: malformed markup");
    }

    #[test]
    fn test_crawl_error_is_transparent_over_stage_errors() {
        let fetch: CrawlError = FetchError::new("http://x.test/", "boom").into();
        assert_eq!(fetch.to_string(), "failed to download http://x.test/: boom");

        let extract: CrawlError = ExtractError::new("bad").into();
        assert_eq!(extract.to_string(), "failed to extract links: bad");
    }

    #[tokio::test]
    async fn test_closed_error_display() {
        let downloader = Arc::new(FlakyDownloader::new());
        let crawler = Crawler::new(downloader);
        crawler.close();

        let err = crawler.crawl(A, 1).await.unwrap_err();
        assert_eq!(err.to_string(), "crawler is closed");
    }
}
