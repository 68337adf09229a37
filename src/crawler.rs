//! Bounded-depth concurrent crawler core
//!
//! This module provides the crawl pipeline:
//! - **Two worker pools**: independently sized download and extraction
//!   stages, each draining its own queue
//! - **Deduplicated traversal**: every URL is downloaded at most once per
//!   crawl call, even over cyclic link graphs
//! - **Per-host limiting**: at most `per_host` downloads in flight against
//!   any single host, without stalling other hosts
//! - **Race-free completion**: the initiating call blocks on a counting
//!   barrier until all recursively spawned work has finished
//!
//! # Examples
//!
//! ```ignore
//! use deepfetch::{Crawler, HttpDownloader};
//! use std::sync::Arc;
//!
//! let downloader = Arc::new(HttpDownloader::new()?);
//! let crawler = Crawler::builder()
//!     .downloaders(8)
//!     .extractors(4)
//!     .per_host(2)
//!     .build(downloader)?;
//!
//! let result = crawler.crawl("https://example.com/", 3).await?;
//! println!("downloaded {} pages", result.downloaded.len());
//! for (url, reason) in &result.errors {
//!     eprintln!("{url}: {reason}");
//! }
//! crawler.close();
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::downloader::{Document, Downloader};
use crate::error::{ClosedError, ConfigError, CrawlError};

/// Detects when a crawl is complete by counting outstanding tasks
///
/// A counting barrier: the crawl call holds one unit for itself and every
/// task holds one unit from registration until it finishes. The caller's
/// `wait` returns once the count reaches zero. Registration always happens
/// under a unit the registering party still holds, so the count can never
/// rise again after the waiter has observed zero.
#[derive(Debug)]
pub struct CompletionTracker {
    outstanding: AtomicUsize,
    zero: Notify,
}

impl CompletionTracker {
    /// Create a tracker with no outstanding work
    pub fn new() -> Self {
        Self {
            outstanding: AtomicUsize::new(0),
            zero: Notify::new(),
        }
    }

    /// Claim one unit of outstanding work
    pub fn register(&self) {
        // SeqCst keeps registrations totally ordered with the zero checks
        // in done() and wait().
        self.outstanding.fetch_add(1, Ordering::SeqCst);
    }

    /// Release one unit; the last release wakes the waiter
    pub fn done(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            // notify_one stores a permit, so the wake is not lost even if
            // the waiter has not subscribed yet.
            self.zero.notify_one();
        }
    }

    /// Current count of outstanding units
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Block until the outstanding count reaches zero
    pub async fn wait(&self) {
        loop {
            let zero = self.zero.notified();
            if self.outstanding() == 0 {
                return;
            }
            zero.await;
        }
    }
}

impl Default for CompletionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Caps concurrently in-flight work per host
///
/// `admit` hands the task back when a slot is free and parks it otherwise;
/// `release` frees a slot and yields one parked task for resubmission. The
/// in-flight count and the parked queue share one lock, so the count never
/// exceeds the cap under any interleaving. A cap of 0 means unlimited.
pub struct HostLimiter<T> {
    cap: usize,
    hosts: Mutex<HashMap<String, HostSlots<T>>>,
}

struct HostSlots<T> {
    in_flight: usize,
    parked: VecDeque<T>,
}

impl<T> Default for HostSlots<T> {
    fn default() -> Self {
        Self {
            in_flight: 0,
            parked: VecDeque::new(),
        }
    }
}

impl<T> HostLimiter<T> {
    /// Create a limiter allowing `cap` in-flight tasks per host (0 = unlimited)
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Try to claim a slot for `host`.
    ///
    /// Returns the task when a slot was claimed; otherwise the task is
    /// parked inside the limiter until [`release`](Self::release) frees a
    /// slot for that host. Never blocks.
    pub fn admit(&self, host: &str, task: T) -> Option<T> {
        if self.cap == 0 {
            return Some(task);
        }
        let mut hosts = self.hosts.lock().unwrap();
        let slots = hosts.entry(host.to_string()).or_default();
        if slots.in_flight < self.cap {
            slots.in_flight += 1;
            Some(task)
        } else {
            slots.parked.push_back(task);
            None
        }
    }

    /// Free a slot for `host`, yielding a parked task to resubmit (if any).
    ///
    /// Entries with no in-flight and no parked work are dropped so the map
    /// does not grow without bound across crawls.
    pub fn release(&self, host: &str) -> Option<T> {
        if self.cap == 0 {
            return None;
        }
        let mut hosts = self.hosts.lock().unwrap();
        let slots = hosts.get_mut(host)?;
        slots.in_flight = slots.in_flight.saturating_sub(1);
        let next = slots.parked.pop_front();
        if slots.in_flight == 0 && slots.parked.is_empty() {
            hosts.remove(host);
        }
        next
    }

    /// Current in-flight count for `host`
    pub fn in_flight(&self, host: &str) -> usize {
        self.hosts
            .lock()
            .unwrap()
            .get(host)
            .map(|slots| slots.in_flight)
            .unwrap_or(0)
    }
}

/// Outcome of one crawl call
///
/// `downloaded` holds every URL that was fetched successfully and recorded
/// no later failure; `errors` maps each failed URL to its reason. A URL
/// whose download succeeded but whose extraction failed appears only in
/// `errors`.
#[derive(Debug, Default)]
pub struct CrawlResult {
    /// URLs fetched and fully processed
    pub downloaded: HashSet<String>,
    /// URL to failure reason, for every URL whose traversal ended in an error
    pub errors: HashMap<String, CrawlError>,
}

/// Validated configuration for the crawler
#[derive(Debug, Clone)]
struct CrawlerConfig {
    downloaders: usize,
    extractors: usize,
    per_host: usize,
}

const DEFAULT_DOWNLOADERS: usize = 2;
const DEFAULT_EXTRACTORS: usize = 2;

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            downloaders: DEFAULT_DOWNLOADERS,
            extractors: DEFAULT_EXTRACTORS,
            per_host: 0,
        }
    }
}

impl CrawlerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.downloaders == 0 {
            return Err(ConfigError::InvalidDownloaders(0));
        }
        if self.extractors == 0 {
            return Err(ConfigError::InvalidExtractors(0));
        }
        Ok(())
    }
}

/// A download task: fetch `url`, then hand the document to the extraction
/// stage. `depth` is the remaining depth and is always greater than zero.
struct DownloadJob {
    url: String,
    depth: usize,
    ctx: Arc<CrawlContext>,
}

/// An extraction task: pull links out of `doc` and schedule unseen ones.
struct ExtractJob {
    doc: Box<dyn Document>,
    url: String,
    depth: usize,
    ctx: Arc<CrawlContext>,
}

/// State owned by a single crawl call and threaded through its task graph.
///
/// Never shared between crawl calls; only the pool queues, the limiter and
/// the downloader are process-wide.
struct CrawlContext {
    tracker: CompletionTracker,
    /// URLs whose download has been scheduled (dedup set, monotone)
    scheduled: Mutex<HashSet<String>>,
    /// URLs whose extraction has been scheduled (dedup set, monotone)
    extracted: Mutex<HashSet<String>>,
    errors: Mutex<HashMap<String, CrawlError>>,
    downloads: mpsc::UnboundedSender<DownloadJob>,
    extracts: mpsc::UnboundedSender<ExtractJob>,
    shutdown: CancellationToken,
}

impl CrawlContext {
    /// Insert-if-absent on the download registry; true means this caller
    /// owns the URL.
    fn claim_download(&self, url: &str) -> bool {
        self.scheduled.lock().unwrap().insert(url.to_string())
    }

    fn claim_extract(&self, url: &str) -> bool {
        self.extracted.lock().unwrap().insert(url.to_string())
    }

    fn record_error(&self, url: String, err: CrawlError) {
        self.errors.lock().unwrap().insert(url, err);
    }

    fn take_result(&self) -> CrawlResult {
        let errors = std::mem::take(&mut *self.errors.lock().unwrap());
        let scheduled = std::mem::take(&mut *self.scheduled.lock().unwrap());
        let downloaded = scheduled
            .into_iter()
            .filter(|url| !errors.contains_key(url))
            .collect();
        CrawlResult { downloaded, errors }
    }
}

/// Schedule a download for `url` if it is still unseen in this crawl.
///
/// The dedup insert decides ownership; the tracker unit is claimed before
/// the job reaches the pool, so the barrier can never observe a transient
/// zero while work is about to be spawned.
fn schedule_download(ctx: &Arc<CrawlContext>, url: String, depth: usize) {
    if depth == 0 {
        return;
    }
    if !ctx.claim_download(&url) {
        return;
    }
    if ctx.shutdown.is_cancelled() {
        tracing::warn!(%url, "submission refused, crawler closed");
        ctx.record_error(url, CrawlError::Shutdown);
        return;
    }
    ctx.tracker.register();
    let job = DownloadJob {
        url,
        depth,
        ctx: Arc::clone(ctx),
    };
    if let Err(send) = ctx.downloads.send(job) {
        let DownloadJob { url, .. } = send.0;
        ctx.record_error(url, CrawlError::Shutdown);
        ctx.tracker.done();
    }
}

/// Schedule link extraction for a downloaded document.
fn schedule_extract(ctx: &Arc<CrawlContext>, doc: Box<dyn Document>, url: String, depth: usize) {
    if !ctx.claim_extract(&url) {
        return;
    }
    if ctx.shutdown.is_cancelled() {
        tracing::warn!(%url, "extraction refused, crawler closed");
        ctx.record_error(url, CrawlError::Shutdown);
        return;
    }
    ctx.tracker.register();
    let job = ExtractJob {
        doc,
        url,
        depth,
        ctx: Arc::clone(ctx),
    };
    if let Err(send) = ctx.extracts.send(job) {
        let ExtractJob { url, .. } = send.0;
        ctx.record_error(url, CrawlError::Shutdown);
        ctx.tracker.done();
    }
}

/// Feed a task the limiter un-parked back into the download queue.
///
/// The task was registered when first scheduled; parking and resubmission
/// are one continuous lifecycle, so no tracker traffic here.
fn resubmit(parked: DownloadJob) {
    let downloads = parked.ctx.downloads.clone();
    if let Err(send) = downloads.send(parked) {
        let DownloadJob { url, ctx, .. } = send.0;
        tracing::warn!(%url, "download queue closed, dropping deferred task");
        ctx.record_error(url, CrawlError::Shutdown);
        ctx.tracker.done();
    }
}

/// Download-stage worker body.
async fn run_download(job: DownloadJob, downloader: &dyn Downloader, limiter: &HostLimiter<DownloadJob>) {
    let host = host_of(&job.url);
    let job = match &host {
        Some(h) => match limiter.admit(h, job) {
            Some(admitted) => admitted,
            // Parked inside the limiter; the worker slot is free again and
            // this task's lifecycle resumes when a slot opens.
            None => return,
        },
        // No parseable host, nothing to limit; the downloader decides
        // whether such a URL is fetchable at all.
        None => job,
    };

    let DownloadJob { url, depth, ctx } = job;
    tracing::debug!(%url, depth, "downloading");
    let fetched = downloader.download(&url).await;

    if let Some(h) = &host {
        if let Some(parked) = limiter.release(h) {
            resubmit(parked);
        }
    }

    match fetched {
        Ok(doc) => schedule_extract(&ctx, doc, url, depth),
        Err(err) => {
            tracing::warn!(error = %err, "download failed");
            ctx.record_error(url, CrawlError::Fetch(err));
        }
    }
    ctx.tracker.done();
}

/// Extraction-stage worker body.
async fn run_extract(job: ExtractJob) {
    let ExtractJob {
        doc,
        url,
        depth,
        ctx,
    } = job;
    match doc.extract_links().await {
        Ok(links) => {
            tracing::debug!(%url, found = links.len(), "extracted links");
            for link in links {
                schedule_download(&ctx, link, depth - 1);
            }
        }
        Err(err) => {
            tracing::warn!(%url, error = %err, "extraction failed");
            ctx.record_error(url, CrawlError::Extract(err));
        }
    }
    // Released only after every child task is registered.
    ctx.tracker.done();
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_owned)
}

/// Bounded-depth concurrent web crawler
///
/// Owns the two worker pools and the per-host limiter; each
/// [`crawl`](Crawler::crawl) call wires a fresh set of per-call state into
/// a recursive task graph over those pools. Calls may run concurrently on
/// one instance.
///
/// Construction spawns the pool tasks and therefore requires a running
/// Tokio runtime.
#[derive(Debug)]
pub struct Crawler {
    downloads: mpsc::UnboundedSender<DownloadJob>,
    extracts: mpsc::UnboundedSender<ExtractJob>,
    shutdown: CancellationToken,
}

impl Crawler {
    /// Create a crawler with default pool sizes and no per-host cap
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self::new_with_config(CrawlerConfig::default(), downloader)
    }

    /// Create a crawler builder for custom configuration
    pub fn builder() -> CrawlerBuilder {
        CrawlerBuilder::default()
    }

    fn new_with_config(config: CrawlerConfig, downloader: Arc<dyn Downloader>) -> Self {
        let (downloads, download_rx) = mpsc::unbounded_channel();
        let (extracts, extract_rx) = mpsc::unbounded_channel();
        let limiter = Arc::new(HostLimiter::new(config.per_host));

        let pool = config.downloaders;
        tokio::spawn(async move {
            UnboundedReceiverStream::new(download_rx)
                .for_each_concurrent(pool, move |job| {
                    let downloader = Arc::clone(&downloader);
                    let limiter = Arc::clone(&limiter);
                    async move { run_download(job, &*downloader, &limiter).await }
                })
                .await;
            tracing::debug!("download pool drained");
        });

        let pool = config.extractors;
        tokio::spawn(async move {
            UnboundedReceiverStream::new(extract_rx)
                .for_each_concurrent(pool, run_extract)
                .await;
            tracing::debug!("extraction pool drained");
        });

        Self {
            downloads,
            extracts,
            shutdown: CancellationToken::new(),
        }
    }

    /// Crawl outward from `root`, following links up to `depth` pages deep.
    ///
    /// `depth` counts pages along a chain: 1 downloads only the root, 2
    /// also downloads the pages it links to, and so on. A depth of 0
    /// returns an empty result without contacting the downloader.
    ///
    /// Blocks until every recursively spawned task has finished. Fails fast
    /// with [`ClosedError`] after [`close`](Self::close).
    ///
    /// There is no per-call cancellation or timeout; `close` is the only
    /// way to stop the pipeline early.
    pub async fn crawl(&self, root: &str, depth: usize) -> Result<CrawlResult, ClosedError> {
        if self.shutdown.is_cancelled() {
            return Err(ClosedError);
        }
        if depth == 0 {
            return Ok(CrawlResult::default());
        }

        let ctx = Arc::new(CrawlContext {
            tracker: CompletionTracker::new(),
            scheduled: Mutex::new(HashSet::new()),
            extracted: Mutex::new(HashSet::new()),
            errors: Mutex::new(HashMap::new()),
            downloads: self.downloads.clone(),
            extracts: self.extracts.clone(),
            shutdown: self.shutdown.clone(),
        });

        // One unit for the call itself, so the barrier cannot hit zero
        // before the root task is submitted.
        ctx.tracker.register();
        schedule_download(&ctx, root.to_string(), depth);
        ctx.tracker.done();

        ctx.tracker.wait().await;
        tracing::debug!(root, "crawl complete");
        Ok(ctx.take_result())
    }

    /// Stop accepting new crawl calls and new task submissions.
    ///
    /// Queued and in-flight tasks drain; results already downloaded by
    /// in-progress calls are kept. Tasks refused at the pool boundary after
    /// this point record a shutdown error for their URL.
    pub fn close(&self) {
        tracing::debug!("crawler closing, queued and in-flight tasks drain");
        self.shutdown.cancel();
    }
}

/// Builder for configuring a [`Crawler`]
pub struct CrawlerBuilder {
    config: CrawlerConfig,
}

impl Default for CrawlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlerBuilder {
    /// Create a new CrawlerBuilder with default settings
    pub fn new() -> Self {
        Self {
            config: CrawlerConfig::default(),
        }
    }

    /// Set the number of download workers (default: 2)
    pub fn downloaders(mut self, count: usize) -> Self {
        self.config.downloaders = count;
        self
    }

    /// Set the number of extraction workers (default: 2)
    pub fn extractors(mut self, count: usize) -> Self {
        self.config.extractors = count;
        self
    }

    /// Cap concurrent downloads against a single host (default: 0, unlimited)
    pub fn per_host(mut self, cap: usize) -> Self {
        self.config.per_host = cap;
        self
    }

    /// Build the crawler, validating the configuration
    pub fn build(self, downloader: Arc<dyn Downloader>) -> Result<Crawler, ConfigError> {
        self.config.validate()?;
        Ok(Crawler::new_with_config(self.config, downloader))
    }
}
