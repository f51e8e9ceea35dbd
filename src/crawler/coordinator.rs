//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator task alone owns the frontier and the document assembler,
//! so claiming a URL and recording a result never race. Page work (fetch,
//! extraction, asset resolution) runs in a `JoinSet` of at most `workers`
//! tasks that report a `PageResult` back.
//!
//! Results are applied in dispatch order: a page that finishes early waits in
//! a reorder buffer until every page dispatched before it has been applied.
//! Links are therefore discovered, and sequence numbers assigned, exactly as
//! a sequential breadth-first crawl would assign them, whatever the timing.

use crate::config::Config;
use crate::crawler::assets::{AssetError, AssetResolver, ResolvedAsset};
use crate::crawler::events::{progress_fraction, CrawlEvent, EventSink, LogSink};
use crate::crawler::extract::Extractor;
use crate::crawler::fetcher::{Fetch, HttpFetcher};
use crate::crawler::parser::parse_page;
use crate::output::{Document, DocumentAssembler};
use crate::render::{ChromeRenderer, Renderer};
use crate::state::{FailureKind, Frontier, FrontierEntry, PageContent, PageResult, PageStatus};
use crate::url::{normalize_parsed, parse_seed, ExclusionPolicy, LinkClassifier};
use crate::BinderError;
use futures::FutureExt;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    seed: Url,
    fetcher: Arc<dyn Fetch>,
    renderer: Option<Arc<dyn Renderer>>,
    sink: Arc<dyn EventSink>,
}

impl Coordinator {
    /// Creates a coordinator for one crawl
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Ready to run
    /// * `Err(BinderError)` - Invalid seed, invalid configuration, or the
    ///   HTTP client could not be built
    pub fn new(config: Config) -> Result<Self, BinderError> {
        let seed = parse_seed(&config.crawler.seed)?;
        crate::config::validate(&config)?;

        let fetcher = HttpFetcher::new(&config.fetcher)?;
        let renderer: Option<Arc<dyn Renderer>> = if config.rendering.dynamic {
            Some(Arc::new(ChromeRenderer::from_config(
                &config.rendering,
                &config.fetcher,
            )))
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            seed,
            fetcher: Arc::new(fetcher),
            renderer,
            sink: Arc::new(LogSink),
        })
    }

    /// Replaces the page fetcher
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Replaces the headless renderer; only used when dynamic rendering is on
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Sends events to `sink` instead of the log
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn seed(&self) -> &Url {
        &self.seed
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn build_worker(&self) -> Result<PageWorker, BinderError> {
        let dynamic = self.config.rendering.dynamic;

        let mut resolver = AssetResolver::new(&self.config.assets, &self.config.fetcher)?;
        if let (true, Some(renderer)) = (dynamic, &self.renderer) {
            resolver = resolver.with_renderer(renderer.clone());
        }

        Ok(PageWorker {
            fetcher: self.fetcher.clone(),
            extractor: Extractor::new(self.renderer.clone(), dynamic),
            resolver,
            sink: self.sink.clone(),
            surface_invalid: self.config.links.surface_invalid,
        })
    }

    /// Runs the crawl until the frontier drains or `cancel` fires
    ///
    /// A cancelled run (or one that hits the configured deadline) stops
    /// dispatching, waits for in-flight pages and still returns the partial
    /// document; it is not an error.
    pub async fn run(&self, cancel: CancellationToken) -> Result<Document, BinderError> {
        let crawler = &self.config.crawler;
        let workers = crawler.workers.max(1) as usize;
        let page_delay = crawler.page_delay();

        let classifier = LinkClassifier::new(&self.seed, ExclusionPolicy::from(&self.config.links))
            .ok_or_else(|| BinderError::InvalidSeed {
                url: self.seed.to_string(),
                reason: "missing host".to_string(),
            })?;
        let mut frontier = Frontier::new(classifier, crawler.max_depth);
        frontier.enqueue_seed(self.seed.clone());

        let worker = Arc::new(self.build_worker()?);
        let mut assembler = DocumentAssembler::new(self.seed.clone());
        let mut tasks: JoinSet<PageResult> = JoinSet::new();

        // Reorder buffer: seqs in dispatch order, and results waiting their turn
        let mut dispatched: VecDeque<u64> = VecDeque::new();
        let mut ready: BTreeMap<u64, PageResult> = BTreeMap::new();

        // Normalized URLs that captured pages actually landed on
        let mut landed: HashSet<String> = HashSet::new();

        let mut completed = 0usize;
        let mut stopped = false;

        let deadline = crawler.deadline().map(|limit| Instant::now() + limit);
        let deadline_reached = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline_reached);

        tracing::info!(
            "Starting crawl of {} (max depth {}, {} workers)",
            self.seed,
            crawler.max_depth,
            workers
        );

        loop {
            if !stopped && cancel.is_cancelled() {
                stopped = true;
                self.sink.emit(CrawlEvent::Cancelled);
            }

            // Fill free worker slots from the frontier
            while !stopped && tasks.len() < workers && !frontier.is_empty() {
                if let Some(delay) = page_delay {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            stopped = true;
                            self.sink.emit(CrawlEvent::Cancelled);
                            break;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }

                let Some(entry) = frontier.dequeue() else {
                    break;
                };

                tracing::debug!("Dispatching [{}] depth {}: {}", entry.seq, entry.depth, entry.url);
                dispatched.push_back(entry.seq);

                let worker = worker.clone();
                tasks.spawn(async move { worker.process_guarded(entry).await });
            }

            if tasks.is_empty() {
                // Nothing in flight and nothing more will be dispatched
                break;
            }

            tokio::select! {
                _ = cancel.cancelled(), if !stopped => {
                    stopped = true;
                    self.sink.emit(CrawlEvent::Cancelled);
                }
                _ = &mut deadline_reached, if !stopped => {
                    tracing::warn!("Crawl deadline reached, finishing in-flight pages");
                    stopped = true;
                    self.sink.emit(CrawlEvent::Cancelled);
                }
                joined = tasks.join_next() => {
                    match joined {
                        Some(Ok(result)) => {
                            ready.insert(result.seq, result);
                        }
                        Some(Err(e)) => {
                            tracing::error!("Page task did not complete: {}", e);
                        }
                        None => {}
                    }

                    while let Some(result) = dispatched
                        .front()
                        .and_then(|seq| ready.remove(seq))
                    {
                        dispatched.pop_front();
                        self.apply(result, &mut frontier, &mut assembler, &mut landed);
                        completed += 1;
                        self.report_progress(
                            completed,
                            tasks.len() + ready.len(),
                            frontier.pending(),
                        );
                    }
                }
            }
        }

        // Only reachable with results whose predecessors never reported
        for (_, result) in std::mem::take(&mut ready) {
            self.apply(result, &mut frontier, &mut assembler, &mut landed);
        }

        let cancelled = stopped && !frontier.is_empty();
        let failures = assembler.failures();
        let pages = assembler.len() - failures;
        self.sink.emit(CrawlEvent::Finished { pages, failures });

        tracing::info!(
            "Crawl of {} done: {} pages, {} failures, {} left in frontier",
            self.seed,
            pages,
            failures,
            frontier.pending()
        );

        Ok(assembler.finalize(cancelled, frontier.stats()))
    }

    /// Feeds one result back into the frontier and the assembler
    ///
    /// A page whose redirect landed on a URL another page already captured is
    /// dropped: both were in flight before the redirect was known.
    fn apply(
        &self,
        result: PageResult,
        frontier: &mut Frontier,
        assembler: &mut DocumentAssembler,
        landed: &mut HashSet<String>,
    ) {
        match &result.status {
            PageStatus::Ok(content) => {
                let target = content
                    .final_url
                    .clone()
                    .and_then(|url| normalize_parsed(url).ok())
                    .unwrap_or_else(|| result.url.clone());
                if target != result.url {
                    frontier.mark_visited(&target);
                }
                if !landed.insert(target.to_string()) {
                    tracing::debug!(
                        "[{}] {} landed on {}, already captured",
                        result.seq,
                        result.url,
                        target
                    );
                    return;
                }

                let base = result.base_url().clone();
                let child_depth = result.depth + 1;
                let mut queued = 0;
                for href in &content.links {
                    if frontier.enqueue_if_new(href, &base, child_depth) {
                        queued += 1;
                    }
                }
                tracing::debug!(
                    "[{}] {}: {} links, {} newly queued",
                    result.seq,
                    result.url,
                    content.links.len(),
                    queued
                );

                for href in &content.annotations {
                    self.sink.emit(CrawlEvent::InvalidLink {
                        page: result.url.to_string(),
                        href: href.clone(),
                    });
                }

                self.sink.emit(CrawlEvent::PageCompleted {
                    url: result.url.to_string(),
                    seq: result.seq,
                    strategy: content.strategy,
                    chars: content.text.chars().count(),
                });
            }
            PageStatus::Failed { kind, reason } => {
                self.sink.emit(CrawlEvent::PageFailed {
                    url: result.url.to_string(),
                    seq: result.seq,
                    kind: *kind,
                    reason: reason.clone(),
                });
            }
        }

        assembler.merge(result);
    }

    fn report_progress(&self, completed: usize, in_flight: usize, pending: usize) {
        self.sink.emit(CrawlEvent::Progress {
            completed,
            in_flight,
            pending,
            fraction: progress_fraction(completed, in_flight, pending),
        });
    }
}

/// Everything a page task needs, shared by all tasks of a run
struct PageWorker {
    fetcher: Arc<dyn Fetch>,
    extractor: Extractor,
    resolver: AssetResolver,
    sink: Arc<dyn EventSink>,
    surface_invalid: bool,
}

impl PageWorker {
    /// Processes `entry`, turning a panic into a failed result
    async fn process_guarded(&self, entry: FrontierEntry) -> PageResult {
        match AssertUnwindSafe(self.process(&entry)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => PageResult::failed(&entry, FailureKind::Parse, "page processing panicked"),
        }
    }

    /// Fetch, then extract text and resolve images side by side
    async fn process(&self, entry: &FrontierEntry) -> PageResult {
        let page = match self.fetcher.fetch(&entry.url).await {
            Ok(page) => page,
            Err(e) => return PageResult::failed(entry, e.kind(), e.to_string()),
        };

        let parsed = parse_page(&page.markup);
        let base = page.final_url.clone();

        let (extraction, images) = tokio::join!(
            self.extractor.extract(&page.markup, &base),
            self.resolver.resolve_all(&parsed.images, &base),
        );

        let mut links = parsed.links;
        let mut title = parsed.title;
        if let Some(rendered) = &extraction.rendered {
            let rendered = parse_page(rendered);
            links.extend(rendered.links);
            title = title.or(rendered.title);
        }

        let assets = self.collect_assets(images);

        PageResult::ok(
            entry,
            PageContent {
                final_url: Some(page.final_url),
                title,
                text: extraction.text,
                strategy: extraction.strategy,
                links,
                assets,
                annotations: if self.surface_invalid {
                    parsed.non_navigable
                } else {
                    Vec::new()
                },
            },
        )
    }

    /// Reports each image outcome and keeps one entry per stored file
    fn collect_assets(
        &self,
        outcomes: Vec<(String, Result<ResolvedAsset, AssetError>)>,
    ) -> Vec<ResolvedAsset> {
        let mut assets: Vec<ResolvedAsset> = Vec::new();

        for (src, outcome) in outcomes {
            match outcome {
                Ok(asset) => {
                    self.sink.emit(CrawlEvent::AssetResolved {
                        source: asset.source.to_string(),
                        path: asset.path.clone(),
                    });
                    if !assets.iter().any(|a| a.path == asset.path) {
                        assets.push(asset);
                    }
                }
                Err(AssetError::UnsupportedExtension(reference)) => {
                    tracing::trace!("Skipping image {}", reference);
                }
                Err(e) => self.sink.emit(CrawlEvent::AssetFailed {
                    source: src,
                    reason: e.to_string(),
                }),
            }
        }

        assets
    }
}

/// Runs a complete crawl with events written to the log
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Document)` - The (possibly partial) capture
/// * `Err(BinderError)` - The run could not start
pub async fn run_crawl(config: Config) -> Result<Document, BinderError> {
    Coordinator::new(config)?.run(CancellationToken::new()).await
}
