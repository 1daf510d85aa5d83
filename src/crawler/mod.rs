//! Incremental website crawler.
//!
//! Each discovered URL moves through `Discovered → Probed → {Fetched |
//! Skipped | Deduped}`: a lightweight HEAD probe filters non-text resources
//! before the full fetch, fetched pages are buffered and checkpointed every
//! `checkpoint_interval` documents, and the visited set rehydrated from the
//! checkpoint store guarantees a URL is never fetched twice across restarts.

mod checkpoint;
mod fetcher;
mod frontier;

pub use checkpoint::{document_key, CheckpointStore, Document};
pub use fetcher::{extract_links, extract_title, is_text_content_type, FetchedPage, PageFetcher};
pub use frontier::{Enqueue, Frontier};

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use regex::Regex;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use url::Url;

use crate::core::config::CrawlSettings;
use crate::core::errors::AppError;

#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlStats {
    pub fetched: usize,
    pub skipped: usize,
    pub deduped: usize,
    pub errors: usize,
}

pub struct Crawler {
    settings: CrawlSettings,
    deny: Vec<Regex>,
    store: CheckpointStore,
    fetcher: PageFetcher,
    frontier: Frontier,
    limiter: DefaultDirectRateLimiter,
    buffer: Mutex<HashMap<String, Document>>,
    fetched: AtomicUsize,
    skipped: AtomicUsize,
    deduped: AtomicUsize,
    errors: AtomicUsize,
}

impl Crawler {
    pub async fn new(settings: CrawlSettings, store: CheckpointStore) -> Result<Arc<Self>, AppError> {
        let deny = settings.deny_regexes()?;
        let fetcher = PageFetcher::new(settings.timeout_secs, &settings.user_agent)?;

        let visited = store.load_keys().await?;
        if !visited.is_empty() {
            tracing::info!(known = visited.len(), "resuming from checkpoint store");
        }

        let rate = NonZeroU32::new(settings.requests_per_second).unwrap_or(NonZeroU32::MIN);
        Ok(Arc::new(Self {
            deny,
            store,
            fetcher,
            frontier: Frontier::new(visited),
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            buffer: Mutex::new(HashMap::new()),
            fetched: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            deduped: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
            settings,
        }))
    }

    /// Seeds the frontier and drives the worker pool to exhaustion. The
    /// checkpoint buffer is flushed unconditionally before returning, so a
    /// graceful shutdown never loses buffered documents.
    pub async fn run(self: Arc<Self>) -> Result<CrawlStats, AppError> {
        for seed in &self.settings.seed_urls {
            match Url::parse(seed) {
                Ok(mut url) => {
                    url.set_fragment(None);
                    let key = document_key(url.as_str());
                    if self.frontier.offer(&key, url.as_str()).await == Enqueue::Deduped {
                        self.deduped.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(%url, "seed already crawled");
                    }
                }
                Err(err) => tracing::warn!(%seed, %err, "ignoring unparsable seed URL"),
            }
        }

        let mut workers = JoinSet::new();
        for _ in 0..self.settings.concurrency {
            let crawler = Arc::clone(&self);
            workers.spawn(async move { crawler.worker().await });
        }

        let mut fatal: Option<AppError> = None;
        while let Some(joined) = workers.join_next().await {
            let failure = match joined {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(err),
                Err(err) => Some(AppError::internal(err)),
            };
            if let Some(err) = failure {
                if fatal.is_none() {
                    self.frontier.close();
                    fatal = Some(err);
                }
            }
        }

        // Always attempt the final flush, but a crawl error stays the
        // primary failure even when the flush fails on the same broken store.
        let flushed = self.flush().await;
        if let Some(err) = fatal {
            if let Err(flush_err) = flushed {
                tracing::error!(%flush_err, "final flush failed after crawl abort");
            }
            return Err(err);
        }
        flushed?;
        Ok(self.stats())
    }

    /// Stops handing out frontier work; in-flight fetches finish and the
    /// final flush in `run` still happens.
    pub fn shutdown(&self) {
        self.frontier.close();
    }

    pub fn stats(&self) -> CrawlStats {
        CrawlStats {
            fetched: self.fetched.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            deduped: self.deduped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    async fn worker(&self) -> Result<(), AppError> {
        while let Some(url) = self.frontier.next_url().await {
            let outcome = self.process(&url).await;
            self.frontier.task_done();

            match outcome {
                Ok(()) => {}
                Err(err @ AppError::Persistence(_)) => {
                    tracing::error!(%url, %err, "checkpoint flush failed, halting crawl");
                    return Err(err);
                }
                Err(err) => {
                    self.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(%url, %err, "skipping URL");
                }
            }
        }
        Ok(())
    }

    /// Probe → fetch → emit → expand: the per-URL state machine.
    async fn process(&self, url: &str) -> Result<(), AppError> {
        self.limiter.until_ready().await;
        if !self.fetcher.probe_is_text(url).await? {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(%url, "skipping non-text URL");
            return Ok(());
        }

        self.limiter.until_ready().await;
        let page = self.fetcher.fetch(url).await?;

        // Redirects can land on a page already captured under its own key.
        let key = document_key(&page.url);
        if key != document_key(url) && !self.frontier.mark_seen(&key).await {
            self.deduped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let base = Url::parse(&page.url).map_err(AppError::fetch)?;
        let doc = Document {
            key,
            title: extract_title(&page.body),
            url: page.url.clone(),
            fetched_at: Utc::now(),
            content: page.body,
        };
        let body_links = extract_links(&base, &doc.content);

        self.emit(doc).await?;
        self.fetched.fetch_add(1, Ordering::Relaxed);

        for link in body_links {
            if !self.in_scope(&link) {
                continue;
            }
            let link_key = document_key(link.as_str());
            match self.frontier.offer(&link_key, link.as_str()).await {
                Enqueue::Scheduled => {}
                Enqueue::Deduped => {
                    self.deduped.fetch_add(1, Ordering::Relaxed);
                }
                Enqueue::Closed => break,
            }
        }
        Ok(())
    }

    fn in_scope(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };

        let allowed = self.settings.allowed_domains.is_empty()
            || self
                .settings
                .allowed_domains
                .iter()
                .any(|domain| host == domain || host.ends_with(&format!(".{domain}")));
        if !allowed {
            return false;
        }

        !self.deny.iter().any(|re| re.is_match(url.as_str()))
    }

    /// Buffers the document and flushes once the buffer reaches the
    /// checkpoint interval.
    async fn emit(&self, doc: Document) -> Result<(), AppError> {
        let ready = {
            let mut buffer = self.buffer.lock().await;
            buffer.insert(doc.key.clone(), doc);
            buffer.len() >= self.settings.checkpoint_interval
        };

        if ready {
            self.flush().await?;
        }
        Ok(())
    }

    /// Swaps the buffer out before writing so emits never wait on the merge.
    async fn flush(&self) -> Result<(), AppError> {
        let items = { std::mem::take(&mut *self.buffer.lock().await) };
        if items.is_empty() {
            return Ok(());
        }

        tracing::info!(documents = items.len(), "flushing checkpoint");
        self.store.merge(&items).await
    }
}
