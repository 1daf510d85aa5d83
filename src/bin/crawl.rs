//! Crawl entry point: seeds the frontier from the configuration and runs
//! the worker pool to exhaustion, checkpointing along the way. Ctrl-C stops
//! handing out work and flushes what was already fetched.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::signal;

use quarry::core::{config::Settings, logging};
use quarry::crawler::{CheckpointStore, Crawler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    logging::init(&settings.server.log_dir);

    if settings.crawl.seed_urls.is_empty() {
        bail!(
            "no seed URLs configured; add crawl.seed_urls to {}",
            Settings::config_path().display()
        );
    }

    let store = CheckpointStore::open(&settings.storage.db_path)
        .await
        .context("opening checkpoint store")?;
    let crawler = Crawler::new(settings.crawl, store).await?;

    let runner = Arc::clone(&crawler);
    let mut crawl = tokio::spawn(async move { runner.run().await });

    let stats = tokio::select! {
        res = &mut crawl => res.context("crawl task panicked")??,
        _ = signal::ctrl_c() => {
            tracing::info!("interrupt received, draining in-flight fetches");
            crawler.shutdown();
            (&mut crawl).await.context("crawl task panicked")??
        }
    };

    tracing::info!(
        fetched = stats.fetched,
        skipped = stats.skipped,
        deduped = stats.deduped,
        errors = stats.errors,
        "crawl finished"
    );
    Ok(())
}
