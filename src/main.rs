use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use quarry::chat::QueryOrchestrator;
use quarry::core::{config::Settings, logging};
use quarry::corpus::{CorpusIndex, Retriever};
use quarry::llm::{EmbeddingBackend, GenerationBackend, WorkerClient};
use quarry::server::{build_router, ApiState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading configuration")?;
    logging::init(&settings.server.log_dir);

    let index = Arc::new(
        CorpusIndex::load(&settings.storage.db_path)
            .await
            .context("loading corpus index")?,
    );
    if index.is_empty() {
        tracing::warn!("corpus is empty; RAG queries will return ungrounded answers");
    }

    let worker = Arc::new(WorkerClient::new(&settings.backend.worker_addr));
    if let Err(err) = worker.health_check().await {
        tracing::warn!(%err, "model worker not reachable at startup");
    }

    let embedder: Arc<dyn EmbeddingBackend> = worker.clone();
    let generator: Arc<dyn GenerationBackend> = worker;

    let retriever = Retriever::new(index, embedder);
    let orchestrator = Arc::new(QueryOrchestrator::new(
        retriever,
        generator,
        settings.backend.supported_models.clone(),
        settings.retrieval.top_k,
    ));

    let app = build_router(ApiState { orchestrator });
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "query server listening");

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}
