//! Routes a query through plain generation or the RAG pipeline.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::AppError;
use crate::corpus::Retriever;
use crate::llm::GenerationBackend;

use super::prompts::context_prompt;

/// How a query should be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatMode {
    /// Forward the query verbatim, no retrieval.
    Plain,
    /// Retrieve context and ground the answer in it.
    #[serde(rename = "RAG")]
    Rag,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Source URLs of the retrieved chunks, best match first. Empty in
    /// plain mode.
    pub references: Vec<String>,
}

pub struct QueryOrchestrator {
    retriever: Retriever,
    generator: Arc<dyn GenerationBackend>,
    supported_models: Vec<String>,
    top_k: usize,
}

impl QueryOrchestrator {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn GenerationBackend>,
        supported_models: Vec<String>,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            supported_models,
            top_k,
        }
    }

    /// Answers a query. The model gate runs before anything else so an
    /// unsupported model never costs a retrieval or a worker round trip.
    pub async fn answer(
        &self,
        query: &str,
        mode: ChatMode,
        model: &str,
    ) -> Result<Answer, AppError> {
        if !self.supported_models.iter().any(|m| m == model) {
            return Err(AppError::UnsupportedModel(model.to_string()));
        }

        match mode {
            ChatMode::Plain => {
                let text = self.generator.generate(query, model).await?;
                Ok(Answer {
                    text,
                    references: Vec::new(),
                })
            }
            ChatMode::Rag => {
                let chunks = self.retriever.retrieve(query, self.top_k).await?;

                let references = chunks
                    .iter()
                    .filter_map(|chunk| {
                        let url = self.retriever.index().url_for(&chunk.key);
                        if url.is_none() {
                            tracing::warn!(key = %chunk.key, "no source URL for retrieved chunk");
                        }
                        url.map(str::to_string)
                    })
                    .collect();

                let context = chunks
                    .iter()
                    .map(|chunk| chunk.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                let prompt = context_prompt(&context, query);

                let text = self.generator.generate(&prompt, model).await?;
                Ok(Answer { text, references })
            }
        }
    }
}
