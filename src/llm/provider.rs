use async_trait::async_trait;

use crate::core::errors::AppError;

/// Turns text into a dense vector. The corpus side and the query side must
/// go through the same backend family or the score space is meaningless.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;
}

/// Produces a completion for a fully rendered prompt.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, prompt: &str, model: &str) -> Result<String, AppError>;
}
