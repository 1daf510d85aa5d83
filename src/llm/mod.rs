//! Model-worker backends for embedding and text generation.

mod provider;
mod worker;

pub use provider::{EmbeddingBackend, GenerationBackend};
pub use worker::WorkerClient;
