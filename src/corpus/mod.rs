//! Corpus loading and dense retrieval.

pub(crate) mod index;
mod retriever;

pub use index::{decode_embedding, encode_embedding, ChunkRecord, CorpusIndex};
pub use retriever::{RetrievedChunk, Retriever, PASSAGE_PROMPT, QUERY_PROMPT};
