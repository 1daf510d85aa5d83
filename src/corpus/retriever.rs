//! Cosine top-k retrieval over the corpus index.

use std::cmp::Ordering;
use std::sync::Arc;

use ndarray::Array1;

use crate::core::errors::AppError;
use crate::llm::EmbeddingBackend;

use super::index::CorpusIndex;

/// Prefix applied to queries at embedding time. Must stay paired with
/// [`PASSAGE_PROMPT`]: the corpus was embedded with the passage prefix, and
/// asymmetric prefixes are how the model tells the two sides apart.
pub const QUERY_PROMPT: &str = "query: ";
/// Prefix the chunking/embedding stage applies to corpus passages.
pub const PASSAGE_PROMPT: &str = "passage: ";

/// A corpus chunk returned by retrieval, best match first.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// Row index into the corpus matrix.
    pub index: usize,
    /// Document key of the owning page.
    pub key: String,
    pub text: String,
    pub score: f32,
}

pub struct Retriever {
    index: Arc<CorpusIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl Retriever {
    pub fn new(index: Arc<CorpusIndex>, embedder: Arc<dyn EmbeddingBackend>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &Arc<CorpusIndex> {
        &self.index
    }

    /// Embeds the query and returns up to `top_k` chunks ordered by cosine
    /// similarity, highest first. Ties break toward the lower row index, so
    /// results are deterministic for a fixed corpus and query vector.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, AppError> {
        if top_k == 0 || self.index.is_empty() {
            return Ok(Vec::new());
        }

        let raw = self
            .embedder
            .embed(&format!("{QUERY_PROMPT}{query}"))
            .await?;
        if raw.len() != self.index.dim() {
            return Err(AppError::Alignment(format!(
                "query embedding dimension {} does not match corpus dimension {}",
                raw.len(),
                self.index.dim()
            )));
        }

        let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return Err(AppError::DegenerateEmbedding(
                "query embedded to a zero vector".to_string(),
            ));
        }
        let query_vec = Array1::from_iter(raw.iter().map(|v| v / norm));

        // Rows are unit vectors, so the dot product is the cosine.
        let scores = self.index.matrix().dot(&query_vec);

        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(top_k);

        Ok(ranked
            .into_iter()
            .map(|(index, score)| {
                let chunk = &self.index.chunks()[index];
                RetrievedChunk {
                    index,
                    key: chunk.key.clone(),
                    text: chunk.text.clone(),
                    score,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::index::test_support::{insert_chunk, open_pool};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(vector: Vec<f32>) -> Self {
            Self {
                vector,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, AppError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.vector.clone())
        }
    }

    /// Corpus whose rows score [0.9, 0.5, 0.8, 0.1, 0.95] against the query
    /// (1, 0): each row is (s, sqrt(1 - s^2)), already unit norm.
    async fn scored_retriever(query: Vec<f32>) -> (Retriever, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("corpus.db")).await;
        for (i, s) in [0.9f32, 0.5, 0.8, 0.1, 0.95].into_iter().enumerate() {
            let row = [s, (1.0 - s * s).sqrt()];
            insert_chunk(&pool, &format!("d{i}"), &format!("chunk {i}"), &row).await;
        }

        let index = Arc::new(CorpusIndex::load_from_pool(&pool).await.unwrap());
        let retriever = Retriever::new(index, Arc::new(FixedEmbedder::new(query)));
        (retriever, dir)
    }

    #[tokio::test]
    async fn top_k_is_ordered_by_score_descending() {
        let (retriever, _dir) = scored_retriever(vec![1.0, 0.0]).await;

        let hits = retriever.retrieve("q", 3).await.unwrap();
        let rows: Vec<_> = hits.iter().map(|h| h.index).collect();
        assert_eq!(rows, vec![4, 0, 2]);
        assert!(hits[0].score > hits[1].score && hits[1].score > hits[2].score);
    }

    #[tokio::test]
    async fn retrieval_is_deterministic() {
        let (retriever, _dir) = scored_retriever(vec![1.0, 0.0]).await;

        let first = retriever.retrieve("q", 3).await.unwrap();
        let second = retriever.retrieve("q", 3).await.unwrap();
        let rows = |hits: &[RetrievedChunk]| hits.iter().map(|h| h.index).collect::<Vec<_>>();
        assert_eq!(rows(&first), rows(&second));
    }

    #[tokio::test]
    async fn top_k_saturates_at_corpus_size() {
        let (retriever, _dir) = scored_retriever(vec![1.0, 0.0]).await;

        let hits = retriever.retrieve("q", 100).await.unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn empty_corpus_returns_nothing_without_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let pool = open_pool(&dir.path().join("corpus.db")).await;
        let index = Arc::new(CorpusIndex::load_from_pool(&pool).await.unwrap());

        let embedder = Arc::new(FixedEmbedder::new(vec![1.0, 0.0]));
        let retriever = Retriever::new(index, Arc::clone(&embedder) as Arc<dyn EmbeddingBackend>);

        let hits = retriever.retrieve("q", 3).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_query_vector_is_a_degenerate_embedding() {
        let (retriever, _dir) = scored_retriever(vec![0.0, 0.0]).await;

        let result = retriever.retrieve("q", 3).await;
        assert!(matches!(result, Err(AppError::DegenerateEmbedding(_))));
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_an_alignment_error() {
        let (retriever, _dir) = scored_retriever(vec![1.0, 0.0, 0.0]).await;

        let result = retriever.retrieve("q", 3).await;
        assert!(matches!(result, Err(AppError::Alignment(_))));
    }
}
