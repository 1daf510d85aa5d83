//! Deduplicated, row-normalized corpus of chunk embeddings.
//!
//! Chunk records are produced by an external chunking/embedding stage and
//! read here in insertion order. Row *i* of the embedding matrix always
//! corresponds to element *i* of the chunk sequence; anything that would
//! break that alignment is a fatal load error.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use ndarray::Array2;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::core::errors::AppError;

/// Chunk metadata kept alongside the matrix. `key` is the owning document.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub key: String,
    pub text: String,
}

/// Little-endian f32 blob codec shared with the embedding stage.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

pub struct CorpusIndex {
    chunks: Vec<ChunkRecord>,
    matrix: Array2<f32>,
    urls: HashMap<String, String>,
}

impl CorpusIndex {
    pub async fn load(db_path: &Path) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(AppError::internal)?;

        Self::load_from_pool(&pool).await
    }

    /// Reads chunk rows in insertion order, deduplicates by exact chunk
    /// text (first occurrence wins, survivor order preserved), stacks the
    /// embeddings, and L2-normalizes every row. Zero-norm rows are dropped
    /// with a warning rather than poisoning similarity scores with NaN.
    pub async fn load_from_pool(pool: &SqlitePool) -> Result<Self, AppError> {
        init_corpus_schema(pool).await?;

        let rows = sqlx::query("SELECT key, text_chunked, emb FROM chunks ORDER BY id")
            .fetch_all(pool)
            .await
            .map_err(AppError::internal)?;

        let mut seen_text: HashSet<String> = HashSet::new();
        let mut chunks: Vec<ChunkRecord> = Vec::new();
        let mut flat: Vec<f32> = Vec::new();
        let mut dim: Option<usize> = None;
        let mut dropped = 0usize;

        for row in &rows {
            let text: String = row.get("text_chunked");
            if !seen_text.insert(text.clone()) {
                continue;
            }

            let key: String = row.get("key");
            let blob: Vec<u8> = row.try_get("emb").map_err(|_| {
                AppError::Alignment(format!("chunk of document {} has no embedding", key))
            })?;
            if blob.is_empty() || blob.len() % 4 != 0 {
                return Err(AppError::Alignment(format!(
                    "chunk of document {} has a malformed embedding blob ({} bytes)",
                    key,
                    blob.len()
                )));
            }

            let emb = decode_embedding(&blob);
            match dim {
                None => dim = Some(emb.len()),
                Some(expected) if expected != emb.len() => {
                    return Err(AppError::Alignment(format!(
                        "embedding dimension {} does not match corpus dimension {}",
                        emb.len(),
                        expected
                    )));
                }
                Some(_) => {}
            }

            let norm = emb.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm <= f32::EPSILON {
                dropped += 1;
                tracing::warn!(%key, "dropping zero-norm embedding row");
                continue;
            }

            flat.extend(emb.iter().map(|v| v / norm));
            chunks.push(ChunkRecord { key, text });
        }

        if dropped > 0 {
            tracing::warn!(dropped, "degenerate embedding rows dropped from corpus");
        }

        let dim = dim.unwrap_or(0);
        let matrix = Array2::from_shape_vec((chunks.len(), dim), flat)
            .map_err(|err| AppError::Alignment(err.to_string()))?;

        let doc_rows = sqlx::query("SELECT key, url FROM documents")
            .fetch_all(pool)
            .await
            .map_err(AppError::internal)?;
        let urls = doc_rows
            .iter()
            .map(|row| (row.get("key"), row.get("url")))
            .collect();

        tracing::info!(chunks = chunks.len(), dim, "corpus index loaded");
        Ok(Self {
            chunks,
            matrix,
            urls,
        })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embedding dimensionality (0 for an empty corpus).
    pub fn dim(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn matrix(&self) -> &Array2<f32> {
        &self.matrix
    }

    /// Source URL of a document key, via the document-metadata table.
    pub fn url_for(&self, key: &str) -> Option<&str> {
        self.urls.get(key).map(String::as_str)
    }
}

async fn init_corpus_schema(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chunks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key TEXT NOT NULL,
            text_chunked TEXT NOT NULL,
            emb BLOB
        )",
    )
    .execute(pool)
    .await
    .map_err(AppError::internal)?;

    // The documents table normally exists already (the crawler creates it);
    // this keeps a chunks-only database loadable.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS documents (
            key TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            title TEXT,
            url TEXT NOT NULL,
            fetched_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await
    .map_err(AppError::internal)?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub async fn open_pool(path: &Path) -> SqlitePool {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .unwrap();
        init_corpus_schema(&pool).await.unwrap();
        pool
    }

    pub async fn insert_chunk(pool: &SqlitePool, key: &str, text: &str, emb: &[f32]) {
        sqlx::query("INSERT INTO chunks (key, text_chunked, emb) VALUES (?1, ?2, ?3)")
            .bind(key)
            .bind(text)
            .bind(encode_embedding(emb))
            .execute(pool)
            .await
            .unwrap();
    }

    pub async fn insert_document(pool: &SqlitePool, key: &str, url: &str) {
        sqlx::query(
            "INSERT INTO documents (key, content, title, url, fetched_at)
             VALUES (?1, '', NULL, ?2, '2024-01-01T00:00:00+00:00')",
        )
        .bind(key)
        .bind(url)
        .execute(pool)
        .await
        .unwrap();
    }
}
