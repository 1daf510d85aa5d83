//! Durable key→Document checkpoint store.
//!
//! The store only grows or overwrites existing keys; a merge runs in one
//! SQLite transaction, so a crash mid-flush leaves either the pre-merge or
//! the post-merge state on disk, never a torn write.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};

use crate::core::errors::AppError;

/// A crawled page. Immutable once persisted; re-crawling the same URL
/// supersedes the stored row rather than merging into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub key: String,
    pub content: String,
    pub title: Option<String>,
    pub url: String,
    pub fetched_at: DateTime<Utc>,
}

/// Document key: SHA-256 hex digest of the canonical URL. A pure function
/// of the URL, so identical URLs always collide to the same key.
pub fn document_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

pub struct CheckpointStore {
    pool: SqlitePool,
}

impl CheckpointStore {
    pub async fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(AppError::persistence)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                key TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                title TEXT,
                url TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(AppError::persistence)?;

        Ok(())
    }

    /// Full store contents; an empty map when nothing has been
    /// checkpointed yet.
    pub async fn load(&self) -> Result<HashMap<String, Document>, AppError> {
        let rows = sqlx::query("SELECT key, content, title, url, fetched_at FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::persistence)?;

        let mut items = HashMap::with_capacity(rows.len());
        for row in &rows {
            let doc = Self::row_to_document(row)?;
            items.insert(doc.key.clone(), doc);
        }
        Ok(items)
    }

    /// Keys only, for visited-set rehydration at crawler startup.
    pub async fn load_keys(&self) -> Result<HashSet<String>, AppError> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::persistence)?;
        Ok(keys.into_iter().collect())
    }

    /// Unions `items` into the store, overwriting any existing entry with
    /// the same key (last-writer-wins).
    pub async fn merge(&self, items: &HashMap<String, Document>) -> Result<(), AppError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(AppError::persistence)?;

        for doc in items.values() {
            sqlx::query(
                "INSERT OR REPLACE INTO documents (key, content, title, url, fetched_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(&doc.key)
            .bind(&doc.content)
            .bind(&doc.title)
            .bind(&doc.url)
            .bind(doc.fetched_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(AppError::persistence)?;
        }

        tx.commit().await.map_err(AppError::persistence)?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::persistence)?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn row_to_document(row: &SqliteRow) -> Result<Document, AppError> {
        let fetched_at: String = row.get("fetched_at");
        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .map_err(AppError::persistence)?
            .with_timezone(&Utc);

        Ok(Document {
            key: row.get("key"),
            content: row.get("content"),
            title: row.get("title"),
            url: row.get("url"),
            fetched_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (CheckpointStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::open(&dir.path().join("checkpoint.db"))
            .await
            .unwrap();
        (store, dir)
    }

    fn make_doc(url: &str, content: &str) -> Document {
        Document {
            key: document_key(url),
            content: content.to_string(),
            title: Some("Title".to_string()),
            url: url.to_string(),
            fetched_at: Utc::now(),
        }
    }

    fn as_map(docs: Vec<Document>) -> HashMap<String, Document> {
        docs.into_iter().map(|d| (d.key.clone(), d)).collect()
    }

    #[test]
    fn key_is_pure_function_of_url() {
        assert_eq!(
            document_key("https://a.example/page"),
            document_key("https://a.example/page")
        );
        assert_ne!(
            document_key("https://a.example/page"),
            document_key("https://a.example/other")
        );
    }

    #[tokio::test]
    async fn load_on_fresh_store_is_empty() {
        let (store, _dir) = test_store().await;
        assert!(store.load().await.unwrap().is_empty());
        assert!(store.load_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn merge_order_does_not_matter_for_disjoint_keys() {
        let a = as_map(vec![make_doc("https://x.example/a", "A")]);
        let b = as_map(vec![make_doc("https://x.example/b", "B")]);

        let (ab, _d1) = test_store().await;
        ab.merge(&a).await.unwrap();
        ab.merge(&b).await.unwrap();

        let (ba, _d2) = test_store().await;
        ba.merge(&b).await.unwrap();
        ba.merge(&a).await.unwrap();

        let mut keys_ab: Vec<_> = ab.load().await.unwrap().into_keys().collect();
        let mut keys_ba: Vec<_> = ba.load().await.unwrap().into_keys().collect();
        keys_ab.sort();
        keys_ba.sort();
        assert_eq!(keys_ab, keys_ba);
        assert_eq!(keys_ab.len(), 2);
    }

    #[tokio::test]
    async fn merge_same_key_is_last_writer_wins() {
        let (store, _dir) = test_store().await;
        let url = "https://x.example/a";

        store
            .merge(&as_map(vec![make_doc(url, "v1")]))
            .await
            .unwrap();
        store
            .merge(&as_map(vec![make_doc(url, "v2")]))
            .await
            .unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&document_key(url)].content, "v2");
    }

    #[tokio::test]
    async fn keys_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkpoint.db");

        {
            let store = CheckpointStore::open(&path).await.unwrap();
            store
                .merge(&as_map(vec![make_doc("https://x.example/a", "A")]))
                .await
                .unwrap();
        }

        let reopened = CheckpointStore::open(&path).await.unwrap();
        let keys = reopened.load_keys().await.unwrap();
        assert!(keys.contains(&document_key("https://x.example/a")));
        assert_eq!(reopened.count().await.unwrap(), 1);
    }
}
