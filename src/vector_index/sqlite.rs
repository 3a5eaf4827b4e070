//! SQLite-backed [`VectorIndex`].
//!
//! One database can hold several named collections. A collection is
//! created lazily (get-or-create) when the index is opened; its
//! dimensionality is recorded on the first upsert.

use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::migrate;
use crate::models::{DocumentMetadata, IndexedDocument, RetrievalHit};

use super::{blob_to_vec, check_dims, rank_hits, vec_to_blob, DistanceMetric, VectorIndex};

/// Persistent vector index over one collection of a SQLite database.
pub struct SqliteVectorIndex {
    pool: SqlitePool,
    collection: String,
    metric: DistanceMetric,
}

impl SqliteVectorIndex {
    /// Open the database at `path`, creating tables and the collection if needed.
    pub async fn open(path: &Path, collection: &str, metric: DistanceMetric) -> Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open vector index at {}", path.display()))?;
        Self::with_pool(pool, collection, metric).await
    }

    /// Use an existing pool. Runs the index migrations.
    pub async fn with_pool(
        pool: SqlitePool,
        collection: &str,
        metric: DistanceMetric,
    ) -> Result<Self> {
        migrate::migrate_index(&pool).await?;

        sqlx::query("INSERT OR IGNORE INTO collections (name, dims, created_at) VALUES (?, NULL, ?)")
            .bind(collection)
            .bind(chrono::Utc::now().timestamp())
            .execute(&pool)
            .await?;

        Ok(Self {
            pool,
            collection: collection.to_string(),
            metric,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_document(row: &SqliteRow) -> IndexedDocument {
    let blob: Vec<u8> = row.get("embedding");
    IndexedDocument {
        id: row.get("id"),
        embedding: blob_to_vec(&blob),
        document: row.get("document"),
        metadata: DocumentMetadata {
            title: row.get("title"),
            url: row.get("url"),
            published: row.get("published"),
            modified: row.get("modified"),
            hash: row.get("hash"),
        },
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    fn name(&self) -> &str {
        &self.collection
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn get(&self, id: &str) -> Result<Option<IndexedDocument>> {
        let row = sqlx::query(
            r#"
            SELECT id, embedding, document, title, url, published, modified, hash
            FROM collection_entries
            WHERE collection = ? AND id = ?
            "#,
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_document))
    }

    async fn upsert(&self, doc: &IndexedDocument) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
                .bind(&self.collection)
                .fetch_one(&mut *tx)
                .await?;
        check_dims(dims.map(|d| d as usize), doc.embedding.len(), &self.collection)?;

        if dims.is_none() {
            sqlx::query("UPDATE collections SET dims = ? WHERE name = ?")
                .bind(doc.embedding.len() as i64)
                .bind(&self.collection)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO collection_entries
                (collection, id, embedding, document, title, url, published, modified, hash, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                embedding = excluded.embedding,
                document = excluded.document,
                title = excluded.title,
                url = excluded.url,
                published = excluded.published,
                modified = excluded.modified,
                hash = excluded.hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.collection)
        .bind(&doc.id)
        .bind(vec_to_blob(&doc.embedding))
        .bind(&doc.document)
        .bind(&doc.metadata.title)
        .bind(&doc.metadata.url)
        .bind(&doc.metadata.published)
        .bind(&doc.metadata.modified)
        .bind(&doc.metadata.hash)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalHit>> {
        let dims = match self.dims().await? {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        check_dims(Some(dims), embedding.len(), &self.collection)?;

        // Fetch all vectors and compute distances in Rust
        let rows = sqlx::query(
            r#"
            SELECT id, embedding, document, title, url, published, modified, hash
            FROM collection_entries
            WHERE collection = ?
            ORDER BY rowid
            "#,
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let doc = row_to_document(row);
            if doc.embedding.len() != dims {
                bail!(
                    "Corrupt embedding for '{}' in collection '{}': {} values, expected {}",
                    doc.id,
                    self.collection,
                    doc.embedding.len(),
                    dims
                );
            }
            hits.push(RetrievalHit {
                distance: self.metric.distance(embedding, &doc.embedding),
                id: doc.id,
                document: doc.document,
                metadata: doc.metadata,
            });
        }

        Ok(rank_hits(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM collection_entries WHERE collection = ?")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(n as usize)
    }

    async fn dims(&self) -> Result<Option<usize>> {
        let dims: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM collections WHERE name = ?")
                .bind(&self.collection)
                .fetch_one(&self.pool)
                .await?;
        Ok(dims.map(|d| d as usize))
    }
}
