//! Article store access.
//!
//! The crawler writes articles into the `docs` table of the article
//! database. The indexer reads them back through [`ArticleSource`], which
//! keeps it independent of where records come from.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::db;
use crate::migrate;
use crate::models::ArticleRecord;

/// Supplies article records to the indexer.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    /// Most recently fetched articles first; `limit` caps the count.
    async fn fetch_articles(&self, limit: Option<usize>) -> Result<Vec<ArticleRecord>>;
}

pub struct SqliteArticleSource {
    pool: SqlitePool,
}

impl SqliteArticleSource {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path)
            .await
            .with_context(|| format!("Failed to open article store at {}", path.display()))?;
        migrate::migrate_articles(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ArticleSource for SqliteArticleSource {
    async fn fetch_articles(&self, limit: Option<usize>) -> Result<Vec<ArticleRecord>> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            r#"
            SELECT guid, url, title, published, modified, text
            FROM docs
            ORDER BY fetched_at DESC, rowid ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ArticleRecord {
                guid: row.get::<Option<String>, _>("guid").unwrap_or_default(),
                url: row.get("url"),
                title: row.get("title"),
                published: row.get("published"),
                modified: row.get("modified"),
                text: row.get::<Option<String>, _>("text").unwrap_or_default(),
            })
            .collect())
    }
}

/// Insert or replace one article, stamping `fetched_at` with the current time.
pub async fn save_article(pool: &SqlitePool, article: &ArticleRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO docs (guid, url, title, published, modified, text, fetched_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&article.guid)
    .bind(&article.url)
    .bind(&article.title)
    .bind(&article.published)
    .bind(&article.modified)
    .bind(&article.text)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Result of importing a JSON Lines file.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub malformed: usize,
}

/// Import articles from a JSON Lines file, one [`ArticleRecord`] per line.
///
/// Blank lines are ignored. Lines that do not parse are counted as
/// malformed and skipped; I/O and database errors abort the import.
pub async fn import_jsonl(pool: &SqlitePool, path: &Path) -> Result<ImportReport> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();

    let mut report = ImportReport::default();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ArticleRecord>(&line) {
            Ok(article) => {
                save_article(pool, &article).await?;
                report.imported += 1;
            }
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed article line");
                report.malformed += 1;
            }
        }
    }
    Ok(report)
}

/// Run the `import` command.
pub async fn run_import(db_path: &Path, input: &Path) -> Result<ImportReport> {
    let source = SqliteArticleSource::open(db_path).await?;
    let report = import_jsonl(source.pool(), input).await?;
    source.close().await;

    println!("import {}", input.display());
    println!("  imported: {}", report.imported);
    println!("  malformed: {}", report.malformed);
    println!("ok");
    Ok(report)
}
