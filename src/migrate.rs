//! Idempotent schema setup for the article store and the vector index.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create all tables in both databases. Safe to run repeatedly.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let articles = db::connect(&config.db.path).await?;
    migrate_articles(&articles).await?;
    articles.close().await;

    let index = db::connect(&config.index.path).await?;
    migrate_index(&index).await?;
    index.close().await;

    Ok(())
}

/// Article table, in the layout the crawler writes.
pub async fn migrate_articles(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS docs (
            guid TEXT PRIMARY KEY,
            url TEXT,
            title TEXT,
            published TEXT,
            modified TEXT,
            text TEXT,
            fetched_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_docs_fetched_at ON docs(fetched_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Vector index tables: named collections and their entries.
///
/// `collections.dims` stays NULL until the first upsert fixes it.
/// Entries keep their rowid across upserts, which gives the stable
/// tie-break order for equal distances.
pub async fn migrate_index(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            dims INTEGER,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collection_entries (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            embedding BLOB NOT NULL,
            document TEXT NOT NULL,
            title TEXT,
            url TEXT,
            published TEXT,
            modified TEXT,
            hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id),
            FOREIGN KEY (collection) REFERENCES collections(name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
