//! Store and index overview.
//!
//! `newsdesk status` shows how many articles the store holds, how many
//! of them are in the vector index, and when the crawler last wrote.

use std::path::Path;

use anyhow::Result;

use crate::articles::SqliteArticleSource;
use crate::config::Config;
use crate::vector_index::{DistanceMetric, SqliteVectorIndex, VectorIndex};

/// Counts gathered for the status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub articles: i64,
    pub last_fetched_at: Option<i64>,
    pub indexed: usize,
    pub dims: Option<usize>,
    pub metric: DistanceMetric,
}

pub async fn collect_status(config: &Config) -> Result<Status> {
    let source = SqliteArticleSource::open(&config.db.path).await?;
    let articles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM docs")
        .fetch_one(source.pool())
        .await?;
    let last_fetched_at: Option<i64> = sqlx::query_scalar("SELECT MAX(fetched_at) FROM docs")
        .fetch_one(source.pool())
        .await?;
    source.close().await;

    let index =
        SqliteVectorIndex::open(&config.index.path, &config.index.collection, config.index.metric)
            .await?;
    let indexed = index.count().await?;
    let dims = index.dims().await?;
    let metric = index.metric();
    index.close().await;

    Ok(Status {
        articles,
        last_fetched_at,
        indexed,
        dims,
        metric,
    })
}

/// Run the status command and print a summary.
pub async fn run_status(config: &Config) -> Result<Status> {
    let status = collect_status(config).await?;

    println!("newsdesk status");
    println!();
    println!("  Articles:    {}", status.articles);
    println!("  Store:       {} ({})", config.db.path.display(), format_bytes(file_size(&config.db.path)));
    println!(
        "  Last fetch:  {}",
        status
            .last_fetched_at
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );
    println!();
    println!("  Collection:  {}", config.index.collection);
    println!("  Indexed:     {}", status.indexed);
    println!(
        "  Dimensions:  {}",
        status
            .dims
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Metric:      {}", status.metric.as_str());
    println!("  Index:       {} ({})", config.index.path.display(), format_bytes(file_size(&config.index.path)));

    Ok(status)
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        format_ts_iso(ts)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
