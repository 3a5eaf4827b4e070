//! Content-addressed incremental indexing.
//!
//! For each article the [`Indexer`] computes a [`fingerprint`], looks up
//! the stored document with the same guid, and only embeds and upserts
//! when the fingerprint differs. Embedding calls dominate the cost of a
//! run, so unchanged articles cost one index lookup.
//!
//! A failure on one record (lookup, embedding, upsert) is recorded as
//! [`RecordOutcome::Failed`] and the run continues with the next record.

use std::sync::Arc;

use anyhow::Result;

use crate::articles::{ArticleSource, SqliteArticleSource};
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::fingerprint::{embedding_input, fingerprint};
use crate::models::{ArticleRecord, DocumentMetadata, IndexReport, IndexedDocument, RecordOutcome};
use crate::progress::{IndexProgressEvent, IndexProgressReporter, NoProgress};
use crate::vector_index::{SqliteVectorIndex, VectorIndex};

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    progress: Box<dyn IndexProgressReporter>,
}

impl Indexer {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            progress: Box::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Box<dyn IndexProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Index every record in input order and report what happened to each.
    pub async fn upsert_all(&self, records: &[ArticleRecord]) -> IndexReport {
        let total = records.len() as u64;
        self.progress.report(IndexProgressEvent::Loaded { total });

        let mut report = IndexReport::default();
        for (i, record) in records.iter().enumerate() {
            let outcome = self.upsert_one(record).await;
            match &outcome {
                RecordOutcome::Failed { guid, error } => {
                    tracing::warn!(guid = %guid, error = %error, "failed to index article");
                }
                RecordOutcome::Rejected { guid, reason } => {
                    tracing::debug!(guid = %guid, reason = %reason, "rejected article");
                }
                _ => {}
            }
            self.progress.report(IndexProgressEvent::Processed {
                n: i as u64 + 1,
                total,
                outcome: outcome.clone(),
            });
            report.outcomes.push(outcome);
        }
        report
    }

    /// Index a single record. Never fails; errors become [`RecordOutcome::Failed`].
    pub async fn upsert_one(&self, record: &ArticleRecord) -> RecordOutcome {
        if let Some(reason) = rejection_reason(record) {
            return RecordOutcome::Rejected {
                guid: record.guid.clone(),
                reason: reason.to_string(),
            };
        }

        match self.index_record(record).await {
            Ok(true) => RecordOutcome::Updated {
                guid: record.guid.clone(),
            },
            Ok(false) => RecordOutcome::Skipped {
                guid: record.guid.clone(),
            },
            Err(e) => RecordOutcome::Failed {
                guid: record.guid.clone(),
                error: format!("{:#}", e),
            },
        }
    }

    /// Returns `Ok(true)` when the document was (re)written.
    async fn index_record(&self, record: &ArticleRecord) -> Result<bool> {
        let title = record.title.as_deref();
        let hash = fingerprint(title, &record.text);

        if let Some(existing) = self.index.get(&record.guid).await? {
            if existing.metadata.hash == hash {
                return Ok(false);
            }
        }

        let embedding = self
            .embedder
            .embed_one(&embedding_input(title, &record.text))
            .await?;

        let doc = IndexedDocument {
            id: record.guid.clone(),
            embedding,
            document: record.text.clone(),
            metadata: DocumentMetadata {
                title: record.title.clone(),
                url: record.url.clone(),
                published: record.published.clone(),
                modified: record.modified.clone(),
                hash,
            },
        };
        self.index.upsert(&doc).await?;
        Ok(true)
    }
}

fn rejection_reason(record: &ArticleRecord) -> Option<&'static str> {
    if record.guid.trim().is_empty() {
        Some("missing guid")
    } else if record.text.trim().is_empty() {
        Some("empty text")
    } else {
        None
    }
}

/// Run the `index` command: read articles from the store and index them.
pub async fn run_index(
    config: &Config,
    limit: Option<usize>,
    progress: Box<dyn IndexProgressReporter>,
) -> Result<IndexReport> {
    let source = SqliteArticleSource::open(&config.db.path).await?;
    let records = source.fetch_articles(limit).await?;
    source.close().await;

    let embedder = embedding::create_embedder(&config.embedding)?;
    let index = Arc::new(
        SqliteVectorIndex::open(&config.index.path, &config.index.collection, config.index.metric)
            .await?,
    );

    let indexer = Indexer::new(embedder, index.clone()).with_progress(progress);
    let report = indexer.upsert_all(&records).await;
    index.close().await;

    tracing::info!(
        updated = report.updated(),
        skipped = report.skipped(),
        rejected = report.rejected(),
        failed = report.failed(),
        "index run finished"
    );

    println!("index {}", config.index.collection);
    println!("  articles: {}", report.total());
    println!("  updated: {}", report.updated());
    println!("  skipped: {}", report.skipped());
    println!("  rejected: {}", report.rejected());
    println!("  failed: {}", report.failed());
    println!("ok");

    Ok(report)
}
