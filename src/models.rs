//! Core data models used throughout newsdesk.
//!
//! These types represent the articles, indexed documents, and retrieval
//! hits that flow through the indexing and question-answering pipelines.

use serde::{Deserialize, Serialize};

/// Article produced by the crawler, before indexing.
///
/// `guid` and `text` default to empty strings when absent so that invalid
/// records reach the indexer and are counted as rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(default)]
    pub guid: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub text: String,
}

/// Metadata stored next to every indexed document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub url: Option<String>,
    pub published: Option<String>,
    pub modified: Option<String>,
    /// Content fingerprint of `(title, document)`.
    pub hash: String,
}

impl DocumentMetadata {
    /// Publication date for display, falling back to the modification date.
    pub fn date(&self) -> Option<&str> {
        self.published.as_deref().or(self.modified.as_deref())
    }
}

/// A document as held by the vector index, keyed by article guid.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub metadata: DocumentMetadata,
}

/// One nearest-neighbor result. Lower `distance` is more relevant.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalHit {
    pub id: String,
    pub document: String,
    pub metadata: DocumentMetadata,
    pub distance: f32,
}

/// What happened to a single record during an indexing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Embedded and written (new or changed content).
    Updated { guid: String },
    /// Fingerprint unchanged; no embedding call was made.
    Skipped { guid: String },
    /// Invalid record (missing guid or empty text); never fingerprinted.
    Rejected { guid: String, reason: String },
    /// Lookup, embedding, or upsert failed for this record only.
    Failed { guid: String, error: String },
}

/// Aggregated result of [`Indexer::upsert_all`](crate::indexer::Indexer::upsert_all).
#[derive(Debug, Clone, Default)]
pub struct IndexReport {
    pub outcomes: Vec<RecordOutcome>,
}

impl IndexReport {
    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Updated { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Skipped { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Rejected { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, RecordOutcome::Failed { .. }))
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    fn count(&self, pred: impl Fn(&RecordOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn article_record_tolerates_missing_fields() {
        let rec: ArticleRecord = serde_json::from_str(r#"{"title": "Only a title"}"#).unwrap();
        assert_eq!(rec.guid, "");
        assert_eq!(rec.text, "");
        assert_eq!(rec.title.as_deref(), Some("Only a title"));
        assert!(rec.url.is_none());
    }

    #[test]
    fn date_falls_back_to_modified() {
        let meta = DocumentMetadata {
            modified: Some("2024-05-02".to_string()),
            ..Default::default()
        };
        assert_eq!(meta.date(), Some("2024-05-02"));
    }

    #[test]
    fn report_counts_each_outcome() {
        let report = IndexReport {
            outcomes: vec![
                RecordOutcome::Updated { guid: "a".into() },
                RecordOutcome::Skipped { guid: "b".into() },
                RecordOutcome::Skipped { guid: "c".into() },
                RecordOutcome::Rejected {
                    guid: "".into(),
                    reason: "missing guid".into(),
                },
                RecordOutcome::Failed {
                    guid: "d".into(),
                    error: "boom".into(),
                },
            ],
        };
        assert_eq!(report.updated(), 1);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.rejected(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.total(), 5);
    }
}
