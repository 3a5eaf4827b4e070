//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait is the boundary to the nearest-neighbor store:
//! upsert-by-id, get-by-id, and k-nearest-neighbor query over one named
//! collection. Two backends are provided:
//!
//! - **[`SqliteVectorIndex`]**: persistent; embeddings are stored as
//!   little-endian `f32` BLOBs and scored brute-force in Rust.
//! - **[`InMemoryVectorIndex`]**: `RwLock`-guarded, for tests and
//!   short-lived runs.
//!
//! # Ordering
//!
//! [`VectorIndex::query`] returns hits ascending by distance. Equal
//! distances keep the order in which ids were first inserted; overwriting
//! an id does not move it.
//!
//! # Dimensionality
//!
//! A collection's dimensionality is fixed by its first upsert. Later
//! upserts or queries with a different vector length are errors.

pub mod memory;
pub mod sqlite;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{IndexedDocument, RetrievalHit};

pub use memory::InMemoryVectorIndex;
pub use sqlite::SqliteVectorIndex;

/// Abstract nearest-neighbor store over one collection.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Collection name.
    fn name(&self) -> &str;

    /// Metric used to compute [`RetrievalHit::distance`].
    fn metric(&self) -> DistanceMetric;

    /// Fetch a stored document by id.
    async fn get(&self, id: &str) -> Result<Option<IndexedDocument>>;

    /// Insert or overwrite the document with `doc.id`.
    async fn upsert(&self, doc: &IndexedDocument) -> Result<()>;

    /// Return up to `k` documents nearest to `embedding`, ascending by distance.
    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalHit>>;

    /// Number of stored documents.
    async fn count(&self) -> Result<usize>;

    /// Vector length fixed by the first upsert, if any.
    async fn dims(&self) -> Result<Option<usize>>;
}

/// Dissimilarity measure between two embeddings. Lower is closer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in `[0, 2]`.
    #[default]
    Cosine,
    /// Euclidean distance.
    L2,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::L2 => "l2",
        }
    }

    /// Distance between two vectors of equal length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0),
            DistanceMetric::L2 => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }
}

/// Sort hits ascending by distance and keep the first `k`.
///
/// The sort is stable, so hits that tie keep their incoming order.
pub fn rank_hits(mut hits: Vec<RetrievalHit>, k: usize) -> Vec<RetrievalHit> {
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    hits.truncate(k);
    hits
}

/// Reject a vector whose length disagrees with the collection's.
pub(crate) fn check_dims(expected: Option<usize>, actual: usize, collection: &str) -> Result<()> {
    if actual == 0 {
        bail!("Empty embedding for collection '{}'", collection);
    }
    match expected {
        Some(dims) if dims != actual => bail!(
            "Embedding dimension mismatch for collection '{}': expected {}, got {}",
            collection,
            dims,
            actual
        ),
        _ => Ok(()),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use newsdesk::vector_index::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12); // 3 × 4 bytes
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;

    fn hit(id: &str, distance: f32) -> RetrievalHit {
        RetrievalHit {
            id: id.to_string(),
            document: String::new(),
            metadata: DocumentMetadata::default(),
            distance,
        }
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let sim = cosine_similarity(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert!(sim.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn cosine_distance_is_non_negative() {
        let d = DistanceMetric::Cosine.distance(&[1.0, 0.0], &[1.0, 0.0]);
        assert!(d >= 0.0 && d < 1e-6);
        let opposite = DistanceMetric::Cosine.distance(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((opposite - 2.0).abs() < 1e-6);
    }

    #[test]
    fn l2_distance() {
        let d = DistanceMetric::L2.distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn rank_sorts_ascending_and_truncates() {
        let ranked = rank_hits(vec![hit("a", 0.1), hit("b", 0.3), hit("c", 0.2)], 2);
        let ids: Vec<&str> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn rank_keeps_tie_order() {
        let ranked = rank_hits(vec![hit("x", 0.5), hit("y", 0.5), hit("z", 0.1)], 3);
        let ids: Vec<&str> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "x", "y"]);
    }

    #[test]
    fn check_dims_rules() {
        assert!(check_dims(None, 3, "c").is_ok());
        assert!(check_dims(Some(3), 3, "c").is_ok());
        assert!(check_dims(Some(3), 4, "c").is_err());
        assert!(check_dims(None, 0, "c").is_err());
    }
}
