//! Nearest-article retrieval for a question.

use std::sync::Arc;

use anyhow::{bail, Result};

use crate::embedding::Embedder;
use crate::models::RetrievalHit;
use crate::vector_index::{rank_hits, VectorIndex};

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Return up to `k` hits ordered by ascending distance.
    ///
    /// An empty index yields no hits without calling the embedder.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievalHit>> {
        if query.trim().is_empty() {
            bail!("Query must not be empty");
        }
        if k == 0 {
            bail!("k must be at least 1");
        }
        if self.index.count().await? == 0 {
            tracing::debug!(collection = self.index.name(), "index is empty");
            return Ok(Vec::new());
        }

        let embedding = self.embedder.embed_one(query).await?;
        // Indexes are expected to sort already; keep the contract regardless.
        let hits = rank_hits(self.index.query(&embedding, k).await?, k);

        tracing::debug!(
            k,
            hits = hits.len(),
            metric = self.index.metric().as_str(),
            "retrieved articles"
        );
        Ok(hits)
    }
}
