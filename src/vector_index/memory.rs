//! In-memory [`VectorIndex`] implementation for tests and short-lived runs.
//!
//! Entries live in a `Vec` behind `std::sync::RwLock`, with a position map
//! so that overwriting an id keeps its original slot. Query is brute-force
//! over all stored vectors.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{IndexedDocument, RetrievalHit};

use super::{check_dims, rank_hits, DistanceMetric, VectorIndex};

#[derive(Default)]
struct State {
    dims: Option<usize>,
    entries: Vec<IndexedDocument>,
    positions: HashMap<String, usize>,
}

/// In-memory vector index over a single collection.
pub struct InMemoryVectorIndex {
    name: String,
    metric: DistanceMetric,
    state: RwLock<State>,
}

impl InMemoryVectorIndex {
    pub fn new(name: &str, metric: DistanceMetric) -> Self {
        Self {
            name: name.to_string(),
            metric,
            state: RwLock::new(State::default()),
        }
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new("articles", DistanceMetric::Cosine)
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory vector index lock poisoned")
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn get(&self, id: &str) -> Result<Option<IndexedDocument>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state.positions.get(id).map(|&pos| state.entries[pos].clone()))
    }

    async fn upsert(&self, doc: &IndexedDocument) -> Result<()> {
        let mut state = self.state.write().map_err(|_| poisoned())?;
        check_dims(state.dims, doc.embedding.len(), &self.name)?;
        state.dims = Some(doc.embedding.len());

        match state.positions.get(&doc.id).copied() {
            Some(pos) => state.entries[pos] = doc.clone(),
            None => {
                let pos = state.entries.len();
                state.entries.push(doc.clone());
                state.positions.insert(doc.id.clone(), pos);
            }
        }
        Ok(())
    }

    async fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievalHit>> {
        let state = self.state.read().map_err(|_| poisoned())?;
        if state.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        check_dims(state.dims, embedding.len(), &self.name)?;

        let hits = state
            .entries
            .iter()
            .map(|doc| RetrievalHit {
                id: doc.id.clone(),
                document: doc.document.clone(),
                metadata: doc.metadata.clone(),
                distance: self.metric.distance(embedding, &doc.embedding),
            })
            .collect();

        Ok(rank_hits(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().map_err(|_| poisoned())?.entries.len())
    }

    async fn dims(&self) -> Result<Option<usize>> {
        Ok(self.state.read().map_err(|_| poisoned())?.dims)
    }
}
