//! In-process novelty index.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::embeddings::{cosine_similarity, Embedding, TextEmbedder};
use super::NoveltyIndex;
use crate::error::CollaboratorError;

/// Default number of embeddings kept.
pub const DEFAULT_INDEX_CAPACITY: usize = 1000;

/// Bounded in-memory index over [`TextEmbedder`] vectors. The oldest vector
/// is evicted once the index is full.
pub struct InMemoryNoveltyIndex {
    embedder: TextEmbedder,
    capacity: usize,
    vectors: Mutex<VecDeque<Embedding>>,
}

impl Default for InMemoryNoveltyIndex {
    fn default() -> Self {
        Self::new(TextEmbedder::default(), DEFAULT_INDEX_CAPACITY)
    }
}

impl InMemoryNoveltyIndex {
    pub fn new(embedder: TextEmbedder, capacity: usize) -> Self {
        Self {
            embedder,
            capacity: capacity.max(1),
            vectors: Mutex::new(VecDeque::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> CollaboratorError {
        CollaboratorError::Fatal("novelty index lock poisoned".to_string())
    }
}

#[async_trait]
impl NoveltyIndex for InMemoryNoveltyIndex {
    async fn embed(&self, text: &str) -> Result<Embedding, CollaboratorError> {
        Ok(self.embedder.embed(text))
    }

    async fn max_similarity(&self, vector: &Embedding) -> Result<f64, CollaboratorError> {
        let vectors = self.vectors.lock().map_err(|_| Self::poisoned())?;
        let max = vectors
            .iter()
            .map(|v| cosine_similarity(v, vector))
            .fold(0.0_f64, f64::max);
        Ok(max.clamp(0.0, 1.0))
    }

    async fn add(&self, vector: Embedding) -> Result<(), CollaboratorError> {
        let mut vectors = self.vectors.lock().map_err(|_| Self::poisoned())?;
        if vectors.len() == self.capacity {
            vectors.pop_front();
        }
        vectors.push_back(vector);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_similarity_against_seen_tasks() {
        let index = InMemoryNoveltyIndex::default();
        let first = index.embed("Find the derivative of x squared").await.unwrap();
        assert_eq!(index.max_similarity(&first).await.unwrap(), 0.0);

        index.add(first.clone()).await.unwrap();
        let repeat = index.max_similarity(&first).await.unwrap();
        assert!((repeat - 1.0).abs() < 1e-9);

        let other = index.embed("Implement a thread pool in Rust").await.unwrap();
        assert!(index.max_similarity(&other).await.unwrap() < repeat);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let index = InMemoryNoveltyIndex::new(TextEmbedder::default(), 2);
        let a = index.embed("alpha task").await.unwrap();
        index.add(a.clone()).await.unwrap();
        index.add(index.embed("beta problem").await.unwrap()).await.unwrap();
        index.add(index.embed("gamma puzzle").await.unwrap()).await.unwrap();

        assert_eq!(index.len(), 2);
        assert!(index.max_similarity(&a).await.unwrap() < 0.999);
    }
}
