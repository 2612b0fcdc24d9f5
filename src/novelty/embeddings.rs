//! Hash-based text embeddings.
//!
//! Word and character-trigram features are hashed into fixed positions of a
//! vector, followed by a few length statistics, then L2-normalised. No model
//! is involved, so embeddings are deterministic and cheap.

use ndarray::Array1;
use sha2::{Digest, Sha256};

/// Default embedding dimension.
pub const DEFAULT_DIMENSION: usize = 128;

/// Embedding vector.
pub type Embedding = Array1<f64>;

/// Generator for text embeddings.
#[derive(Debug, Clone)]
pub struct TextEmbedder {
    dimension: usize,
}

impl Default for TextEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl TextEmbedder {
    /// Creates an embedder producing vectors of `dimension` entries.
    ///
    /// # Example
    ///
    /// ```
    /// use frontier_forge::novelty::TextEmbedder;
    ///
    /// let embedder = TextEmbedder::new(64);
    /// assert_eq!(embedder.embed("two plus two").len(), 64);
    /// ```
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(16),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embeds text. Empty text yields the zero vector.
    pub fn embed(&self, text: &str) -> Embedding {
        let mut embedding = Array1::zeros(self.dimension);

        if text.trim().is_empty() {
            return embedding;
        }

        let text_lower = text.to_lowercase();

        // Word features
        let words: Vec<&str> = text_lower.split_whitespace().collect();
        let word_dim = self.dimension / 2;
        for word in &words {
            let pos = hash_to_index(word, word_dim);
            embedding[pos] += 1.0 / words.len() as f64;
        }

        // Character trigrams
        let offset = word_dim;
        let trigram_dim = self.dimension / 4;
        let chars: Vec<char> = text_lower.chars().collect();
        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let pos = offset + hash_to_index(&trigram, trigram_dim);
            embedding[pos] += 1.0;
        }

        let stats_offset = offset + trigram_dim;
        embedding[stats_offset] = (text.len() as f64 / 1000.0).min(1.0);
        embedding[stats_offset + 1] = (words.len() as f64 / 200.0).min(1.0);
        let avg_word_len =
            words.iter().map(|w| w.len()).sum::<usize>() as f64 / words.len().max(1) as f64;
        embedding[stats_offset + 2] = avg_word_len / 10.0;

        normalize(&mut embedding);
        embedding
    }
}

fn hash_to_index(input: &str, max_index: usize) -> usize {
    if max_index == 0 {
        return 0;
    }
    let hash_bytes = Sha256::digest(input.as_bytes());
    let hash_val = u32::from_be_bytes([hash_bytes[0], hash_bytes[1], hash_bytes[2], hash_bytes[3]]);
    hash_val as usize % max_index
}

fn normalize(v: &mut Embedding) {
    let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 1e-10 {
        v.mapv_inplace(|x| x / norm);
    }
}

/// Cosine similarity in [-1, 1]. Zero vectors and mismatched lengths give 0.
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product = a.dot(b);
    let norm_a = a.dot(a).sqrt();
    let norm_b = b.dot(b).sqrt();

    if norm_a < 1e-10 || norm_b < 1e-10 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
