//! Task novelty: exact-duplicate fingerprints and near-duplicate similarity.
//!
//! Two signals feed the reward's novelty component:
//!
//! - [`novelty_key`], a coarse fingerprint of a task's domain and prompt. Equal
//!   keys mean the task was generated before.
//! - A [`NoveltyIndex`], which embeds task text and reports the highest cosine
//!   similarity to anything already added.

pub mod embeddings;
pub mod index;

pub use embeddings::{cosine_similarity, Embedding, TextEmbedder, DEFAULT_DIMENSION};
pub use index::{InMemoryNoveltyIndex, DEFAULT_INDEX_CAPACITY};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::CollaboratorError;

/// Embedding store used to detect near-duplicate tasks.
#[async_trait]
pub trait NoveltyIndex: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Embedding, CollaboratorError>;

    /// Highest similarity in [0, 1] between `vector` and any stored vector;
    /// 0 when the index is empty.
    async fn max_similarity(&self, vector: &Embedding) -> Result<f64, CollaboratorError>;

    async fn add(&self, vector: Embedding) -> Result<(), CollaboratorError>;
}

fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First 16 hex characters of SHA-256 over `domain:prompt`, each part
/// lower-cased, trimmed and with whitespace runs collapsed.
pub fn novelty_key(domain: &str, prompt: &str) -> String {
    let normalized = format!("{}:{}", normalize(domain), normalize(prompt));
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_novelty_key_normalizes() {
        let a = novelty_key("math", "What is  2 + 2?");
        let b = novelty_key("MATH", "  what is 2 +\n2?  ");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_novelty_key_ignores_whitespace_around_parts() {
        let a = novelty_key("math", "what is 2 + 2?");
        assert_eq!(a, novelty_key("math", " what is 2 + 2?"));
        assert_eq!(a, novelty_key(" math\t", "what is 2 + 2?\n"));
    }

    #[test]
    fn test_novelty_key_includes_domain() {
        assert_ne!(novelty_key("math", "sum"), novelty_key("code", "sum"));
    }
}
