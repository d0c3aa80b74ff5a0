use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::WeftResult;

use super::{Embedder, Embedding};

/// Local embedder that hashes words into a fixed number of buckets.
///
/// Stateless: the same text always maps to the same vector, so queries and
/// documents can be embedded independently without a shared vocabulary.
/// Useful for tests and offline runs where a hosted model is unavailable.
pub struct LexicalEmbedder {
    dim: usize,
}

impl LexicalEmbedder {
    pub const DEFAULT_DIM: usize = 512;

    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dim];
        for word in Self::split_words(text) {
            let bucket = self.bucket(&word.to_lowercase());
            vector[bucket] += 1.0;
        }
        Embedding::new(vector)
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(bytes) as usize % self.dim
    }

    /// Split text into words on whitespace and punctuation boundaries
    fn split_words(text: &str) -> Vec<&str> {
        let mut words = Vec::new();
        let mut start: Option<usize> = None;

        for (i, c) in text.char_indices() {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                if start.is_none() {
                    start = Some(i);
                }
            } else if let Some(s) = start {
                words.push(&text[s..i]);
                start = None;
            }
        }
        if let Some(s) = start {
            words.push(&text[s..]);
        }
        words
    }
}

impl Default for LexicalEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIM)
    }
}

#[async_trait]
impl Embedder for LexicalEmbedder {
    async fn embed(&self, texts: &[String]) -> WeftResult<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_text_same_vector() {
        let embedder = LexicalEmbedder::new(128);
        let a = embedder.embed_text("the cat sat on the mat");
        let b = embedder.embed_text("the cat sat on the mat");
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 0.001);
    }

    #[test]
    fn case_insensitive() {
        let embedder = LexicalEmbedder::new(128);
        let a = embedder.embed_text("Rust Tokio");
        let b = embedder.embed_text("rust tokio");
        assert!((a.cosine_similarity(&b) - 1.0).abs() < 0.001);
    }

    #[test]
    fn related_text_scores_higher() {
        let embedder = LexicalEmbedder::new(512);
        let query = embedder.embed_text("rust async runtime");
        let related = embedder.embed_text("the rust async runtime tokio");
        let unrelated = embedder.embed_text("gardening tips for spring");
        assert!(query.cosine_similarity(&related) > query.cosine_similarity(&unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = LexicalEmbedder::new(64);
        let e = embedder.embed_text("");
        assert_eq!(e.magnitude, 0.0);
        let other = embedder.embed_text("anything");
        assert_eq!(e.cosine_similarity(&other), 0.0);
    }

    #[test]
    fn respects_dimension() {
        let embedder = LexicalEmbedder::new(32);
        let e = embedder.embed_text("hello world");
        assert_eq!(e.dim(), 32);
        assert_eq!(embedder.dim(), 32);
    }

    #[test]
    fn zero_dim_clamps_to_one() {
        let embedder = LexicalEmbedder::new(0);
        assert_eq!(embedder.dim(), 1);
    }

    #[tokio::test]
    async fn batch_embeds_in_order() {
        let embedder = LexicalEmbedder::new(64);
        let texts = vec!["first".to_string(), "second".to_string()];
        let embeddings = embedder.embed(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 2);
        let first = embedder.embed_text("first");
        assert!((embeddings[0].cosine_similarity(&first) - 1.0).abs() < 0.001);
    }
}
