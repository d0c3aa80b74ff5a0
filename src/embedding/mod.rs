//! Text embedding backends.
//!
//! Two interchangeable implementations: [`ApiEmbedder`] calls a hosted
//! embeddings endpoint, [`LexicalEmbedder`] computes hashed bag-of-words
//! vectors locally with no network or model download.

mod api;
mod lexical;

pub use api::ApiEmbedder;
pub use lexical::LexicalEmbedder;

use crate::error::{WeftError, WeftResult};

/// An embedding vector
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub magnitude: f32,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        let magnitude = vector.iter().fold(0.0f32, |acc, x| acc + x * x).sqrt();
        Self { vector, magnitude }
    }

    /// Cosine similarity with `other`; zero vectors compare as 0.
    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        let norm = self.magnitude * other.magnitude;
        if norm == 0.0 {
            return 0.0;
        }
        let mut dot = 0.0f32;
        for (a, b) in self.vector.iter().zip(&other.vector) {
            dot += a * b;
        }
        dot / norm
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }
}

/// Embedding backend trait
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input in order
    async fn embed(&self, texts: &[String]) -> WeftResult<Vec<Embedding>>;

    /// Embed a single query string
    async fn embed_query(&self, text: &str) -> WeftResult<Embedding> {
        let texts = [text.to_string()];
        let mut embeddings = self.embed(&texts).await?;
        embeddings
            .pop()
            .ok_or_else(|| WeftError::Embedding("backend returned no vectors".into()))
    }

    /// Vector width this backend produces
    fn dim(&self) -> usize;
}
