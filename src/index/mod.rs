//! In-memory vector index and the retriever built on top of it.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::document::Document;
use crate::embedding::{Embedder, Embedding};
use crate::error::WeftResult;

/// A document paired with its similarity to a query
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

struct IndexEntry {
    document: Document,
    embedding: Embedding,
}

/// Flat in-memory index searched by cosine similarity.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, document: Document, embedding: Embedding) {
        self.entries.push(IndexEntry {
            document,
            embedding,
        });
    }

    /// Score every entry against the query, return the top-k by descending
    /// similarity. Entries with no similarity at all are dropped.
    pub fn search(&self, query: &Embedding, top_k: usize) -> Vec<ScoredDocument> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let score = query.cosine_similarity(&entry.embedding);
                (idx, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(top_k)
            .filter(|(_, score)| *score > 0.0)
            .map(|(idx, score)| ScoredDocument {
                document: self.entries[idx].document.clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Embedding-backed retriever over a shared [`VectorIndex`].
///
/// Queries are embedded before the index lock is taken, so a slow embedding
/// call never blocks readers.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<RwLock<VectorIndex>>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl Retriever {
    pub const DEFAULT_TOP_K: usize = 4;

    pub fn new(index: Arc<RwLock<VectorIndex>>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            top_k: Self::DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Embed a batch of documents and build a retriever over them.
    pub async fn from_documents(
        docs: Vec<Document>,
        embedder: Arc<dyn Embedder>,
    ) -> WeftResult<Self> {
        let retriever = Self::new(Arc::new(RwLock::new(VectorIndex::new())), embedder);
        retriever.add_documents(docs).await?;
        Ok(retriever)
    }

    /// Embed and insert more documents into the index.
    pub async fn add_documents(&self, docs: Vec<Document>) -> WeftResult<usize> {
        let texts: Vec<String> = docs.iter().map(|d| d.page_content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        let mut index = self.index.write().await;
        let added = docs.len();
        for (doc, embedding) in docs.into_iter().zip(embeddings) {
            index.add(doc, embedding);
        }
        Ok(added)
    }

    /// Embed the query and return the most similar documents.
    pub async fn retrieve(&self, query: &str) -> WeftResult<Vec<ScoredDocument>> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let index = self.index.read().await;
        Ok(index.search(&query_embedding, self.top_k))
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub fn index(&self) -> Arc<RwLock<VectorIndex>> {
        self.index.clone()
    }
}
