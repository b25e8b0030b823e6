//! Vector embeddings and similarity scoring
//!
//! Messages and summaries are embedded once at write time; queries are
//! embedded with the same provider and compared by cosine similarity.

use crate::error::{NyxError, NyxResult};
use serde::{Deserialize, Serialize};

/// A dense embedding vector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    /// The vector dimensions
    pub vector: Vec<f32>,

    /// Dimensionality of the embedding
    pub dimensions: usize,

    /// Model used to generate the embedding
    pub model: String,
}

impl Embedding {
    /// Create a new embedding
    pub fn new(vector: Vec<f32>, model: impl Into<String>) -> Self {
        let dimensions = vector.len();
        Self {
            vector,
            dimensions,
            model: model.into(),
        }
    }

    /// Cosine similarity with another embedding
    pub fn cosine_similarity(&self, other: &Embedding) -> NyxResult<f32> {
        cosine_similarity(&self.vector, &other.vector).ok_or_else(|| {
            NyxError::validation(
                "embedding_dimensions",
                "dimensions must match",
                format!("{} vs {}", self.dimensions, other.dimensions),
            )
        })
    }
}

/// Cosine similarity of two vectors
///
/// `None` when the lengths differ; `0.0` when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    Some(dot_product / (norm_a * norm_b))
}

/// Embedding capability
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a piece of text
    async fn embed(&self, text: &str) -> NyxResult<Embedding>;

    /// Model name
    fn model_name(&self) -> &str;

    /// Vector length produced by this provider
    fn dimensions(&self) -> usize;
}

/// Feature-hashing bag-of-words embedder
///
/// Deterministic and offline. Texts sharing words land close together,
/// which is enough for local runs and tests but carries no semantics.
pub struct HashEmbeddingProvider {
    dimensions: usize,
}

impl HashEmbeddingProvider {
    /// Create a provider producing `dimensions`-long vectors
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimensions as u64) as usize;
            // High bit picks the sign so collisions partly cancel out
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        vector
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> NyxResult<Embedding> {
        Ok(Embedding::new(self.hash_embed(text), self.model_name()))
    }

    fn model_name(&self) -> &str {
        "hash-embedding"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint
#[cfg(feature = "http")]
pub struct LlmEmbeddingProvider {
    client: std::sync::Arc<nyx_llm::Client>,
    model: String,
    dimensions: usize,
}

#[cfg(feature = "http")]
impl LlmEmbeddingProvider {
    /// Wrap a client; `dimensions` is what the configured model returns
    pub fn new(client: std::sync::Arc<nyx_llm::Client>, dimensions: usize) -> Self {
        let model = client.config().embedding_model.clone();
        Self {
            client,
            model,
            dimensions,
        }
    }
}

#[cfg(feature = "http")]
#[async_trait::async_trait]
impl EmbeddingProvider for LlmEmbeddingProvider {
    async fn embed(&self, text: &str) -> NyxResult<Embedding> {
        let vector = self
            .client
            .embeddings(text)
            .await
            .map_err(NyxError::embedding)?;

        if vector.len() != self.dimensions {
            return Err(NyxError::embedding(format!(
                "model '{}' returned {} dimensions, expected {}",
                self.model,
                vector.len(),
                self.dimensions
            )));
        }

        Ok(Embedding::new(vector, self.model.clone()))
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Search result with similarity score
#[derive(Debug, Clone)]
pub struct SearchResult<T> {
    /// The item that was found
    pub item: T,

    /// Cosine similarity with the query
    pub score: f32,
}

impl<T> SearchResult<T> {
    /// Create a new search result
    pub fn new(item: T, score: f32) -> Self {
        Self { item, score }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn test_embedding_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0], "test");
        let b = Embedding::new(vec![1.0, 0.0], "test");
        assert!(matches!(a.cosine_similarity(&b), Err(NyxError::Validation { .. })));
    }

    #[test]
    fn test_hash_embedding_provider() {
        let provider = HashEmbeddingProvider::new(1024);
        let embed = |text: &str| tokio_test::block_on(provider.embed(text)).unwrap();

        let emb1 = embed("Refund policy for orders");
        let emb2 = embed("refund policy for orders");
        let emb3 = embed("refund timing");
        let emb4 = embed("weather in lisbon");

        assert_eq!(emb1.dimensions, 1024);
        assert!((emb1.cosine_similarity(&emb2).unwrap() - 1.0).abs() < 1e-6);

        // One shared word out of 4 and 2
        assert!(emb1.cosine_similarity(&emb3).unwrap() > 0.3);
        assert!(emb1.cosine_similarity(&emb4).unwrap() < 0.3);
    }
}
