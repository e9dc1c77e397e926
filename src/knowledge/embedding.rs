//! Embedding with an explicit degraded mode
//!
//! When the provider is unreachable or returns something unusable, texts are
//! mapped to deterministic pseudo-random vectors instead. Retrieval quality
//! drops to near random but the pipeline keeps going, and callers can see
//! which mode produced the vectors.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::warn;

use crate::llm::EmbeddingProvider;

/// Where a set of vectors came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingMode {
    Provider,
    /// Seeded pseudo-random vectors standing in for a failed provider
    Degraded,
}

/// Vectors for a batch of texts
#[derive(Debug, Clone)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub mode: EmbeddingMode,
}

impl Embeddings {
    pub fn dimension(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }
}

pub struct Embedder {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    fallback_dimension: usize,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, fallback_dimension: usize) -> Self {
        Self {
            provider: Some(provider),
            fallback_dimension,
        }
    }

    /// An embedder that always runs degraded
    pub fn degraded(fallback_dimension: usize) -> Self {
        Self {
            provider: None,
            fallback_dimension,
        }
    }

    /// Embed a batch, degrading on any provider problem
    pub async fn embed(&self, texts: &[String]) -> Embeddings {
        if texts.is_empty() {
            return Embeddings {
                vectors: Vec::new(),
                mode: EmbeddingMode::Provider,
            };
        }
        match self.try_provider(texts).await {
            Some(vectors) => Embeddings {
                vectors,
                mode: EmbeddingMode::Provider,
            },
            None => degraded_embeddings(texts, self.fallback_dimension),
        }
    }

    /// Embed a query so it is comparable with `corpus`
    ///
    /// A degraded corpus forces a degraded query of the same dimension.
    pub async fn embed_query(&self, query: &str, corpus: &Embeddings) -> Vec<f32> {
        let dimension = corpus.dimension().unwrap_or(self.fallback_dimension);
        if corpus.mode == EmbeddingMode::Provider {
            if let Some(mut vectors) = self.try_provider(&[query.to_string()]).await {
                if let Some(vector) = vectors.pop().filter(|v| v.len() == dimension) {
                    return vector;
                }
                warn!(expected = dimension, "query embedding has unexpected dimension");
            }
        }
        degraded_vector(query, dimension)
    }

    async fn try_provider(&self, texts: &[String]) -> Option<Vec<Vec<f32>>> {
        let provider = self.provider.as_ref()?;
        match provider.embed(texts).await {
            Ok(vectors) if usable(&vectors, texts.len()) => Some(vectors),
            Ok(vectors) => {
                warn!(
                    requested = texts.len(),
                    returned = vectors.len(),
                    "embedding provider returned unusable vectors, using degraded embeddings"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "embedding provider failed, using degraded embeddings");
                None
            }
        }
    }
}

fn usable(vectors: &[Vec<f32>], expected: usize) -> bool {
    let Some(first) = vectors.first() else {
        return false;
    };
    vectors.len() == expected && !first.is_empty() && vectors.iter().all(|v| v.len() == first.len())
}

fn degraded_embeddings(texts: &[String], dimension: usize) -> Embeddings {
    Embeddings {
        vectors: texts.iter().map(|t| degraded_vector(t, dimension)).collect(),
        mode: EmbeddingMode::Degraded,
    }
}

/// Deterministic pseudo-random vector seeded by the text
pub fn degraded_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut rng = StdRng::seed_from_u64(hasher.finish());
    (0..dimension).map(|_| rng.random::<f32>()).collect()
}
