//! Embedding provider abstraction and the fastembed-backed implementation.
//!
//! The build path embeds one full record batch per build; the serve path
//! embeds single queries. Both go through [`EmbeddingProvider`] so tests
//! can substitute a deterministic implementation and the rest of the
//! system never touches the model runtime directly.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use parking_lot::Mutex;
use std::path::Path;
use thiserror::Error;

/// Embedding dimension of the default all-MiniLM-L6-v2 model.
pub const DIMENSION_MINILM: usize = 384;

/// Errors raised by embedding providers.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model '{model}': {reason}\nSuggestion: First-time model download needs network access; check that the cache directory is writable"
    )]
    ModelInit { model: String, reason: String },

    #[error(
        "Unsupported embedding model '{0}'\nSuggestion: Supported models: AllMiniLML6V2, MultilingualE5Small"
    )]
    UnsupportedModel(String),

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    Failed(String),

    #[error(
        "Embedding model returned {actual} vectors for {expected} texts\nSuggestion: This is a provider bug; every input text must produce exactly one vector"
    )]
    BatchShape { expected: usize, actual: usize },

    #[error(
        "Embedding model produced dimension {actual}, expected {expected}\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Trait for turning text batches into fixed-width vectors.
///
/// Implementations must be thread-safe: the service shares one provider
/// between concurrent builds and queries. Deterministic output for a
/// fixed model version is part of the contract.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per text, in input order.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Width of every vector this provider produces.
    #[must_use]
    fn dimension(&self) -> usize;

    /// Stable model identifier, recorded in the shard manifest.
    #[must_use]
    fn model_name(&self) -> &str;
}

/// FastEmbed-backed provider.
///
/// The model handle is not `Sync`, so calls serialize on a mutex; batches
/// should therefore be as large as the caller can make them.
pub struct FastEmbedProvider {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    /// Initialize the named model, downloading it into `cache_dir` on
    /// first use.
    ///
    /// # Errors
    /// Returns an error if the model name is unknown or the model fails
    /// to initialize or download.
    pub fn new(model_name: &str, cache_dir: &Path) -> Result<Self, EmbeddingError> {
        let (model, dimension) = match model_name {
            "AllMiniLML6V2" => (EmbeddingModel::AllMiniLML6V2, DIMENSION_MINILM),
            "MultilingualE5Small" => (EmbeddingModel::MultilingualE5Small, DIMENSION_MINILM),
            other => return Err(EmbeddingError::UnsupportedModel(other.to_string())),
        };

        let text_embedding = TextEmbedding::try_new(
            InitOptions::new(model)
                .with_cache_dir(cache_dir.to_path_buf())
                .with_show_download_progress(false),
        )
        .map_err(|e| EmbeddingError::ModelInit {
            model: model_name.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            model: Mutex::new(text_embedding),
            model_name: model_name.to_string(),
            dimension,
        })
    }
}

impl EmbeddingProvider for FastEmbedProvider {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        // fastembed expects owned strings for the embed method
        let text_strings: Vec<String> = texts.iter().map(|&s| s.to_string()).collect();

        let embeddings = self
            .model
            .lock()
            .embed(text_strings, None)
            .map_err(|e| EmbeddingError::Failed(e.to_string()))?;

        if embeddings.len() != texts.len() {
            return Err(EmbeddingError::BatchShape {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }
        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// FNV-1a hash, used by the mock provider to place tokens in vector slots.
#[cfg(test)]
fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in data {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Mock provider for testing.
///
/// Hashes each token into a handful of vector slots and normalizes, so
/// texts sharing tokens land measurably closer than disjoint texts and
/// identical texts embed identically.
#[cfg(test)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

#[cfg(test)]
impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl MockEmbeddingProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dimension: DIMENSION_MINILM,
        }
    }

    /// Smaller dimensions keep distance math easy to eyeball in tests.
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        const SLOTS_PER_TOKEN: usize = 4;

        let mut embedding = vec![0.0f32; self.dimension];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            for slot in 0..SLOTS_PER_TOKEN {
                let key = format!("{token}#{slot}");
                let idx = (fnv1a_hash(key.as_bytes()) % self.dimension as u64) as usize;
                embedding[idx] += 1.0;
            }
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut embedding {
                *value /= magnitude;
            }
        }
        embedding
    }
}

#[cfg(test)]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-fnv"
    }
}
