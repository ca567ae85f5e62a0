use repodex::{EmbeddingError, EmbeddingProvider, RetrievalService, Settings};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Deterministic provider for integration tests.
///
/// Hashes each token of the text into a handful of vector slots and
/// normalizes, so texts sharing tokens land measurably closer than
/// disjoint texts and identical texts embed identically. No model
/// download, no network.
pub struct HashProvider {
    dimension: usize,
}

impl HashProvider {
    pub fn new() -> Self {
        Self { dimension: 64 }
    }

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

impl Default for HashProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddingProvider for HashProvider {
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "test-hash"
    }
}

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

/// Settings with an isolated storage root, so tests running in parallel
/// never share shard directories.
pub fn test_settings(root: &Path) -> Settings {
    Settings {
        storage_root: root.to_path_buf(),
        ..Settings::default()
    }
}

/// Service over a temp storage root with the hash provider.
pub fn test_service(root: &Path) -> RetrievalService {
    RetrievalService::new(&test_settings(root), Arc::new(HashProvider::new()))
}

/// Service whose index settings force the clustered variant at small
/// corpus sizes. Default nprobe exceeds the resulting nlist, so probes
/// cover every list and searches stay exhaustive.
pub fn clustered_test_service(root: &Path) -> RetrievalService {
    let mut settings = test_settings(root);
    settings.index.flat_threshold = 8;
    settings.index.min_vectors_per_cluster = 4;
    RetrievalService::new(&settings, Arc::new(HashProvider::with_dimension(32)))
}

pub fn temp_root() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

pub mod sample_records {
    use repodex::Record;

    /// Project "alpha": two startup-crash documents and one unrelated.
    pub fn alpha_history() -> Vec<Record> {
        vec![
            Record::new("a1", "fix crash on startup").with_metadata("kind", "issue"),
            Record::new("a2", "add dark mode").with_metadata("kind", "pull_request"),
            Record::new("a3", "startup crash regression").with_metadata("kind", "issue"),
        ]
    }

    /// Project "beta": authentication-flavored history.
    pub fn beta_history() -> Vec<Record> {
        vec![
            Record::new("b1", "refresh expired auth token before retry")
                .with_metadata("kind", "commit"),
            Record::new("b2", "login page styling cleanup").with_metadata("kind", "pull_request"),
        ]
    }

    /// Project "gamma": build-pipeline-flavored history.
    pub fn gamma_history() -> Vec<Record> {
        vec![
            Record::new("g1", "cache dependencies in release pipeline")
                .with_metadata("kind", "commit"),
            Record::new("g2", "parallelize integration test stage").with_metadata("kind", "issue"),
            Record::new("g3", "pin compiler version in docker image")
                .with_metadata("kind", "commit"),
        ]
    }

    /// A batch of `n` distinct single-topic records.
    pub fn numbered(prefix: &str, n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                Record::new(
                    format!("{prefix}-{i}"),
                    format!("document number {i} about topic {prefix}"),
                )
            })
            .collect()
    }
}
