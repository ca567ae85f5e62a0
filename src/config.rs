//! Configuration for the retrieval service.
//!
//! Layered: built-in defaults, then `repodex.toml`, then environment
//! variables.
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `REPODEX_` and use double
//! underscores to separate nested levels:
//! - `REPODEX_STORAGE_ROOT=/var/lib/repodex` sets `storage_root`
//! - `REPODEX_SEARCH__MAX_PARALLEL=8` sets `search.max_parallel`
//! - `REPODEX_EMBEDDING__MODEL=MultilingualE5Small` sets `embedding.model`

use crate::index::IndexParams;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_FILE: &str = "repodex.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Root directory holding one subdirectory per project shard.
    #[serde(default = "default_storage_root")]
    pub storage_root: PathBuf,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Index construction settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Search fan-out settings
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Model used for documents and queries
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Where downloaded model files are cached
    #[serde(default = "default_model_cache_dir")]
    pub cache_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexConfig {
    /// Below this many documents the index stays flat (exact scan)
    #[serde(default = "default_flat_threshold")]
    pub flat_threshold: usize,

    /// Divisor for the cluster count of a clustered index
    #[serde(default = "default_min_vectors_per_cluster")]
    pub min_vectors_per_cluster: usize,

    /// Upper bound on the cluster count
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,

    /// Inverted lists scanned per clustered query
    #[serde(default = "default_nprobe")]
    pub nprobe: usize,

    /// Seed for quantizer training; fixed so rebuilds are reproducible
    #[serde(default = "default_kmeans_seed")]
    pub kmeans_seed: u64,
}

impl IndexConfig {
    #[must_use]
    pub fn params(&self) -> IndexParams {
        IndexParams {
            flat_threshold: self.flat_threshold,
            min_vectors_per_cluster: self.min_vectors_per_cluster,
            max_clusters: self.max_clusters,
            nprobe: self.nprobe,
            kmeans_seed: self.kmeans_seed,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Concurrent per-shard searches during a fan-out
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Results per project when the caller does not pass k
    #[serde(default = "default_k")]
    pub default_k: usize,

    /// Overall search deadline in milliseconds; 0 disables it
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl SearchConfig {
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

// Default value functions
fn default_storage_root() -> PathBuf {
    PathBuf::from(".repodex/projects")
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_model_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".repodex"))
        .join("repodex")
        .join("models")
}
fn default_flat_threshold() -> usize {
    100
}
fn default_min_vectors_per_cluster() -> usize {
    10
}
fn default_max_clusters() -> usize {
    30
}
fn default_nprobe() -> usize {
    4
}
fn default_kmeans_seed() -> u64 {
    42
}
fn default_max_parallel() -> usize {
    num_cpus::get()
}
fn default_k() -> usize {
    5
}
fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            embedding: EmbeddingConfig::default(),
            index: IndexConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            cache_dir: default_model_cache_dir(),
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            flat_threshold: default_flat_threshold(),
            min_vectors_per_cluster: default_min_vectors_per_cluster(),
            max_clusters: default_max_clusters(),
            nprobe: default_nprobe(),
            kmeans_seed: default_kmeans_seed(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            default_k: default_k(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration with a specific config file path
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path))
            // Layer in environment variables with REPODEX_ prefix
            // Use double underscore (__) to separate nested levels
            .merge(Env::prefixed("REPODEX_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let settings = Settings::default();
        assert_eq!(settings.storage_root, PathBuf::from(".repodex/projects"));
        assert_eq!(settings.embedding.model, "AllMiniLML6V2");
        assert_eq!(settings.index.flat_threshold, 100);
        assert_eq!(settings.index.nprobe, 4);
        assert_eq!(settings.search.default_k, 5);
        assert!(settings.search.max_parallel >= 1);
    }

    #[test]
    fn test_index_params_mirror_config() {
        let config = IndexConfig {
            flat_threshold: 50,
            min_vectors_per_cluster: 5,
            max_clusters: 12,
            nprobe: 2,
            kmeans_seed: 7,
        };
        let params = config.params();
        assert_eq!(params.flat_threshold, 50);
        assert_eq!(params.min_vectors_per_cluster, 5);
        assert_eq!(params.max_clusters, 12);
        assert_eq!(params.nprobe, 2);
        assert_eq!(params.kmeans_seed, 7);
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let mut search = SearchConfig::default();
        assert_eq!(search.timeout(), Some(Duration::from_millis(10_000)));
        search.timeout_ms = 0;
        assert_eq!(search.timeout(), None);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("repodex.toml");
        std::fs::write(
            &path,
            "storage_root = \"/srv/shards\"\n\n[search]\ndefault_k = 9\n",
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.storage_root, PathBuf::from("/srv/shards"));
        assert_eq!(settings.search.default_k, 9);
        // untouched sections keep their defaults
        assert_eq!(settings.index.flat_threshold, 100);
    }
}
