//! Per-project semantic retrieval over local vector shards.
//!
//! Each project gets an isolated shard on disk: an exact or clustered
//! vector index, an id mapping, and a document store, written atomically
//! and loaded lazily on first use. Queries embed once and fan out across
//! projects with bounded parallelism.

pub mod config;
pub mod embedding;
pub mod error;
pub mod index;
pub mod record;
pub mod registry;
pub mod search;
pub mod service;
pub mod shard;

// Explicit exports for better API clarity
pub use config::Settings;
pub use embedding::{EmbeddingError, EmbeddingProvider, FastEmbedProvider};
pub use error::{PersistError, ShardUnavailable, StoreError, StoreResult};
pub use index::{IndexError, IndexParams, Neighbor, VectorIndex};
pub use record::Record;
pub use registry::ShardRegistry;
pub use search::{ProjectHits, QueryCoordinator, SearchOutcome};
pub use service::{BuildSummary, RetrievalService};
pub use shard::{SearchHit, Shard, ShardManifest, StoredDocument, build_shard};
