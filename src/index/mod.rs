//! Nearest-neighbor index over one project's embedded records.
//!
//! The index is a tagged variant chosen once at build time: small corpora
//! get an exact flat scan, larger ones a clustered index whose quantizer
//! is trained before any vector is inserted. The variant, including the
//! clustered probe width, travels inside the persisted blob so load-time
//! behavior never depends on configuration guessed at query time.
//!
//! Distances are squared Euclidean throughout: 0 for identical vectors,
//! smaller is more similar. Results are ordered by ascending distance
//! with ties broken by build position, so a fixed index and query always
//! produce the same ranking.

pub mod codec;
pub mod flat;
pub mod ivf;
pub mod kmeans;

pub use flat::FlatIndex;
pub use ivf::IvfIndex;
pub use kmeans::{ClusteringError, KMeansResult, kmeans};

use thiserror::Error;

/// One nearest-neighbor match.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Dense 0-based position assigned at build time.
    pub position: u32,
    /// Squared L2 distance to the query.
    pub distance: f32,
}

/// Errors from index construction and search.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error(
        "Query dimension mismatch: index holds {expected}-dimensional vectors, query has {actual}\nSuggestion: Query and index must use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Quantizer training failed: {0}")]
    Training(#[from] ClusteringError),
}

/// Parameters for variant selection and quantizer training.
///
/// `nlist = clamp(n / min_vectors_per_cluster, 1, max_clusters)` keeps
/// every cluster trained on a reasonable number of vectors while capping
/// the centroid count for small corpora.
#[derive(Debug, Clone, Copy)]
pub struct IndexParams {
    /// Corpora smaller than this stay on the exact flat variant.
    pub flat_threshold: usize,
    pub min_vectors_per_cluster: usize,
    pub max_clusters: usize,
    /// Clustered probe width, clamped to nlist at training time.
    pub nprobe: usize,
    pub kmeans_seed: u64,
}

impl Default for IndexParams {
    fn default() -> Self {
        Self {
            flat_threshold: 100,
            min_vectors_per_cluster: 10,
            max_clusters: 30,
            nprobe: 4,
            kmeans_seed: 42,
        }
    }
}

impl IndexParams {
    /// Cluster count for a corpus of `n` vectors.
    #[must_use]
    pub fn nlist_for(&self, n: usize) -> usize {
        (n / self.min_vectors_per_cluster.max(1)).clamp(1, self.max_clusters)
    }
}

/// Tagged nearest-neighbor index.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorIndex {
    Flat(FlatIndex),
    Clustered(IvfIndex),
}

impl VectorIndex {
    /// Build an index over `vectors`, selecting the variant from corpus
    /// size. Vectors are inserted in input order; position `i` of the
    /// index is `vectors[i]`. Dimensions must already be uniform.
    pub fn build(vectors: Vec<Vec<f32>>, params: &IndexParams) -> Result<Self, IndexError> {
        if vectors.len() < params.flat_threshold {
            Ok(Self::Flat(FlatIndex::new(vectors)))
        } else {
            let nlist = params.nlist_for(vectors.len());
            Ok(Self::Clustered(IvfIndex::train(
                vectors,
                nlist,
                params.nprobe,
                params.kmeans_seed,
            )?))
        }
    }

    /// Up to `k` nearest neighbors, ascending distance, position
    /// tie-break.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        match self {
            Self::Flat(index) => index.search(query, k),
            Self::Clustered(index) => index.search(query, k),
        }
    }

    #[must_use]
    pub fn count(&self) -> usize {
        match self {
            Self::Flat(index) => index.count(),
            Self::Clustered(index) => index.count(),
        }
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        match self {
            Self::Flat(index) => index.dimension(),
            Self::Clustered(index) => index.dimension(),
        }
    }

    /// Human-readable variant label for manifests and build summaries.
    #[must_use]
    pub fn variant(&self) -> String {
        match self {
            Self::Flat(_) => "flat".to_string(),
            Self::Clustered(index) => format!("clustered(nlist={})", index.nlist()),
        }
    }
}

/// Squared Euclidean distance between two vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

/// Sorts candidates ascending by distance, position breaking ties, and
/// keeps the best `k`.
pub(crate) fn rank_and_truncate(mut candidates: Vec<Neighbor>, k: usize) -> Vec<Neighbor> {
    candidates.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then(a.position.cmp(&b.position))
    });
    candidates.truncate(k);
    candidates
}
