//! One project's complete retrieval unit.
//!
//! A shard bundles the nearest-neighbor index, the position-to-id
//! mapping, and the docstore for a single project. The three artifacts
//! are built together, persisted together and loaded together; once in
//! memory a shard is read-only and shared freely across searches. A
//! rebuild replaces the whole shard, never patches it in place.

pub mod builder;
pub mod docstore;
pub mod persistence;

pub use builder::build_shard;
pub use docstore::{Docstore, StoredDocument};
pub use persistence::ShardManifest;

use crate::error::{PersistError, PersistResult};
use crate::index::{IndexError, VectorIndex};
use std::collections::BTreeMap;
use tracing::warn;

/// Position to external id. The id at index `i` names the vector filed
/// at position `i`, so the vector order fixed at build time is the only
/// link between index geometry and external identity.
pub type IdMapping = Vec<String>;

/// One search result after id and content resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub external_id: String,
    pub content: String,
    pub metadata: BTreeMap<String, String>,
    /// Squared L2 distance to the query; smaller is more similar.
    pub distance: f32,
}

#[derive(Debug)]
pub struct Shard {
    project: String,
    index: VectorIndex,
    mapping: IdMapping,
    docstore: Docstore,
}

impl Shard {
    /// Assemble a shard and verify the three parts agree in shape:
    /// the index holds as many vectors as the mapping has positions,
    /// and every mapped id resolves in the docstore.
    pub(crate) fn from_parts(
        project: impl Into<String>,
        index: VectorIndex,
        mapping: IdMapping,
        docstore: Docstore,
    ) -> PersistResult<Self> {
        let vectors = index.count();
        let resolved = mapping.iter().filter(|id| docstore.contains(id)).count();
        if vectors != mapping.len() || resolved != mapping.len() {
            return Err(PersistError::ShapeMismatch {
                vectors,
                mapping: mapping.len(),
                resolved,
            });
        }

        Ok(Self {
            project: project.into(),
            index,
            mapping,
            docstore,
        })
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn count(&self) -> usize {
        self.index.count()
    }

    /// Vector width this shard was built with.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    /// Human-readable index variant, e.g. `flat` or `clustered(nlist=7)`.
    #[must_use]
    pub fn variant(&self) -> String {
        self.index.variant()
    }

    #[must_use]
    pub fn mapping(&self) -> &[String] {
        &self.mapping
    }

    /// Up to `k` nearest documents to `query`, ascending by distance.
    ///
    /// Each neighbor position is translated through the mapping to an
    /// external id and through the docstore to content. A position that
    /// fails either translation is dropped from the results rather than
    /// failing the search; the load-time shape check makes that
    /// unreachable for shards that came through [`persistence::load`].
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let neighbors = self.index.search(query, k)?;

        let mut hits = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let Some(external_id) = self.mapping.get(neighbor.position as usize) else {
                warn!(
                    project = %self.project,
                    position = neighbor.position,
                    "dropping neighbor with no mapping entry"
                );
                continue;
            };
            let Some(document) = self.docstore.get(external_id) else {
                warn!(
                    project = %self.project,
                    external_id = %external_id,
                    "dropping neighbor with no docstore entry"
                );
                continue;
            };
            hits.push(SearchHit {
                external_id: external_id.clone(),
                content: document.content.clone(),
                metadata: document.metadata.clone(),
                distance: neighbor.distance,
            });
        }
        Ok(hits)
    }

    /// Direct docstore lookup by external id.
    #[must_use]
    pub fn document(&self, external_id: &str) -> Option<&StoredDocument> {
        self.docstore.get(external_id)
    }
}
