//! Document store: external id to content and metadata.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One document's retrievable payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Per-shard lookup from external id to stored document.
///
/// Every id the shard's mapping points at must resolve here. Entries
/// nothing points at are tolerated on load but never written by a build.
/// Backed by a `BTreeMap` so serialization is byte-stable across builds
/// of the same record batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Docstore {
    documents: BTreeMap<String, StoredDocument>,
}

impl Docstore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        external_id: impl Into<String>,
        content: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) {
        self.documents.insert(
            external_id.into(),
            StoredDocument {
                content: content.into(),
                metadata,
            },
        );
    }

    #[must_use]
    pub fn get(&self, external_id: &str) -> Option<&StoredDocument> {
        self.documents.get(external_id)
    }

    #[must_use]
    pub fn contains(&self, external_id: &str) -> bool {
        self.documents.contains_key(external_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
