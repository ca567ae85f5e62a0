//! Build path: a record batch becomes a shard.

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::error::{StoreError, StoreResult};
use crate::index::{IndexParams, VectorIndex};
use crate::record::Record;
use crate::shard::{Docstore, IdMapping, Shard};
use tracing::{debug, info};

/// Embed `records` in one batch and build a shard for `project`.
///
/// Records are embedded and inserted in input order, so position `i`
/// of the index belongs to `records[i]`. The embedding call happens
/// exactly once with the full text batch; it is the expensive external
/// step and must not be issued per record.
pub fn build_shard(
    project: &str,
    records: &[Record],
    provider: &dyn EmbeddingProvider,
    params: &IndexParams,
) -> StoreResult<Shard> {
    if records.is_empty() {
        return Err(StoreError::NoDocuments {
            project: project.to_string(),
        });
    }

    let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
    debug!(project, batch = texts.len(), "embedding record batch");
    let vectors = provider.embed(&texts)?;

    if vectors.len() != records.len() {
        return Err(StoreError::Embedding(EmbeddingError::BatchShape {
            expected: records.len(),
            actual: vectors.len(),
        }));
    }
    let expected = provider.dimension();
    for (position, vector) in vectors.iter().enumerate() {
        if vector.len() != expected {
            return Err(StoreError::DimensionInconsistency {
                expected,
                actual: vector.len(),
                position,
            });
        }
    }

    let index = VectorIndex::build(vectors, params)?;

    let mut mapping = IdMapping::with_capacity(records.len());
    let mut docstore = Docstore::new();
    for record in records {
        mapping.push(record.external_id.clone());
        docstore.insert(&record.external_id, &record.text, record.metadata.clone());
    }

    let shard = Shard::from_parts(project, index, mapping, docstore)?;
    info!(
        project,
        documents = shard.count(),
        variant = %shard.variant(),
        "built shard"
    );
    Ok(shard)
}
