//! Exact flat index: every query scans every vector.
//!
//! Highest recall, O(n * d) per query. The build path picks this variant
//! for corpora below the configured threshold, where a trained quantizer
//! would cost more than it saves.

use crate::index::{IndexError, Neighbor, rank_and_truncate, squared_l2};

#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Index `vectors` in input order.
    #[must_use]
    pub fn new(vectors: Vec<Vec<f32>>) -> Self {
        let dimension = vectors.first().map_or(0, Vec::len);
        Self { dimension, vectors }
    }

    /// Reassemble from persisted parts.
    pub(crate) fn from_parts(dimension: usize, vectors: Vec<Vec<f32>>) -> Self {
        Self { dimension, vectors }
    }

    /// Up to `k` nearest neighbors by exact scan.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let candidates: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| Neighbor {
                position: position as u32,
                distance: squared_l2(query, vector),
            })
            .collect();

        Ok(rank_and_truncate(candidates, k))
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub(crate) fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}
