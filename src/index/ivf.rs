//! Clustered index: a trained quantizer plus inverted lists.
//!
//! Training runs k-means over the full vector set; each vector is then
//! filed under its centroid's inverted list. A query ranks centroids,
//! scans the `nprobe` nearest lists and scores only those members, so
//! recall trades against scan cost. Construction happens exclusively
//! through [`IvfIndex::train`], which makes inserting into an untrained
//! index unrepresentable.

use crate::index::kmeans::kmeans;
use crate::index::{IndexError, Neighbor, rank_and_truncate, squared_l2};

#[derive(Debug, Clone, PartialEq)]
pub struct IvfIndex {
    dimension: usize,
    nprobe: usize,
    centroids: Vec<Vec<f32>>,
    /// Positions per centroid; together the lists partition 0..count.
    lists: Vec<Vec<u32>>,
    vectors: Vec<Vec<f32>>,
}

impl IvfIndex {
    /// Train a quantizer with `nlist` centroids over `vectors`, then
    /// insert every vector in input order.
    ///
    /// `nprobe` is clamped to `1..=nlist` so a persisted index can
    /// always honor its own probe width.
    pub fn train(
        vectors: Vec<Vec<f32>>,
        nlist: usize,
        nprobe: usize,
        seed: u64,
    ) -> Result<Self, IndexError> {
        let training = kmeans(&vectors, nlist, seed)?;

        let mut lists = vec![Vec::new(); nlist];
        for (position, &cluster) in training.assignments.iter().enumerate() {
            lists[cluster].push(position as u32);
        }

        let dimension = vectors.first().map_or(0, Vec::len);
        Ok(Self {
            dimension,
            nprobe: nprobe.clamp(1, nlist),
            centroids: training.centroids,
            lists,
            vectors,
        })
    }

    /// Reassemble from persisted parts.
    pub(crate) fn from_parts(
        dimension: usize,
        nprobe: usize,
        centroids: Vec<Vec<f32>>,
        lists: Vec<Vec<u32>>,
        vectors: Vec<Vec<f32>>,
    ) -> Self {
        Self {
            dimension,
            nprobe,
            centroids,
            lists,
            vectors,
        }
    }

    /// Up to `k` nearest neighbors from the `nprobe` closest lists.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut centroid_order: Vec<(usize, f32)> = self
            .centroids
            .iter()
            .enumerate()
            .map(|(cluster, centroid)| (cluster, squared_l2(query, centroid)))
            .collect();
        centroid_order.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let mut candidates = Vec::new();
        for &(cluster, _) in centroid_order.iter().take(self.nprobe) {
            for &position in &self.lists[cluster] {
                candidates.push(Neighbor {
                    position,
                    distance: squared_l2(query, &self.vectors[position as usize]),
                });
            }
        }

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

    #[must_use]
    pub fn nlist(&self) -> usize {
        self.centroids.len()
    }

    #[must_use]
    pub fn nprobe(&self) -> usize {
        self.nprobe
    }

    pub(crate) fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    pub(crate) fn lists(&self) -> &[Vec<u32>] {
        &self.lists
    }

    pub(crate) fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }
}
