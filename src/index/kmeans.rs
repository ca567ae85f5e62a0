//! K-means clustering used to train the clustered index's quantizer.
//!
//! Pure Rust K-means over squared Euclidean distance with K-means++
//! initialization. The caller supplies the rng seed so identical record
//! batches train to identical centroids.
//!
//! # Algorithm Details
//! - Distance metric: squared L2 (matches the search metric)
//! - Initialization: K-means++ for better convergence
//! - Max iterations: 100
//! - Convergence tolerance: 1e-4
//!
//! # Performance Characteristics
//! - O(n * k * d * iterations) time complexity
//! - O(k * d) space for centroids
//! - Assignment step runs on the rayon pool

use crate::index::squared_l2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use thiserror::Error;

/// Maximum number of iterations for K-means clustering.
const MAX_ITERATIONS: usize = 100;

/// Convergence tolerance for centroid updates.
const CONVERGENCE_TOLERANCE: f32 = 1e-4;

/// Epsilon for floating-point comparisons.
const EPSILON: f32 = 1e-10;

/// Result of K-means clustering operation.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Cluster centroids, each a vector of the same dimension as input vectors.
    pub centroids: Vec<Vec<f32>>,

    /// Cluster index (0-based) for each input vector.
    pub assignments: Vec<usize>,

    /// Number of iterations until convergence.
    pub iterations: usize,
}

/// Errors that can occur during clustering operations.
#[derive(Error, Debug)]
pub enum ClusteringError {
    #[error(
        "Empty vector set provided for clustering\nSuggestion: Ensure vectors are generated before training"
    )]
    EmptyVectorSet,

    #[error("Invalid cluster count: {0}\nSuggestion: Use k between 1 and the number of vectors")]
    InvalidClusterCount(usize),

    #[error(
        "Dimension mismatch in vectors\nSuggestion: Ensure all vectors come from the same embedding model"
    )]
    DimensionMismatch,

    #[error(
        "Failed to initialize centroids\nSuggestion: Check that vectors contain valid floating-point values"
    )]
    InitializationFailed,
}

/// Performs K-means clustering on a set of vectors.
///
/// # Arguments
/// * `vectors` - Input vectors to cluster (must be non-empty and same dimension)
/// * `k` - Number of clusters (must be >= 1 and <= number of vectors)
/// * `seed` - Rng seed; a fixed seed makes training reproducible
///
/// # Algorithm
/// 1. Initialize centroids using K-means++ and assign each vector to
///    its nearest seed (squared L2)
/// 2. Iterate until convergence or max iterations:
///    - Update centroids as the mean of assigned vectors
///    - Re-assign each vector to its nearest centroid
///    - Stop when assignments are stable or centroid movement falls
///      below tolerance
#[must_use = "clustering results should be used or the computation is wasted"]
pub fn kmeans(
    vectors: &[Vec<f32>],
    k: usize,
    seed: u64,
) -> Result<KMeansResult, ClusteringError> {
    if vectors.is_empty() {
        return Err(ClusteringError::EmptyVectorSet);
    }

    if k == 0 || k > vectors.len() {
        return Err(ClusteringError::InvalidClusterCount(k));
    }

    let dimension = vectors[0].len();
    if vectors.iter().any(|v| v.len() != dimension) {
        return Err(ClusteringError::DimensionMismatch);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = initialize_centroids_kmeans_plus_plus(vectors, k, &mut rng)?;

    // Initial assignment against the k-means++ seeds.
    let seed_refs: Vec<&[f32]> = centroids.iter().map(|c| c.as_slice()).collect();
    let mut assignments: Vec<usize> = vectors
        .par_iter()
        .map(|vector| assign_to_nearest_centroid(vector, &seed_refs))
        .collect();
    let mut iterations = 0;

    loop {
        iterations += 1;

        // Update step runs before the convergence check, so even an
        // immediately stable assignment leaves mean centroids rather
        // than the raw seed vectors.
        let new_centroids = update_centroids(vectors, &assignments, k, &mut rng);
        let centroid_movement = calculate_centroid_movement(&centroids, &new_centroids);
        centroids = new_centroids;

        // Assignment step
        let centroid_refs: Vec<&[f32]> = centroids.iter().map(|c| c.as_slice()).collect();
        let new_assignments: Vec<usize> = vectors
            .par_iter()
            .map(|vector| assign_to_nearest_centroid(vector, &centroid_refs))
            .collect();

        let converged = new_assignments == assignments;
        assignments = new_assignments;

        if converged
            || centroid_movement < CONVERGENCE_TOLERANCE
            || iterations >= MAX_ITERATIONS
        {
            break;
        }
    }

    if iterations >= MAX_ITERATIONS {
        // Still usable, the centroids are just not fully settled
        tracing::warn!("K-means did not fully converge after {MAX_ITERATIONS} iterations");
    }

    Ok(KMeansResult {
        centroids,
        assignments,
        iterations,
    })
}

/// Returns the 0-based index of the nearest centroid by squared L2.
pub fn assign_to_nearest_centroid(vector: &[f32], centroids: &[&[f32]]) -> usize {
    let mut best_distance = f32::INFINITY;
    let mut best_cluster = 0;

    for (i, centroid) in centroids.iter().enumerate() {
        let distance = squared_l2(vector, centroid);
        if distance < best_distance {
            best_distance = distance;
            best_cluster = i;
        }
    }

    best_cluster
}

/// Updates centroids as the mean of their assigned vectors.
///
/// An empty cluster is reseeded to a random input vector so every
/// centroid keeps pulling its share of the space.
fn update_centroids(
    vectors: &[Vec<f32>],
    assignments: &[usize],
    k: usize,
    rng: &mut StdRng,
) -> Vec<Vec<f32>> {
    let dimension = vectors[0].len();
    let mut new_centroids = vec![vec![0.0; dimension]; k];
    let mut cluster_sizes = vec![0usize; k];

    for (vector, &cluster_idx) in vectors.iter().zip(assignments.iter()) {
        for (i, &value) in vector.iter().enumerate() {
            new_centroids[cluster_idx][i] += value;
        }
        cluster_sizes[cluster_idx] += 1;
    }

    for (centroid, &size) in new_centroids.iter_mut().zip(cluster_sizes.iter()) {
        if size == 0 {
            let random_idx = rng.random_range(0..vectors.len());
            *centroid = vectors[random_idx].clone();
        } else {
            for value in centroid.iter_mut() {
                *value /= size as f32;
            }
        }
    }

    new_centroids
}

/// Initializes centroids using the K-means++ algorithm.
///
/// K-means++ selects initial centroids that are far apart, leading to
/// better convergence properties than random initialization.
fn initialize_centroids_kmeans_plus_plus(
    vectors: &[Vec<f32>],
    k: usize,
    rng: &mut StdRng,
) -> Result<Vec<Vec<f32>>, ClusteringError> {
    let mut centroids = Vec::with_capacity(k);

    let first_idx = rng.random_range(0..vectors.len());
    centroids.push(vectors[first_idx].clone());

    for _ in 1..k {
        // Squared distance to the nearest chosen centroid drives the
        // D^2 sampling distribution
        let mut distances = vec![0.0f32; vectors.len()];
        let mut total_distance = 0.0f32;

        for (i, vector) in vectors.iter().enumerate() {
            let mut min_distance = f32::MAX;
            for centroid in &centroids {
                let distance = squared_l2(vector, centroid);
                min_distance = min_distance.min(distance);
            }
            distances[i] = min_distance;
            total_distance += min_distance;
        }

        if total_distance < EPSILON {
            // All points coincide with existing centroids; stop early
            break;
        }

        let mut cumulative = 0.0;
        let target = rng.random::<f32>() * total_distance;
        let mut added = false;

        for (i, &distance) in distances.iter().enumerate() {
            cumulative += distance;
            if cumulative >= target {
                centroids.push(vectors[i].clone());
                added = true;
                break;
            }
        }

        // Fallback: add the last vector if rounding errors prevent selection
        if !added && centroids.len() < k {
            centroids.push(vectors[vectors.len() - 1].clone());
        }
    }

    if centroids.len() != k {
        return Err(ClusteringError::InitializationFailed);
    }

    Ok(centroids)
}

/// Mean squared movement of centroids between iterations.
fn calculate_centroid_movement(old: &[Vec<f32>], new: &[Vec<f32>]) -> f32 {
    old.iter()
        .zip(new.iter())
        .map(|(old_c, new_c)| squared_l2(old_c, new_c))
        .sum::<f32>()
        / old.len() as f32
}
