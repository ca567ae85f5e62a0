//! Error types for the retrieval subsystem.
//!
//! This module provides structured error types using thiserror with
//! actionable messages. Serve-path errors are isolated per shard by the
//! query coordinator; build-path errors are fatal to that build only.

use crate::embedding::EmbeddingError;
use crate::index::IndexError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store operations exposed by the service facade.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error(
        "No documents provided for project '{project}'\nSuggestion: Supply at least one record; empty projects cannot be indexed"
    )]
    NoDocuments { project: String },

    /// Embedding provider failures, fatal to the current build or query.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(
        "Embedding batch has inconsistent dimensions: expected {expected}, got {actual} at position {position}\nSuggestion: Ensure every vector in the batch comes from the same embedding model"
    )]
    DimensionInconsistency {
        expected: usize,
        actual: usize,
        position: usize,
    },

    #[error("Index construction failed: {0}")]
    IndexBuild(#[from] IndexError),

    /// Persistence errors from saving or loading shard directories.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// A requested project's shard could not be loaded.
    #[error(transparent)]
    Shard(#[from] ShardUnavailable),

    #[error(
        "Document '{external_id}' not found in project '{project}'\nSuggestion: Check the id against the project's docstore, or rebuild if records changed"
    )]
    DocumentNotFound {
        project: String,
        external_id: String,
    },

    #[error(
        "Search deadline of {deadline_ms}ms expired before project '{project}' responded\nSuggestion: Raise search.timeout_ms or query fewer projects at once"
    )]
    QueryTimeout { project: String, deadline_ms: u64 },
}

impl StoreError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::NoDocuments { .. } => "NO_DOCUMENTS".to_string(),
            Self::Embedding(_) => "EMBEDDING_FAILED".to_string(),
            Self::DimensionInconsistency { .. } => "DIMENSION_INCONSISTENCY".to_string(),
            Self::IndexBuild(_) => "INDEX_BUILD_FAILED".to_string(),
            Self::Persist(e) => e.status_code(),
            Self::Shard(_) => "SHARD_UNAVAILABLE".to_string(),
            Self::DocumentNotFound { .. } => "DOCUMENT_NOT_FOUND".to_string(),
            Self::QueryTimeout { .. } => "QUERY_TIMEOUT".to_string(),
        }
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Embedding(_) => vec![
                "Verify the embedding model is installed and the cache directory is writable",
                "First-time model download requires network access",
            ],
            Self::Persist(_) | Self::Shard(_) => vec![
                "Run 'repodex build' for the affected project to regenerate its shard",
                "Check disk space and permissions under the storage root",
            ],
            Self::QueryTimeout { .. } => vec![
                "Raise search.timeout_ms in repodex.toml",
                "Scope the query to a single project to reduce fan-out",
            ],
            _ => vec![],
        }
    }
}

/// Errors from the shard persistence layer.
///
/// Load distinguishes three failure classes: an artifact file that is
/// absent, an artifact that cannot be parsed into its expected shape, and
/// artifacts that parse individually but disagree with each other.
#[derive(Error, Debug)]
pub enum PersistError {
    #[error(
        "Missing shard artifact '{artifact}' in '{dir}'\nSuggestion: The shard directory is incomplete; rebuild the project to regenerate it"
    )]
    MissingArtifact { artifact: &'static str, dir: PathBuf },

    #[error(
        "Shard artifact '{artifact}' is corrupt: {reason}\nSuggestion: Rebuild the project; the previous build may have been interrupted"
    )]
    CorruptFormat { artifact: &'static str, reason: String },

    #[error(
        "Shard artifacts disagree: index holds {vectors} vectors, mapping {mapping} positions, docstore resolves {resolved}\nSuggestion: Rebuild the project to restore a consistent shard"
    )]
    ShapeMismatch {
        vectors: usize,
        mapping: usize,
        resolved: usize,
    },

    #[error("Shard I/O failed at '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl PersistError {
    /// Attach the offending path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn status_code(&self) -> String {
        match self {
            Self::MissingArtifact { .. } => "MISSING_ARTIFACT",
            Self::CorruptFormat { .. } => "CORRUPT_FORMAT",
            Self::ShapeMismatch { .. } => "SHAPE_MISMATCH",
            Self::Io { .. } => "SHARD_IO_ERROR",
        }
        .to_string()
    }
}

/// A project's shard could not be loaded.
///
/// Cloneable so the registry can hand the same load failure to every
/// caller waiting on one in-flight load. The underlying cause is kept as
/// a rendered string for that reason.
#[derive(Error, Debug, Clone)]
#[error("Shard for project '{project}' is unavailable: {reason}")]
pub struct ShardUnavailable {
    pub project: String,
    pub reason: String,
}

impl ShardUnavailable {
    pub fn new(project: impl Into<String>, cause: &PersistError) -> Self {
        Self {
            project: project.into(),
            reason: cause.to_string(),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type alias for persistence operations
pub type PersistResult<T> = Result<T, PersistError>;
