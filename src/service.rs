//! Service facade: build, search, document lookup.
//!
//! Ties the pieces together for the caller-facing API. Builds run the
//! whole embed-index-save-reload-swap sequence as one unit under a
//! per-project lock; searches embed the query once and fan out through
//! the coordinator.

use crate::config::Settings;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::error::{ShardUnavailable, StoreError, StoreResult};
use crate::index::IndexParams;
use crate::record::Record;
use crate::registry::ShardRegistry;
use crate::search::{QueryCoordinator, SearchOutcome};
use crate::shard::{Shard, StoredDocument, build_shard, persistence};
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// What a completed build produced.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub project: String,
    pub documents: usize,
    pub dimension: usize,
    pub variant: String,
    /// Directory the shard artifacts were written to.
    pub path: PathBuf,
}

pub struct RetrievalService {
    provider: Arc<dyn EmbeddingProvider>,
    registry: Arc<ShardRegistry>,
    coordinator: QueryCoordinator,
    index_params: IndexParams,
    default_k: usize,
    timeout_ms: u64,
    /// Exclusive per-project build locks. Rebuilds of one project
    /// serialize; different projects build independently. Entries are
    /// dropped once a build finishes with no other build waiting.
    build_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl RetrievalService {
    #[must_use]
    pub fn new(settings: &Settings, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let registry = Arc::new(
            ShardRegistry::new(&settings.storage_root).with_model_hint(provider.model_name()),
        );
        let coordinator = QueryCoordinator::new(
            Arc::clone(&registry),
            settings.search.max_parallel,
            settings.search.timeout(),
        );
        Self {
            provider,
            registry,
            coordinator,
            index_params: settings.index.params(),
            default_k: settings.search.default_k.max(1),
            timeout_ms: settings.search.timeout_ms,
            build_locks: DashMap::new(),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ShardRegistry> {
        &self.registry
    }

    /// Embed and index `records`, persist the shard, then swap it into
    /// the registry. Searches running during the build keep the shard
    /// they already resolved; searches starting after see only the new
    /// one.
    pub async fn build(&self, project: &str, records: Vec<Record>) -> StoreResult<BuildSummary> {
        let lock = self
            .build_locks
            .entry(project.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.run_build(project, records).await
        };

        // Two strong references mean the map entry and our clone only:
        // no other build is waiting, so the entry can go. DashMap holds
        // the shard lock across the predicate, so no new waiter can
        // clone the Arc mid-removal.
        self.build_locks
            .remove_if(project, |_, current| Arc::strong_count(current) <= 2);

        result
    }

    async fn run_build(&self, project: &str, records: Vec<Record>) -> StoreResult<BuildSummary> {
        let provider = Arc::clone(&self.provider);
        let params = self.index_params;
        let root = self.registry.storage_root().to_path_buf();
        let name = project.to_string();
        let model = self.provider.model_name().to_string();

        // The load after save keeps the persisted bytes, not the
        // in-memory build, as the source of truth for what gets served.
        let loaded = tokio::task::spawn_blocking(move || -> StoreResult<Shard> {
            let shard = build_shard(&name, &records, provider.as_ref(), &params)?;
            persistence::save(&root, &shard, &model)?;
            let fresh = persistence::load(&root, &name, Some(&model))?;
            Ok(fresh)
        })
        .await
        .map_err(|e| ShardUnavailable {
            project: project.to_string(),
            reason: format!("build task failed: {e}"),
        })??;

        let summary = BuildSummary {
            project: project.to_string(),
            documents: loaded.count(),
            dimension: loaded.dimension(),
            variant: loaded.variant(),
            path: persistence::shard_dir(self.registry.storage_root(), project),
        };
        self.registry.install(Arc::new(loaded));
        info!(
            project,
            documents = summary.documents,
            variant = %summary.variant,
            "project indexed"
        );
        Ok(summary)
    }

    /// Embed `query_text` and search one project or every discovered
    /// project.
    ///
    /// A scoped query surfaces its project's failure: unavailable shard
    /// or expired deadline become errors. An unscoped query degrades
    /// gracefully and returns whatever healthy shards produced.
    pub async fn search(
        &self,
        query_text: &str,
        k: Option<usize>,
        project: Option<&str>,
    ) -> StoreResult<SearchOutcome> {
        let k = k.unwrap_or(self.default_k);
        let query = self.embed_query(query_text).await?;

        let targets: Vec<String> = match project {
            Some(name) => vec![name.to_string()],
            None => self.registry.list_projects(),
        };
        if targets.is_empty() {
            return Ok(SearchOutcome {
                projects: Vec::new(),
                partial: false,
            });
        }

        let outcome = self.coordinator.search(&query, k, &targets).await;

        if let Some(name) = project {
            if outcome.partial {
                return Err(StoreError::QueryTimeout {
                    project: name.to_string(),
                    deadline_ms: self.timeout_ms,
                });
            }
            if let Some(reason) = outcome
                .projects
                .iter()
                .find(|group| group.project == name)
                .and_then(|group| group.error.clone())
            {
                return Err(StoreError::Shard(ShardUnavailable {
                    project: name.to_string(),
                    reason,
                }));
            }
        }

        Ok(outcome)
    }

    /// Direct docstore lookup by external id.
    pub async fn get_document(
        &self,
        project: &str,
        external_id: &str,
    ) -> StoreResult<StoredDocument> {
        let shard = self.registry.get(project).await?;
        shard
            .document(external_id)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound {
                project: project.to_string(),
                external_id: external_id.to_string(),
            })
    }

    /// Projects with a shard directory under the storage root.
    #[must_use]
    pub fn list_projects(&self) -> Vec<String> {
        self.registry.list_projects()
    }

    async fn embed_query(&self, text: &str) -> StoreResult<Vec<f32>> {
        let provider = Arc::clone(&self.provider);
        let text = text.to_string();
        let mut vectors = tokio::task::spawn_blocking(move || provider.embed(&[text.as_str()]))
            .await
            .map_err(|e| EmbeddingError::Failed(format!("embedding task failed: {e}")))??;

        vectors.pop().ok_or(StoreError::Embedding(
            EmbeddingError::BatchShape {
                expected: 1,
                actual: 0,
            },
        ))
    }
}
