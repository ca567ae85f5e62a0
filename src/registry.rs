//! Shard registry: discovery, cached loads, single-flight.
//!
//! The registry owns every loaded shard. A project is discovered when
//! its directory under the storage root contains a complete-looking
//! shard; it is loaded on first access and cached for the registry's
//! lifetime until a rebuild installs a replacement or [`evict`] drops
//! it. Loads go through [`tokio::task::spawn_blocking`] since reading a
//! large index from disk may block for a while.
//!
//! [`evict`]: ShardRegistry::evict

use crate::error::ShardUnavailable;
use crate::shard::{Shard, persistence};
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// One load slot per project. The cell resolves exactly once, so every
/// caller racing on a cold project awaits the same load and receives
/// the same shard or the same error.
type LoadSlot = Arc<OnceCell<Result<Arc<Shard>, ShardUnavailable>>>;

pub struct ShardRegistry {
    storage_root: PathBuf,
    /// Embedding model expected by query vectors; checked against each
    /// shard's manifest on load.
    model_hint: Option<String>,
    shards: DashMap<String, LoadSlot>,
}

impl ShardRegistry {
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            model_hint: None,
            shards: DashMap::new(),
        }
    }

    #[must_use]
    pub fn with_model_hint(mut self, model: impl Into<String>) -> Self {
        self.model_hint = Some(model.into());
        self
    }

    #[must_use]
    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    /// Cached shard for `project`, loading it on first access.
    ///
    /// Concurrent calls for a project that is not yet loaded trigger
    /// exactly one disk load. A failed load is handed to every waiter
    /// but not cached, so a later call retries from disk.
    pub async fn get(&self, project: &str) -> Result<Arc<Shard>, ShardUnavailable> {
        let slot = self
            .shards
            .entry(project.to_string())
            .or_default()
            .clone();
        let result = slot
            .get_or_init(|| async { self.load_shard(project).await })
            .await
            .clone();

        if result.is_err() {
            // Drop the failed slot unless an install already replaced it.
            self.shards
                .remove_if(project, |_, current| Arc::ptr_eq(current, &slot));
        }
        result
    }

    async fn load_shard(&self, project: &str) -> Result<Arc<Shard>, ShardUnavailable> {
        let root = self.storage_root.clone();
        let name = project.to_string();
        let model = self.model_hint.clone();
        let outcome =
            tokio::task::spawn_blocking(move || persistence::load(&root, &name, model.as_deref()))
                .await;

        match outcome {
            Ok(Ok(shard)) => Ok(Arc::new(shard)),
            Ok(Err(e)) => {
                warn!(project, error = %e, "shard load failed");
                Err(ShardUnavailable::new(project, &e))
            }
            Err(e) => {
                warn!(project, error = %e, "shard load task failed");
                Err(ShardUnavailable {
                    project: project.to_string(),
                    reason: format!("load task failed: {e}"),
                })
            }
        }
    }

    /// Swap in a freshly built shard.
    ///
    /// Searches that already hold the previous `Arc<Shard>` finish
    /// against it; anything that resolves the project after this call
    /// sees only the new shard.
    pub fn install(&self, shard: Arc<Shard>) {
        let project = shard.project().to_string();
        let slot: LoadSlot = Arc::new(OnceCell::new_with(Some(Ok(shard))));
        self.shards.insert(project.clone(), slot);
        debug!(project, "shard installed");
    }

    /// Drop a cached shard so the next access reloads from disk.
    pub fn evict(&self, project: &str) -> bool {
        self.shards.remove(project).is_some()
    }

    /// Projects under the storage root with a complete-looking shard
    /// directory, sorted by name. Presence is judged by artifact files,
    /// not by a full parse.
    pub fn list_projects(&self) -> Vec<String> {
        let mut projects = Vec::new();
        match fs::read_dir(&self.storage_root) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if !path.is_dir() {
                        continue;
                    }
                    if persistence::is_shard_dir(&path.join(persistence::STORE_DIR)) {
                        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                            projects.push(name.to_string());
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(root = %self.storage_root.display(), error = %e, "could not scan storage root");
            }
        }
        projects.sort();
        projects
    }

    /// Re-scan the storage root. Cached entries whose directories
    /// vanished are dropped; new directories load lazily on first
    /// access. Returns the currently discovered projects.
    pub fn refresh(&self) -> Vec<String> {
        let discovered = self.list_projects();
        self.shards
            .retain(|project, _| discovered.binary_search(project).is_ok());
        debug!(projects = discovered.len(), "storage root re-scanned");
        discovered
    }

    /// Eagerly load every discovered project. Projects that fail to
    /// load are skipped with a warning. Returns how many loaded.
    pub async fn warm(&self) -> usize {
        let mut loaded = 0;
        for project in self.list_projects() {
            match self.get(&project).await {
                Ok(_) => loaded += 1,
                Err(e) => warn!(project = %project, error = %e, "skipping shard during warm-up"),
            }
        }
        info!(loaded, "registry warmed");
        loaded
    }
}
