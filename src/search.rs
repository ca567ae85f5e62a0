//! Concurrent search fan-out across project shards.
//!
//! The coordinator resolves each requested project through the
//! registry, runs the per-shard searches in parallel under a bounded
//! permit pool, and groups results by project. A failing shard
//! contributes an empty group carrying its error; it never fails the
//! whole fan-out. An optional deadline abandons shards that have not
//! answered in time and tags the outcome as partial.

use crate::registry::ShardRegistry;
use crate::shard::SearchHit;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// One project's contribution to a fan-out search.
#[derive(Debug, Clone)]
pub struct ProjectHits {
    pub project: String,
    /// Ascending by distance; empty when the project failed.
    pub hits: Vec<SearchHit>,
    /// Why this project contributed nothing, when it failed.
    pub error: Option<String>,
}

impl ProjectHits {
    fn healthy(project: String, hits: Vec<SearchHit>) -> Self {
        Self {
            project,
            hits,
            error: None,
        }
    }

    fn failed(project: String, reason: impl ToString) -> Self {
        Self {
            project,
            hits: Vec::new(),
            error: Some(reason.to_string()),
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.error.is_none()
    }
}

/// Fan-out result: one group per requested project, sorted by name.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub projects: Vec<ProjectHits>,
    /// True when the deadline expired before every project answered.
    pub partial: bool,
}

impl SearchOutcome {
    #[must_use]
    pub fn total_hits(&self) -> usize {
        self.projects.iter().map(|group| group.hits.len()).sum()
    }

    /// Render the hits as a context block grouped by project, ready to
    /// hand to a downstream completion step. Failed and empty projects
    /// are omitted.
    #[must_use]
    pub fn render_context(&self) -> String {
        let mut out = String::new();
        for group in &self.projects {
            if group.hits.is_empty() {
                continue;
            }
            out.push_str(&format!("## Project: {}\n\n", group.project));
            for hit in &group.hits {
                out.push_str(&format!("[{}] {}\n", hit.external_id, hit.content));
            }
            out.push('\n');
        }
        out
    }
}

pub struct QueryCoordinator {
    registry: Arc<ShardRegistry>,
    max_parallel: usize,
    timeout: Option<Duration>,
}

impl QueryCoordinator {
    #[must_use]
    pub fn new(
        registry: Arc<ShardRegistry>,
        max_parallel: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            max_parallel: max_parallel.max(1),
            timeout,
        }
    }

    /// Search `projects` for the `k` nearest documents to `query`,
    /// each project independently.
    pub async fn search(&self, query: &[f32], k: usize, projects: &[String]) -> SearchOutcome {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks: JoinSet<ProjectHits> = JoinSet::new();
        let mut names: HashMap<tokio::task::Id, String> = HashMap::new();

        for project in projects {
            let registry = Arc::clone(&self.registry);
            let semaphore = Arc::clone(&semaphore);
            let name = project.clone();
            let project = project.clone();
            let query = query.to_vec();
            let handle = tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return ProjectHits::failed(project, "search pool closed"),
                };
                search_one(&registry, project, &query, k).await
            });
            names.insert(handle.id(), name);
        }

        let deadline = self.timeout.map(|t| tokio::time::Instant::now() + t);
        let mut groups: Vec<ProjectHits> = Vec::with_capacity(projects.len());
        let mut partial = false;

        loop {
            let joined = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            partial = true;
                            tasks.abort_all();
                            break;
                        }
                    }
                }
                None => tasks.join_next().await,
            };
            match joined {
                Some(Ok(group)) => groups.push(group),
                Some(Err(e)) => {
                    warn!(error = %e, "per-shard search task failed");
                    if let Some(project) = names.get(&e.id()) {
                        groups.push(ProjectHits::failed(project.clone(), "search task panicked"));
                    }
                }
                None => break,
            }
        }

        if partial {
            let done: BTreeSet<String> = groups.iter().map(|g| g.project.clone()).collect();
            for project in projects {
                if !done.contains(project.as_str()) {
                    debug!(project = %project, "abandoned after deadline");
                    groups.push(ProjectHits::failed(
                        project.clone(),
                        "deadline expired before this project answered",
                    ));
                }
            }
        }

        groups.sort_by(|a, b| a.project.cmp(&b.project));
        SearchOutcome {
            projects: groups,
            partial,
        }
    }
}

async fn search_one(
    registry: &ShardRegistry,
    project: String,
    query: &[f32],
    k: usize,
) -> ProjectHits {
    let shard = match registry.get(&project).await {
        Ok(shard) => shard,
        Err(e) => return ProjectHits::failed(project, e),
    };
    match shard.search(query, k) {
        Ok(hits) => ProjectHits::healthy(project, hits),
        Err(e) => {
            warn!(project = %shard.project(), error = %e, "shard search failed");
            ProjectHits::failed(project, e)
        }
    }
}
