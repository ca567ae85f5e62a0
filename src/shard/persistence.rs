//! Shard directory persistence.
//!
//! Layout per project under the storage root:
//!
//! ```text
//! <root>/<project>/vectorstore/
//!     index.bin       nearest-neighbor index blob
//!     docstore.json   external_id -> {content, metadata}
//!     mapping.json    position -> external_id, as a JSON array
//!     manifest.json   build provenance, read leniently
//! ```
//!
//! Writes are crash-consistent: every artifact is written and synced in
//! a staging directory, which is then renamed into place. A reader can
//! observe the previous complete shard or the new complete shard, never
//! a directory with some artifacts missing.

use crate::error::{PersistError, PersistResult};
use crate::index::codec::{self, INDEX_ARTIFACT};
use crate::shard::{Docstore, IdMapping, Shard};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Shard directory name inside a project directory.
pub const STORE_DIR: &str = "vectorstore";
pub const DOCSTORE_ARTIFACT: &str = "docstore.json";
pub const MAPPING_ARTIFACT: &str = "mapping.json";
pub const MANIFEST_ARTIFACT: &str = "manifest.json";

const STAGING_DIR: &str = "vectorstore.staging";
const RETIRED_DIR: &str = "vectorstore.old";

/// Build provenance written next to the artifacts.
///
/// Written on every save, read leniently: an absent or unparseable
/// manifest never fails a load, it only forfeits the model check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardManifest {
    /// Manifest format version.
    #[serde(default)]
    pub version: u32,
    pub model: String,
    pub dimension: usize,
    pub documents: usize,
    pub variant: String,
    /// Unix timestamp of the build, seconds.
    pub built_at: u64,
}

impl ShardManifest {
    pub const CURRENT_VERSION: u32 = 1;

    fn for_shard(shard: &Shard, model: impl Into<String>) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            model: model.into(),
            dimension: shard.dimension(),
            documents: shard.count(),
            variant: shard.variant(),
            built_at: Utc::now().timestamp() as u64,
        }
    }
}

/// Live shard directory for a project.
pub fn shard_dir(root: &Path, project: &str) -> PathBuf {
    root.join(project).join(STORE_DIR)
}

/// Presence check used for project discovery. Judges artifact presence
/// only; a full parse happens at load time.
pub fn is_shard_dir(dir: &Path) -> bool {
    [INDEX_ARTIFACT, MAPPING_ARTIFACT, DOCSTORE_ARTIFACT]
        .iter()
        .all(|artifact| dir.join(artifact).is_file())
}

/// Write `shard` under `root`, replacing any previous build of the same
/// project.
///
/// Artifacts are staged in a sibling directory first. Once all of them
/// are written and synced, the previous live directory (if any) moves
/// aside, the staging directory renames into place and the retired
/// directory is removed. Leftover staging or retired directories from
/// an interrupted earlier save are cleared before writing starts.
pub fn save(root: &Path, shard: &Shard, model: &str) -> PersistResult<()> {
    let project_dir = root.join(shard.project());
    let live = project_dir.join(STORE_DIR);
    let staging = project_dir.join(STAGING_DIR);
    let retired = project_dir.join(RETIRED_DIR);

    for leftover in [&staging, &retired] {
        if leftover.exists() {
            debug!(path = %leftover.display(), "clearing leftover shard directory");
            fs::remove_dir_all(leftover).map_err(|e| PersistError::io(leftover, e))?;
        }
    }
    fs::create_dir_all(&staging).map_err(|e| PersistError::io(&staging, e))?;

    write_artifact(&staging.join(INDEX_ARTIFACT), &codec::encode(&shard.index))?;
    write_json(&staging.join(MAPPING_ARTIFACT), &shard.mapping)?;
    write_json(&staging.join(DOCSTORE_ARTIFACT), &shard.docstore)?;
    write_json(
        &staging.join(MANIFEST_ARTIFACT),
        &ShardManifest::for_shard(shard, model),
    )?;

    if live.exists() {
        fs::rename(&live, &retired).map_err(|e| PersistError::io(&live, e))?;
    }
    fs::rename(&staging, &live).map_err(|e| PersistError::io(&staging, e))?;
    if retired.exists() {
        if let Err(e) = fs::remove_dir_all(&retired) {
            warn!(path = %retired.display(), error = %e, "could not remove retired shard directory");
        }
    }

    debug!(project = shard.project(), path = %live.display(), "shard saved");
    Ok(())
}

/// Load and validate the shard for `project`.
///
/// This is the single gate between the on-disk format and the rest of
/// the system: a shard returned from here has an index, mapping and
/// docstore that agree in shape, with a duplicate-free mapping.
///
/// When `expected_model` is given and the manifest records a different
/// embedding model, the shard still loads but a warning is logged;
/// distances against queries from the wrong model are not meaningful.
pub fn load(root: &Path, project: &str, expected_model: Option<&str>) -> PersistResult<Shard> {
    let dir = shard_dir(root, project);

    let index = codec::decode(&read_artifact(&dir, INDEX_ARTIFACT)?)?;
    let mapping: IdMapping = read_json(&dir, MAPPING_ARTIFACT)?;
    let docstore: Docstore = read_json(&dir, DOCSTORE_ARTIFACT)?;

    // One id at two positions passes the count checks but is not a
    // bijection; reject it here.
    let mut seen = BTreeSet::new();
    for id in &mapping {
        if !seen.insert(id.as_str()) {
            return Err(PersistError::CorruptFormat {
                artifact: MAPPING_ARTIFACT,
                reason: format!("external id '{id}' appears at more than one position"),
            });
        }
    }

    let shard = Shard::from_parts(project, index, mapping, docstore)?;

    match read_json::<ShardManifest>(&dir, MANIFEST_ARTIFACT) {
        Ok(manifest) => {
            if manifest.version > ShardManifest::CURRENT_VERSION {
                warn!(
                    project,
                    version = manifest.version,
                    supported = ShardManifest::CURRENT_VERSION,
                    "shard manifest is newer than this build supports"
                );
            }
            if let Some(expected) = expected_model {
                if manifest.model != expected {
                    warn!(
                        project,
                        recorded = %manifest.model,
                        expected,
                        "shard was built with a different embedding model; rebuild before trusting distances"
                    );
                }
            }
        }
        Err(e) => debug!(project, error = %e, "shard manifest unreadable"),
    }

    debug!(
        project,
        documents = shard.count(),
        variant = %shard.variant(),
        "shard loaded"
    );
    Ok(shard)
}

fn write_artifact(path: &Path, bytes: &[u8]) -> PersistResult<()> {
    let mut file = File::create(path).map_err(|e| PersistError::io(path, e))?;
    file.write_all(bytes).map_err(|e| PersistError::io(path, e))?;
    file.sync_all().map_err(|e| PersistError::io(path, e))?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> PersistResult<()> {
    let json = serde_json::to_vec(value)
        .map_err(|e| PersistError::io(path, std::io::Error::other(e)))?;
    write_artifact(path, &json)
}

fn read_artifact(dir: &Path, artifact: &'static str) -> PersistResult<Vec<u8>> {
    let path = dir.join(artifact);
    match fs::read(&path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PersistError::MissingArtifact {
                artifact,
                dir: dir.to_path_buf(),
            })
        }
        Err(e) => Err(PersistError::io(path, e)),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(
    dir: &Path,
    artifact: &'static str,
) -> PersistResult<T> {
    let bytes = read_artifact(dir, artifact)?;
    serde_json::from_slice(&bytes).map_err(|e| PersistError::CorruptFormat {
        artifact,
        reason: e.to_string(),
    })
}
