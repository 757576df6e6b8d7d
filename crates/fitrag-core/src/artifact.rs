//! Versioned artifact builds with an atomically flipped `CURRENT` pointer.
//!
//! Layout under a store root:
//!
//! ```text
//! CURRENT                 # name of the active build
//! builds/<id>/            # one complete artifact set (index + metadata + ...)
//! builds/<id>.partial/    # build in progress; never read
//! ```
//!
//! A build is staged in `<id>.partial`, renamed to `<id>` once every artifact is
//! written, and only then is `CURRENT` replaced (temp file + rename). Readers resolve
//! `CURRENT` once and load everything from that one directory. Publishing keeps the
//! build it replaces so a process still serving it can finish; anything older is pruned.
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const SCHEMA_VERSION: u32 = 1;

pub const CURRENT_POINTER: &str = "CURRENT";
pub const BUILDS_DIR: &str = "builds";
pub const META_FILE: &str = "meta.json";
pub const PIPELINE_FILE: &str = "pipeline.json";
pub const TRANSFORM_FILE: &str = "transform.json";
pub const VECTORS_DIR: &str = "vectors";

const PARTIAL_SUFFIX: &str = ".partial";

/// Provenance written next to every build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildProvenance {
    pub schema_version: u32,
    /// File name of the source the build was made from.
    pub built_from: String,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub source_blake3: String,
    pub built_at: String,
    pub vector_count: usize,
    pub dim: usize,
}

/// Bare file name of `path`, as recorded in build metadata.
pub fn source_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn fingerprint_file(path: &Path) -> Result<String> {
    Ok(fingerprint_bytes(&fs::read(path)?))
}

pub fn check_schema_version(found: u32, what: &str) -> Result<()> {
    if found != SCHEMA_VERSION {
        return Err(Error::IncompatibleArtifact(format!(
            "{} has schema_version {} but this build reads {}",
            what, found, SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// Read a JSON artifact; a missing file is reported as a missing index.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    match fs::read_to_string(path) {
        Ok(s) => Ok(serde_json::from_str(&s)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::IndexNotFound(format!("{} is missing", path.display()))),
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn builds_dir(&self) -> PathBuf {
        self.root.join(BUILDS_DIR)
    }

    /// Start a new build; `tag` is appended to the timestamped id (e.g. a source hash prefix).
    pub fn begin_build(&self, tag: &str) -> Result<StagedBuild> {
        let builds = self.builds_dir();
        fs::create_dir_all(&builds)?;
        let base = format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%6f"), tag);
        let mut id = base.clone();
        let mut n = 1;
        while builds.join(&id).exists() || builds.join(format!("{}{}", id, PARTIAL_SUFFIX)).exists() {
            id = format!("{}-{}", base, n);
            n += 1;
        }
        let dir = builds.join(format!("{}{}", id, PARTIAL_SUFFIX));
        fs::create_dir(&dir)?;
        tracing::debug!(build = %id, dir = %dir.display(), "staging build");
        Ok(StagedBuild { store: self.clone(), id, dir, published: false })
    }

    pub fn current_build_id(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.root.join(CURRENT_POINTER)) {
            Ok(s) => {
                let id = s.trim();
                Ok(if id.is_empty() { None } else { Some(id.to_string()) })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Directory of the active build. `IndexNotFound` when nothing has been published.
    pub fn current_build_dir(&self) -> Result<(String, PathBuf)> {
        let id = self.current_build_id()?.ok_or_else(|| {
            Error::IndexNotFound(format!("no published build under {}; run the indexer first", self.root.display()))
        })?;
        let dir = self.builds_dir().join(&id);
        if !dir.is_dir() {
            return Err(Error::IndexNotFound(format!("build '{}' referenced by {} is missing", id, CURRENT_POINTER)));
        }
        Ok((id, dir))
    }

    fn write_pointer(&self, id: &str) -> Result<()> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.root)?;
        tmp.write_all(id.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.root.join(CURRENT_POINTER)).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    /// Remove sealed builds other than `current` and `previous`. Staging directories
    /// belong to whichever indexer is writing them and are left alone.
    fn prune(&self, current: &str, previous: Option<&str>) {
        let Ok(entries) = fs::read_dir(self.builds_dir()) else { return };
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == current || Some(name.as_str()) == previous || name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                tracing::warn!(path = %entry.path().display(), error = %e, "failed to prune old build");
            }
        }
    }
}

/// A build being written. Dropped without `publish` it is deleted.
pub struct StagedBuild {
    store: ArtifactStore,
    id: String,
    dir: PathBuf,
    published: bool,
}

impl StagedBuild {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        fs::write(self.dir.join(name), serde_json::to_string_pretty(value)?)?;
        Ok(())
    }

    /// Seal the build and make it current. Returns the final build directory.
    pub fn publish(mut self) -> Result<PathBuf> {
        let final_dir = self.store.builds_dir().join(&self.id);
        let previous = self.store.current_build_id()?;
        fs::rename(&self.dir, &final_dir)?;
        self.dir = final_dir.clone();
        self.store.write_pointer(&self.id)?;
        self.published = true;
        self.store.prune(&self.id, previous.as_deref());
        tracing::info!(build = %self.id, store = %self.store.root.display(), "published build");
        Ok(final_dir)
    }
}

impl Drop for StagedBuild {
    fn drop(&mut self) {
        if !self.published {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                tracing::warn!(dir = %self.dir.display(), error = %e, "failed to remove abandoned build");
            }
        }
    }
}
