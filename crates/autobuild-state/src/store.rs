//! File-backed store of the last successful build per branch.
//!
//! On disk the store is a YAML mapping from branch name to record:
//!
//! ```yaml
//! origin/release-2.0.1:
//!   commit: 3f9c2ab
//!   s3links:
//!   - http://bucket.s3.amazonaws.com/20240101120000UTC_2.0.1_3f9c2ab_app-installer.dmg
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StateError, StateResult};

/// Last successful build of a single branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchState {
    /// Short hash of the commit that was built.
    pub commit: String,

    /// Links to the uploaded artifacts, in upload order.
    #[serde(rename = "s3links", default)]
    pub links: Vec<String>,
}

/// Mapping of branch name to [`BranchState`], bound to the file it was loaded from.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    branches: BTreeMap<String, BranchState>,
}

impl StateStore {
    /// Create an empty store that will be saved to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            branches: BTreeMap::new(),
        }
    }

    /// Load the store from `path`.
    ///
    /// A missing or empty file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> StateResult<Self> {
        let path = path.into();

        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No state file, starting empty");
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(StateError::Io { path, source }),
        };

        if raw.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        let branches: Option<BTreeMap<String, BranchState>> =
            serde_yaml::from_str(&raw).map_err(|e| StateError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;

        let branches = branches.unwrap_or_default();
        debug!(path = %path.display(), branches = branches.len(), "Loaded state");
        Ok(Self { path, branches })
    }

    /// Path this store saves to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last build of `branch`, if any.
    pub fn get(&self, branch: &str) -> Option<&BranchState> {
        self.branches.get(branch)
    }

    /// Last built commit of `branch`, if any.
    pub fn last_commit(&self, branch: &str) -> Option<&str> {
        self.get(branch).map(|s| s.commit.as_str())
    }

    /// Record a successful build, returning the record it replaced.
    pub fn set(
        &mut self,
        branch: impl Into<String>,
        commit: impl Into<String>,
        links: Vec<String>,
    ) -> Option<BranchState> {
        self.branches.insert(
            branch.into(),
            BranchState {
                commit: commit.into(),
                links,
            },
        )
    }

    /// Put back a record previously returned by [`StateStore::set`].
    ///
    /// `None` removes the branch entirely.
    pub fn restore(&mut self, branch: &str, previous: Option<BranchState>) {
        match previous {
            Some(state) => {
                self.branches.insert(branch.to_string(), state);
            }
            None => {
                self.branches.remove(branch);
            }
        }
    }

    /// Iterate over all records in branch-name order.
    pub fn branches(&self) -> impl Iterator<Item = (&str, &BranchState)> {
        self.branches.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Write the store back to the file it was loaded from.
    pub fn save(&self) -> StateResult<()> {
        self.save_to(&self.path)
    }

    /// Write the store to `path`, replacing any existing file atomically.
    pub fn save_to(&self, path: &Path) -> StateResult<()> {
        let serialized = serde_yaml::to_string(&self.branches)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let io_err = |source| StateError::Io {
            path: path.to_path_buf(),
            source,
        };

        // Write to a temp file in the same directory, then rename over the target.
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(serialized.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        debug!(path = %path.display(), branches = self.branches.len(), "Saved state");
        Ok(())
    }
}
