//! Per-branch and per-run results.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::upload::UploadedArtifact;

/// A branch that was built, uploaded and is ready to be announced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Remote branch name, e.g. `origin/release-2.0.1`.
    pub branch: String,

    /// Short hash that was built.
    pub commit: String,

    /// Version string injected into the build.
    pub version: String,

    /// Uploaded (or, in a dry run, predicted) artifacts in upload order.
    pub artifacts: Vec<UploadedArtifact>,

    /// Commit of the previous successful build, if any.
    pub previous_commit: Option<String>,
}

impl BuildResult {
    /// Artifact links in upload order.
    pub fn links(&self) -> Vec<String> {
        self.artifacts.iter().map(|a| a.url.clone()).collect()
    }
}

/// Step at which a branch was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Build,
    Upload,
    Notify,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Build => "build",
            Stage::Upload => "upload",
            Stage::Notify => "notify",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

/// What happened to one branch during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchOutcome {
    /// Head unchanged since the last successful build.
    Skipped,

    /// Built, uploaded, announced and recorded.
    Built(BuildResult),

    /// Abandoned at `stage`; the state entry was left untouched.
    Failed { stage: Stage, error: String },
}

/// One branch's line in a [`RunReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchReport {
    pub branch: String,
    pub commit: String,
    pub outcome: BranchOutcome,
}

/// Outcome of every branch considered by a run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Built entries are predictions: nothing was built, uploaded or recorded.
    #[serde(default)]
    pub dry_run: bool,

    pub branches: Vec<BranchReport>,
}

impl RunReport {
    pub fn push(&mut self, branch: String, commit: String, outcome: BranchOutcome) {
        self.branches.push(BranchReport {
            branch,
            commit,
            outcome,
        });
    }

    /// Outcome for `branch`, if it was considered.
    pub fn outcome(&self, branch: &str) -> Option<&BranchOutcome> {
        self.branches
            .iter()
            .find(|b| b.branch == branch)
            .map(|b| &b.outcome)
    }

    pub fn built_count(&self) -> usize {
        self.count(|o| matches!(o, BranchOutcome::Built(_)))
    }

    pub fn skipped_count(&self) -> usize {
        self.count(|o| matches!(o, BranchOutcome::Skipped))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, BranchOutcome::Failed { .. }))
    }

    /// Whether no branch failed.
    pub fn success(&self) -> bool {
        self.failed_count() == 0
    }

    fn count(&self, pred: impl Fn(&BranchOutcome) -> bool) -> usize {
        self.branches.iter().filter(|b| pred(&b.outcome)).count()
    }
}
