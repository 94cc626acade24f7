//! Run orchestration: decide, build, upload, notify and record per branch.

use std::sync::Arc;

use autobuild_state::StateStore;
use tracing::{info, warn};

use crate::builder::BuildDriver;
use crate::config::AutobuildConfig;
use crate::error::{AutobuildError, Result};
use crate::git::{BranchHead, GitRepo};
use crate::notify::{Notifier, WebhookSender};
use crate::result::{BranchOutcome, BuildResult, RunReport, Stage};
use crate::runner::CommandRunner;
use crate::upload::ArtifactUploader;
use crate::version::derive_version;

/// Options for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Check out but do not build or upload; leave the state untouched.
    pub dry_run: bool,

    /// Post a notification for each built branch.
    pub notify: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            notify: true,
        }
    }
}

/// Failure of one branch, tagged with the step that failed.
struct StageError {
    stage: Stage,
    error: AutobuildError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageError> {
        self.map_err(|error| StageError { stage, error })
    }
}

/// Builds every branch whose head moved since its last successful build.
pub struct Autobuilder {
    git: GitRepo,
    builder: BuildDriver,
    uploader: ArtifactUploader,
    notifier: Notifier,
    max_version_len: usize,
}

impl Autobuilder {
    /// Wire all components to `runner` and `webhook`.
    pub fn new(
        config: &AutobuildConfig,
        runner: Arc<dyn CommandRunner>,
        webhook: Arc<dyn WebhookSender>,
    ) -> Result<Self> {
        let git = GitRepo::from_config(runner.clone(), config)?;
        Ok(Self {
            builder: BuildDriver::from_config(git.clone(), runner.clone(), config),
            uploader: ArtifactUploader::from_config(runner, config),
            notifier: Notifier::from_config(git.clone(), webhook, config),
            git,
            max_version_len: config.max_version_len,
        })
    }

    /// Process every enumerated branch once.
    ///
    /// Enumeration failures abort the run. Failures while processing a branch
    /// are recorded in the report and leave that branch's state entry as it was.
    pub async fn run(&self, store: &mut StateStore, options: RunOptions) -> Result<RunReport> {
        let heads = self.git.enumerate().await?;
        let mut report = RunReport {
            dry_run: options.dry_run,
            ..RunReport::default()
        };

        for BranchHead { branch, commit } in heads {
            let outcome = self.process_branch(store, &branch, &commit, options).await;
            report.push(branch, commit, outcome);
        }

        info!(
            built = report.built_count(),
            skipped = report.skipped_count(),
            failed = report.failed_count(),
            "Run finished"
        );
        Ok(report)
    }

    /// Process a single branch whose head is `commit`.
    pub async fn process_branch(
        &self,
        store: &mut StateStore,
        branch: &str,
        commit: &str,
        options: RunOptions,
    ) -> BranchOutcome {
        let previous_commit = store.last_commit(branch).map(str::to_string);

        if previous_commit.as_deref() == Some(commit) {
            info!(branch = %branch, commit = %commit, "Skipping branch: head already built");
            return BranchOutcome::Skipped;
        }

        info!(
            branch = %branch,
            commit = %commit,
            previous = previous_commit.as_deref().unwrap_or("none"),
            "Building branch: head differs from last build"
        );

        match self
            .build_branch(store, branch, commit, previous_commit, options)
            .await
        {
            Ok(result) => BranchOutcome::Built(result),
            Err(StageError { stage, error }) => {
                warn!(branch = %branch, commit = %commit, stage = %stage, error = %error, "Branch abandoned");
                BranchOutcome::Failed {
                    stage,
                    error: error.to_string(),
                }
            }
        }
    }

    async fn build_branch(
        &self,
        store: &mut StateStore,
        branch: &str,
        commit: &str,
        previous_commit: Option<String>,
        options: RunOptions,
    ) -> std::result::Result<BuildResult, StageError> {
        let version = derive_version(branch, commit, self.max_version_len);

        self.builder
            .build(branch, &version, options.dry_run)
            .await
            .at(Stage::Build)?;

        let artifacts = self
            .uploader
            .upload(&version, options.dry_run)
            .await
            .at(Stage::Upload)?;

        let result = BuildResult {
            branch: branch.to_string(),
            commit: commit.to_string(),
            version,
            artifacts,
            previous_commit,
        };

        if options.notify {
            self.notifier.notify(&result).await.at(Stage::Notify)?;
        }

        if !options.dry_run {
            let replaced = store.set(branch, commit, result.links());
            if let Err(e) = store.save() {
                store.restore(branch, replaced);
                return Err(StageError {
                    stage: Stage::Persist,
                    error: e.into(),
                });
            }
        }

        Ok(result)
    }
}
