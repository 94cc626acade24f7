//! Packaging build of a checked-out branch.

use std::sync::Arc;

use tracing::info;

use crate::config::AutobuildConfig;
use crate::error::Result;
use crate::git::GitRepo;
use crate::runner::{CommandRunner, CommandSpec};

/// Checks out a branch and runs the packaging build for a version.
#[derive(Clone)]
pub struct BuildDriver {
    git: GitRepo,
    runner: Arc<dyn CommandRunner>,
    build_command: Vec<String>,
    version_env: String,
}

impl BuildDriver {
    pub fn new(
        git: GitRepo,
        runner: Arc<dyn CommandRunner>,
        build_command: Vec<String>,
        version_env: impl Into<String>,
    ) -> Self {
        Self {
            git,
            runner,
            build_command,
            version_env: version_env.into(),
        }
    }

    pub fn from_config(git: GitRepo, runner: Arc<dyn CommandRunner>, config: &AutobuildConfig) -> Self {
        Self::new(
            git,
            runner,
            config.build_command.clone(),
            config.version_env.clone(),
        )
    }

    /// The build invocation for `version`.
    pub fn build_command(&self, version: &str) -> CommandSpec {
        CommandSpec::from_argv(&self.build_command).env(self.version_env.clone(), version)
    }

    /// Check out `branch`, then build `version` unless `dry_run`.
    ///
    /// A failed build leaves the working copy as the failing command left it.
    pub async fn build(&self, branch: &str, version: &str, dry_run: bool) -> Result<()> {
        self.git.checkout(branch).await?;

        if dry_run {
            info!(branch = %branch, version = %version, "Dry run, skipping build");
            return Ok(());
        }

        info!(branch = %branch, version = %version, "Building packages");
        self.runner.run(&self.build_command(version)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AutobuildError, CommandError};
    use crate::fakes::ScriptedRunner;

    fn driver(runner: Arc<ScriptedRunner>) -> BuildDriver {
        let config = AutobuildConfig::default();
        let git = GitRepo::from_config(runner.clone(), &config).unwrap();
        BuildDriver::from_config(git, runner, &config)
    }

    #[tokio::test]
    async fn build_checks_out_then_runs_make_with_version() {
        let runner = Arc::new(ScriptedRunner::new());
        driver(runner.clone())
            .build("origin/release-2.0.1", "2.0.1_abc1234", false)
            .await
            .unwrap();

        let commands = runner.commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].argv(), vec!["git", "checkout", "origin/release-2.0.1"]);
        assert_eq!(commands[1].argv(), vec!["make", "packages"]);
        assert_eq!(
            commands[1].envs,
            vec![("VERSION".to_string(), "2.0.1_abc1234".to_string())]
        );
    }

    #[tokio::test]
    async fn dry_run_only_checks_out() {
        let runner = Arc::new(ScriptedRunner::new());
        driver(runner.clone())
            .build("origin/devel", "devel_abc1234", true)
            .await
            .unwrap();

        let commands = runner.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with(&["git", "checkout"]));
    }

    #[tokio::test]
    async fn failed_checkout_skips_build() {
        let runner = Arc::new(ScriptedRunner::new().fail_on(&["git", "checkout"]));
        let err = driver(runner.clone())
            .build("origin/devel", "devel_abc1234", false)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AutobuildError::Command(CommandError::NonZeroExit { .. })
        ));
        assert_eq!(runner.commands().len(), 1);
    }
}
