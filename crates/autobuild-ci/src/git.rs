//! Git queries against the build working copy.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use crate::config::AutobuildConfig;
use crate::error::{AutobuildError, ConfigError, Result};
use crate::runner::{CommandRunner, CommandSpec};
use crate::version::local_branch;

/// `git log` format of one notification line: `<hash>: (<author>) <subject>, <age>`.
pub const LOG_FORMAT: &str = "%h: (%an) %s, %ar";

/// A branch together with the short hash of its head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchHead {
    pub branch: String,
    pub commit: String,
}

/// Git operations issued through a [`CommandRunner`] bound to the working copy.
#[derive(Clone)]
pub struct GitRepo {
    runner: Arc<dyn CommandRunner>,
    release_pattern: Regex,
    always_build: Vec<String>,
}

impl GitRepo {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        release_pattern: &str,
        always_build: Vec<String>,
    ) -> std::result::Result<Self, ConfigError> {
        let release_pattern = Regex::new(release_pattern).map_err(|e| ConfigError::Invalid {
            field: "release_pattern".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            runner,
            release_pattern,
            always_build,
        })
    }

    pub fn from_config(
        runner: Arc<dyn CommandRunner>,
        config: &AutobuildConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Self::new(runner, &config.release_pattern, config.always_build.clone())
    }

    async fn git<I, S>(&self, args: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = CommandSpec::new("git").args(args);
        Ok(self.runner.run(&spec).await?)
    }

    /// Refresh remote refs, pruning deleted branches.
    pub async fn fetch(&self) -> Result<()> {
        self.git(["fetch", "-p"]).await?;
        Ok(())
    }

    /// Remote branches whose local name matches the release pattern, in listing order.
    pub async fn release_branches(&self) -> Result<Vec<String>> {
        let lines = self.git(["branch", "-r"]).await?;
        Ok(self.filter_release_branches(&lines))
    }

    fn filter_release_branches(&self, lines: &[String]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.trim())
            // symbolic refs look like `origin/HEAD -> origin/master`
            .filter(|name| !name.is_empty() && !name.contains(' '))
            .filter(|name| self.release_pattern.is_match(local_branch(name)))
            .map(str::to_string)
            .collect()
    }

    /// Short hash of the head of `branch`.
    pub async fn resolve(&self, branch: &str) -> Result<String> {
        let lines = self.git(["show", "-s", "--format=%h", branch]).await?;
        let commit = lines
            .first()
            .map(|l| l.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AutobuildError::Git(format!("no commit resolved for {branch}")))?;
        Ok(commit)
    }

    /// Fetch, list release branches plus the always-built ones, and resolve each head.
    pub async fn enumerate(&self) -> Result<Vec<BranchHead>> {
        self.fetch().await?;

        let mut branches = self.release_branches().await?;
        for extra in &self.always_build {
            if !branches.contains(extra) {
                branches.push(extra.clone());
            }
        }
        info!(count = branches.len(), "Enumerated branches");

        let mut heads = Vec::with_capacity(branches.len());
        for branch in branches {
            let commit = self.resolve(&branch).await?;
            debug!(branch = %branch, commit = %commit, "Resolved branch head");
            heads.push(BranchHead { branch, commit });
        }
        Ok(heads)
    }

    /// Check out `branch` in the working copy.
    pub async fn checkout(&self, branch: &str) -> Result<()> {
        self.git(["checkout", branch]).await?;
        Ok(())
    }

    /// Log lines formatted with [`LOG_FORMAT`].
    ///
    /// With `since`, exactly the commits in `(since, commit]`; otherwise the
    /// `limit` most recent commits reachable from `commit`.
    pub async fn log(&self, commit: &str, since: Option<&str>, limit: usize) -> Result<Vec<String>> {
        let format = format!("--format={LOG_FORMAT}");
        let lines = match since {
            Some(since) => {
                self.git(["log".to_string(), format, format!("{since}..{commit}")])
                    .await?
            }
            None => {
                self.git([
                    "log".to_string(),
                    "-n".to_string(),
                    limit.to_string(),
                    format,
                    commit.to_string(),
                ])
                .await?
            }
        };
        Ok(lines.into_iter().filter(|l| !l.trim().is_empty()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedRunner;
    use crate::runner::ProcessRunner;
    use std::path::Path;
    use std::process::Command as StdCommand;

    fn repo_with(runner: Arc<ScriptedRunner>) -> GitRepo {
        let config = AutobuildConfig::default();
        GitRepo::from_config(runner, &config).unwrap()
    }

    #[test]
    fn filters_release_branches_in_listing_order() {
        let repo = repo_with(Arc::new(ScriptedRunner::new()));
        let lines: Vec<String> = [
            "  origin/HEAD -> origin/master",
            "  origin/devel",
            "  origin/release-2.0.1",
            "  origin/release-1.5.12",
            "  origin/release-2.0",
            "  origin/release-2.0.1-rc",
            "  origin/master",
            "  origin/release-3.4.5678901234",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        assert_eq!(
            repo.filter_release_branches(&lines),
            vec![
                "origin/release-2.0.1".to_string(),
                "origin/release-1.5.12".to_string(),
                "origin/release-3.4.5678901234".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn enumerate_appends_default_branches_and_resolves() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .respond(&["git", "branch", "-r"], &["  origin/master", "  origin/release-2.0.1"])
                .respond(&["git", "show", "-s", "--format=%h", "origin/release-2.0.1"], &["aaaaaaa"])
                .respond(&["git", "show", "-s", "--format=%h", "origin/master"], &["bbbbbbb"])
                .respond(&["git", "show", "-s", "--format=%h", "origin/devel"], &["ccccccc\n"]),
        );
        let repo = repo_with(runner.clone());

        let heads = repo.enumerate().await.unwrap();
        assert_eq!(
            heads,
            vec![
                BranchHead { branch: "origin/release-2.0.1".into(), commit: "aaaaaaa".into() },
                BranchHead { branch: "origin/master".into(), commit: "bbbbbbb".into() },
                BranchHead { branch: "origin/devel".into(), commit: "ccccccc".into() },
            ]
        );
        assert!(runner.commands()[0].starts_with(&["git", "fetch", "-p"]));
    }

    #[tokio::test]
    async fn empty_resolution_is_git_error() {
        let runner = Arc::new(ScriptedRunner::new());
        let repo = repo_with(runner);
        let err = repo.resolve("origin/devel").await.unwrap_err();
        assert!(matches!(err, AutobuildError::Git(_)));
    }

    #[tokio::test]
    async fn log_without_previous_requests_limit() {
        let runner = Arc::new(ScriptedRunner::new());
        let repo = repo_with(runner.clone());
        repo.log("abc1234", None, 10).await.unwrap();
        assert_eq!(
            runner.commands()[0].argv(),
            vec!["git", "log", "-n", "10", "--format=%h: (%an) %s, %ar", "abc1234"]
        );
    }

    #[tokio::test]
    async fn log_with_previous_requests_range() {
        let runner = Arc::new(ScriptedRunner::new());
        let repo = repo_with(runner.clone());
        repo.log("abc1234", Some("0000fff"), 10).await.unwrap();
        assert_eq!(
            runner.commands()[0].argv(),
            vec!["git", "log", "--format=%h: (%an) %s, %ar", "0000fff..abc1234"]
        );
    }

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    #[tokio::test]
    async fn log_range_against_real_repository() {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        for msg in ["first", "second", "third"] {
            run_git(dir.path(), &["commit", "--allow-empty", "-m", msg]);
        }

        let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new(dir.path()).with_echo(false));
        let repo = GitRepo::from_config(runner, &AutobuildConfig::default()).unwrap();

        let head = repo.resolve("HEAD").await.unwrap();
        let first = repo.resolve("HEAD~2").await.unwrap();

        let all = repo.log(&head, None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].contains("(test-user) third"));

        let since_first = repo.log(&head, Some(&first), 10).await.unwrap();
        assert_eq!(since_first.len(), 2);
        assert!(since_first.iter().all(|l| !l.contains(" first,")));
    }
}
