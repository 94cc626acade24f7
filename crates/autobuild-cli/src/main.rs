//! autobuild - continuous packaging of release branches
//!
//! Each invocation performs one pass: fetch the build working copy, build
//! every release branch (plus the always-built ones) whose head moved since
//! its last build, upload the installers, announce them on the chat webhook
//! and record the build in the state file.
//!
//! Run it from cron or a loop; it exits once every branch was considered.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use autobuild_ci::{
    AutobuildConfig, Autobuilder, BranchOutcome, CommandRunner, ProcessRunner, RunOptions,
    RunReport, SlackWebhook, WebhookSender, WebhookTarget,
};
use autobuild_state::StateStore;

#[derive(Parser, Debug)]
#[command(name = "autobuild")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, upload and announce installers for changed release branches", long_about = None)]
struct Cli {
    /// Check out branches and compose notifications, but skip build, upload and state updates
    #[arg(long)]
    dry_run: bool,

    /// Do not post notifications
    #[arg(long)]
    no_notify: bool,

    /// TOML configuration file
    #[arg(short, long, env = "AUTOBUILD_CONFIG")]
    config: Option<PathBuf>,

    /// Working copy to build (overrides the config file)
    #[arg(long)]
    repo_dir: Option<PathBuf>,

    /// State file (overrides the config file)
    #[arg(long)]
    state_file: Option<PathBuf>,

    /// Upload bucket (overrides the config file)
    #[arg(long)]
    bucket: Option<String>,

    /// Exit with a failure status when any branch failed
    #[arg(long)]
    strict: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON run report
    #[arg(long, global = true)]
    json: bool,
}

impl Cli {
    fn options(&self) -> RunOptions {
        RunOptions {
            dry_run: self.dry_run,
            notify: !self.no_notify,
        }
    }

    /// Config file contents with command-line overrides applied.
    fn load_config(&self) -> Result<AutobuildConfig> {
        let mut config = AutobuildConfig::load(self.config.as_deref())
            .context("Failed to load autobuild configuration")?;
        if let Some(repo_dir) = &self.repo_dir {
            config.repo_dir = repo_dir.clone();
        }
        if let Some(state_file) = &self.state_file {
            config.state_file = state_file.clone();
        }
        if let Some(bucket) = &self.bucket {
            config.bucket = bucket.clone();
        }
        config.validate().context("Invalid autobuild configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    autobuild_ci::init_tracing(cli.json, level);

    let config = cli.load_config()?;
    let target = WebhookTarget::from_env(&config).context("Webhook is not configured")?;
    let webhook: Arc<dyn WebhookSender> =
        Arc::new(SlackWebhook::new(target).context("Failed to create webhook client")?);
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::from_config(&config));

    let mut store = StateStore::load(&config.state_file).with_context(|| {
        format!(
            "Failed to load build state from {}",
            config.state_file.display()
        )
    })?;

    info!(
        repo_dir = %config.repo_dir.display(),
        state_file = %config.state_file.display(),
        dry_run = cli.dry_run,
        "Starting autobuild run"
    );

    let autobuilder = Autobuilder::new(&config, runner, webhook)?;
    let report = autobuilder
        .run(&mut store, cli.options())
        .await
        .context("Failed to enumerate branches")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", render_summary(&report));
    }

    if fails_run(&report, cli.strict) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Branch failures only fail the process under `--strict`.
fn fails_run(report: &RunReport, strict: bool) -> bool {
    strict && !report.success()
}

/// Human-readable run summary. Dry-run builds are labelled as predictions.
fn render_summary(report: &RunReport) -> String {
    let mut out = String::new();
    for line in &report.branches {
        match &line.outcome {
            BranchOutcome::Skipped => {
                out.push_str(&format!("  {} {} unchanged\n", line.branch, line.commit));
            }
            BranchOutcome::Built(result) if report.dry_run => {
                out.push_str(&format!(
                    "~ {} {} ({}) predicted, nothing built\n",
                    line.branch, line.commit, result.version
                ));
                for link in result.links() {
                    out.push_str(&format!("    would upload {link}\n"));
                }
            }
            BranchOutcome::Built(result) => {
                out.push_str(&format!(
                    "✓ {} {} ({})\n",
                    line.branch, line.commit, result.version
                ));
                for link in result.links() {
                    out.push_str(&format!("    {link}\n"));
                }
            }
            BranchOutcome::Failed { stage, error } => {
                out.push_str(&format!(
                    "✗ {} {} failed at {stage}: {error}\n",
                    line.branch, line.commit
                ));
            }
        }
    }

    let built_label = if report.dry_run { "predicted" } else { "built" };
    out.push_str(&format!(
        "\n{} {built_label}, {} unchanged, {} failed",
        report.built_count(),
        report.skipped_count(),
        report.failed_count()
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use autobuild_ci::{BuildResult, Stage, UploadedArtifact};

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["autobuild"]).unwrap();
        assert!(!cli.dry_run);
        assert!(!cli.strict);
        assert_eq!(
            cli.options(),
            RunOptions {
                dry_run: false,
                notify: true
            }
        );
    }

    #[test]
    fn test_flags_map_to_run_options() {
        let cli = Cli::try_parse_from(["autobuild", "--dry-run", "--no-notify", "-v"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(
            cli.options(),
            RunOptions {
                dry_run: true,
                notify: false
            }
        );
    }

    #[test]
    fn test_overrides_apply_over_defaults() {
        let cli = Cli::try_parse_from([
            "autobuild",
            "--repo-dir",
            "/srv/lantern",
            "--state-file",
            "/var/lib/autobuild/result.yml",
            "--bucket",
            "nightly",
        ])
        .unwrap();

        let config = cli.load_config().unwrap();
        assert_eq!(config.repo_dir, PathBuf::from("/srv/lantern"));
        assert_eq!(
            config.state_file,
            PathBuf::from("/var/lib/autobuild/result.yml")
        );
        assert_eq!(config.bucket, "nightly");
        assert_eq!(config.max_version_len, 11);
    }

    #[test]
    fn test_config_file_then_flag_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autobuild.toml");
        std::fs::write(&path, "bucket = \"from-file\"\nlog_limit = 5\n").unwrap();

        let cli = Cli::try_parse_from([
            "autobuild",
            "--config",
            path.to_str().unwrap(),
            "--bucket",
            "from-flag",
        ])
        .unwrap();
        let config = cli.load_config().unwrap();
        assert_eq!(config.bucket, "from-flag");
        assert_eq!(config.log_limit, 5);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Cli::try_parse_from(["autobuild", "--build-all"]).is_err());
    }

    fn built_report(dry_run: bool) -> RunReport {
        let mut report = RunReport {
            dry_run,
            ..RunReport::default()
        };
        report.push(
            "origin/release-2.0.1".into(),
            "abc1234".into(),
            BranchOutcome::Built(BuildResult {
                branch: "origin/release-2.0.1".into(),
                commit: "abc1234".into(),
                version: "2.0.1_abc1234".into(),
                artifacts: vec![UploadedArtifact {
                    file_name: "lantern-installer.dmg".into(),
                    key: "20240309140507UTC_2.0.1_abc1234_lantern-installer.dmg".into(),
                    url: "http://b.s3.amazonaws.com/20240309140507UTC_2.0.1_abc1234_lantern-installer.dmg".into(),
                }],
                previous_commit: None,
            }),
        );
        report
    }

    #[test]
    fn test_summary_labels_dry_run_as_predicted() {
        let summary = render_summary(&built_report(true));
        assert!(summary.contains("~ origin/release-2.0.1 abc1234 (2.0.1_abc1234) predicted"));
        assert!(summary.contains("would upload http://b.s3.amazonaws.com/"));
        assert!(summary.ends_with("1 predicted, 0 unchanged, 0 failed"));
        assert!(!summary.contains('✓'));
    }

    #[test]
    fn test_summary_marks_real_builds() {
        let summary = render_summary(&built_report(false));
        assert!(summary.starts_with("✓ origin/release-2.0.1 abc1234 (2.0.1_abc1234)\n"));
        assert!(summary.ends_with("1 built, 0 unchanged, 0 failed"));
    }

    #[test]
    fn test_strict_fails_run() {
        let mut report = RunReport::default();
        report.push(
            "origin/devel".into(),
            "ccccccc".into(),
            BranchOutcome::Failed {
                stage: Stage::Build,
                error: "`make packages` exited with exit code 2".into(),
            },
        );
        assert!(fails_run(&report, true));
        assert!(!fails_run(&report, false));
        assert!(!fails_run(&RunReport::default(), true));
    }
}
