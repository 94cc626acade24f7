//! Autobuild configuration.
//!
//! Every field has a default, so an absent config file means "build the
//! lantern installers from `../lantern` into the continuous-build bucket".
//! A TOML file only needs to name the fields it changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Placeholder in installer templates replaced by the version string.
pub const VERSION_PLACEHOLDER: &str = "VERSION";

/// Configuration for a whole autobuild run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutobuildConfig {
    /// Working copy that is checked out and built.
    pub repo_dir: PathBuf,

    /// Where the per-branch build state is kept.
    pub state_file: PathBuf,

    /// Regex matched against the local branch name (without `<remote>/`).
    pub release_pattern: String,

    /// Remote branches built on every run besides the release branches.
    pub always_build: Vec<String>,

    /// Packaging build command (first element is the executable).
    pub build_command: Vec<String>,

    /// Environment variable carrying the version string into the build.
    pub version_env: String,

    /// Longest release number kept in the version string.
    pub max_version_len: usize,

    /// Installer file names produced by the build; `VERSION` is substituted.
    pub installers: Vec<String>,

    /// Storage bucket the installers are uploaded to.
    pub bucket: String,

    /// Storage upload CLI, invoked as `<program> put <file> -P s3://<bucket>`.
    pub upload_program: String,

    /// Web URL of the repository, used for tree/commit links.
    pub repo_url: String,

    /// Host receiving the webhook POST.
    pub webhook_host: String,

    /// Environment variable holding the webhook path.
    pub webhook_path_env: String,

    /// Log entries shown when a branch has never been built.
    pub log_limit: usize,

    /// Per-command timeout in seconds; 0 waits forever.
    pub command_timeout_secs: u64,

    /// Echo command output to the terminal.
    pub echo_output: bool,
}

impl Default for AutobuildConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("../lantern"),
            state_file: PathBuf::from("./result.yml"),
            release_pattern: r"^release-[0-9]+\.[0-9]+\.[0-9]+$".to_string(),
            always_build: vec!["origin/master".to_string(), "origin/devel".to_string()],
            build_command: vec!["make".to_string(), "packages".to_string()],
            version_env: "VERSION".to_string(),
            max_version_len: 11,
            installers: vec![
                "lantern-installer.dmg".to_string(),
                "lantern-installer.exe".to_string(),
                "lantern_VERSION_amd64.deb".to_string(),
                "lantern_VERSION_i386.deb".to_string(),
            ],
            bucket: "lantern-continuous-build".to_string(),
            upload_program: "s3cmd".to_string(),
            repo_url: "https://github.com/getlantern/lantern".to_string(),
            webhook_host: "hooks.slack.com".to_string(),
            webhook_path_env: "SLACK_WEBHOOK_PATH".to_string(),
            log_limit: 10,
            command_timeout_secs: 0,
            echo_output: true,
        }
    }
}

impl AutobuildConfig {
    /// Load the config from a TOML file, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            None => Self::default(),
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&raw).map_err(|e| match e {
                    ConfigError::Parse { message, .. } => ConfigError::Parse {
                        path: path.to_path_buf(),
                        message,
                    },
                    other => other,
                })?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            message: e.to_string(),
        })
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_command.is_empty() {
            return Err(invalid("build_command", "must name an executable"));
        }
        if self.installers.is_empty() {
            return Err(invalid("installers", "at least one installer is required"));
        }
        if self.bucket.is_empty() {
            return Err(invalid("bucket", "must not be empty"));
        }
        if self.max_version_len == 0 {
            return Err(invalid("max_version_len", "must be greater than zero"));
        }
        if let Err(e) = regex::Regex::new(&self.release_pattern) {
            return Err(invalid("release_pattern", &e.to_string()));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Where notifications are posted: `https://<host><path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTarget {
    pub host: String,
    pub path: String,
}

impl WebhookTarget {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }

    /// Resolve the webhook path from the environment variable named in `config`.
    pub fn from_env(config: &AutobuildConfig) -> Result<Self, ConfigError> {
        let path = std::env::var(&config.webhook_path_env)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnv(config.webhook_path_env.clone()))?;
        Ok(Self::new(config.webhook_host.clone(), path))
    }

    /// Full URL of the webhook.
    pub fn url(&self) -> String {
        if self.path.starts_with('/') {
            format!("https://{}{}", self.host, self.path)
        } else {
            format!("https://{}/{}", self.host, self.path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AutobuildConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_version_len, 11);
        assert_eq!(config.log_limit, 10);
        assert_eq!(config.installers.len(), 4);
        assert_eq!(config.state_file, PathBuf::from("./result.yml"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AutobuildConfig::from_toml(
            r#"
            bucket = "nightly-builds"
            always_build = ["origin/main"]
            "#,
        )
        .unwrap();
        assert_eq!(config.bucket, "nightly-builds");
        assert_eq!(config.always_build, vec!["origin/main".to_string()]);
        assert_eq!(config.upload_program, "s3cmd");
    }

    #[test]
    fn load_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autobuild.toml");
        std::fs::write(&path, "bucket = [").unwrap();

        let err = AutobuildConfig::load(Some(&path)).unwrap_err();
        match err {
            ConfigError::Parse { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AutobuildConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn empty_build_command_rejected() {
        let config = AutobuildConfig {
            build_command: vec![],
            ..AutobuildConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "build_command"
        ));
    }

    #[test]
    fn bad_release_pattern_rejected() {
        let config = AutobuildConfig {
            release_pattern: "release-(".to_string(),
            ..AutobuildConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_webhook_env_is_config_error() {
        let config = AutobuildConfig {
            webhook_path_env: "AUTOBUILD_TEST_UNSET_WEBHOOK_PATH".to_string(),
            ..AutobuildConfig::default()
        };
        let err = WebhookTarget::from_env(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(name) if name == "AUTOBUILD_TEST_UNSET_WEBHOOK_PATH"));
    }

    #[test]
    fn webhook_url_joins_host_and_path() {
        let target = WebhookTarget::new("hooks.slack.com", "/services/T000/B000/XXX");
        assert_eq!(target.url(), "https://hooks.slack.com/services/T000/B000/XXX");

        let target = WebhookTarget::new("hooks.slack.com", "services/T000");
        assert_eq!(target.url(), "https://hooks.slack.com/services/T000");
    }
}
