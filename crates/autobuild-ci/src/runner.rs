//! External command execution.
//!
//! Commands are argument vectors, never shell strings. [`ProcessRunner`] runs
//! them in one fixed working directory; tests substitute
//! [`crate::fakes::ScriptedRunner`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::AutobuildConfig;
use crate::error::CommandError;

/// A command to execute: program, arguments and extra environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    /// Arguments passed verbatim.
    pub args: Vec<String>,

    /// Environment variables added on top of the inherited environment.
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Build a spec from an argv list (first element is the executable).
    pub fn from_argv(argv: &[String]) -> Self {
        match argv.split_first() {
            Some((program, args)) => Self::new(program.clone()).args(args.iter().cloned()),
            None => Self::default(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Whether the argv begins with `prefix`.
    pub fn starts_with(&self, prefix: &[&str]) -> bool {
        let argv = self.argv();
        argv.len() >= prefix.len() && argv.iter().zip(prefix).all(|(a, p)| a == p)
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.envs {
            write!(f, "{key}={} ", quote(value))?;
        }
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(s: &str) -> String {
    if !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Runs external commands and returns their stdout lines.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion.
    ///
    /// Any non-zero exit is an error; there is no partial result.
    async fn run(&self, command: &CommandSpec) -> Result<Vec<String>, CommandError>;
}

/// Runs commands as child processes of this one.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    work_dir: PathBuf,
    timeout_secs: u64,
    echo: bool,
}

impl ProcessRunner {
    /// Runner executing in `work_dir`, without timeout, echoing output.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout_secs: 0,
            echo: true,
        }
    }

    pub fn from_config(config: &AutobuildConfig) -> Self {
        Self::new(&config.repo_dir)
            .with_timeout(config.command_timeout_secs)
            .with_echo(config.echo_output)
    }

    /// Kill commands running longer than `secs` seconds (0 disables).
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Whether captured stdout/stderr are echoed to this process's stderr.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, command: &CommandSpec) -> Result<Vec<String>, CommandError> {
        if command.program.is_empty() {
            return Err(CommandError::Empty);
        }

        let rendered = command.to_string();
        info!("> {}", rendered);

        let child = Command::new(&command.program)
            .args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let waited = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| CommandError::Timeout {
                command: rendered.clone(),
                secs: self.timeout_secs,
            })?
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|source| CommandError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        // Echo goes to stderr; stdout belongs to the run report.
        if self.echo {
            if !stdout.is_empty() {
                eprintln!("{}", stdout.trim_end());
            }
            if !stderr.is_empty() {
                eprintln!("{}", stderr.trim_end());
            }
        }

        if !output.status.success() {
            return Err(CommandError::NonZeroExit {
                command: rendered,
                code: output.status.code(),
                stderr,
            });
        }

        let lines: Vec<String> = stdout.lines().map(str::to_string).collect();
        debug!(command = %rendered, lines = lines.len(), "Command succeeded");
        Ok(lines)
    }
}
