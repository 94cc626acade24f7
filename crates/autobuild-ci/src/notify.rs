//! Chat notification of a finished build.
//!
//! The message is a single Slack-style attachment:
//! - title: branch tree link plus one link per installer
//! - text: commits since the previous build (or the latest ones), each hash
//!   linking to its commit page, then a link to the full branch history
//! - fallback: plain-text summary for clients that cannot render the above

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{AutobuildConfig, WebhookTarget};
use crate::error::{NotifyError, Result};
use crate::git::GitRepo;
use crate::result::BuildResult;
use crate::version::local_branch;

/// One message attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub fallback: String,
    pub title: String,
    pub text: String,
}

/// Body of the webhook POST.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub attachments: Vec<Attachment>,
}

/// Delivers payloads to the chat service.
#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Post `payload`; anything but HTTP 200 is an error.
    async fn send(&self, payload: &WebhookPayload) -> std::result::Result<(), NotifyError>;
}

/// Posts payloads as JSON over HTTPS.
pub struct SlackWebhook {
    client: reqwest::Client,
    target: WebhookTarget,
}

impl SlackWebhook {
    pub fn new(target: WebhookTarget) -> std::result::Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("autobuild/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, target })
    }

    pub fn target(&self) -> &WebhookTarget {
        &self.target
    }
}

#[async_trait]
impl WebhookSender for SlackWebhook {
    async fn send(&self, payload: &WebhookPayload) -> std::result::Result<(), NotifyError> {
        let response = self
            .client
            .post(self.target.url())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Formats and sends the message announcing a build.
#[derive(Clone)]
pub struct Notifier {
    git: GitRepo,
    sender: Arc<dyn WebhookSender>,
    repo_url: String,
    log_limit: usize,
}

impl Notifier {
    pub fn new(
        git: GitRepo,
        sender: Arc<dyn WebhookSender>,
        repo_url: impl Into<String>,
        log_limit: usize,
    ) -> Self {
        Self {
            git,
            sender,
            repo_url: repo_url.into().trim_end_matches('/').to_string(),
            log_limit,
        }
    }

    pub fn from_config(git: GitRepo, sender: Arc<dyn WebhookSender>, config: &AutobuildConfig) -> Self {
        Self::new(git, sender, config.repo_url.clone(), config.log_limit)
    }

    /// Announce `result`.
    ///
    /// When the range since the previous build cannot be listed (the previous
    /// commit is gone, e.g. after a force-push), the latest commits are shown
    /// instead.
    pub async fn notify(&self, result: &BuildResult) -> Result<()> {
        let mut since = result.previous_commit.as_deref();
        let log = match self.git.log(&result.commit, since, self.log_limit).await {
            Ok(log) => log,
            Err(e) if since.is_some() => {
                warn!(
                    branch = %result.branch,
                    previous = since.unwrap_or_default(),
                    error = %e,
                    "Cannot list changes since previous build, showing latest commits"
                );
                since = None;
                self.git.log(&result.commit, None, self.log_limit).await?
            }
            Err(e) => return Err(e),
        };

        let payload = self.compose_since(result, since, &log);
        self.sender.send(&payload).await?;
        info!(branch = %result.branch, commit = %result.commit, "Notification sent");
        Ok(())
    }

    /// Build the payload for `result` from its formatted log lines.
    pub fn compose(&self, result: &BuildResult, log: &[String]) -> WebhookPayload {
        self.compose_since(result, result.previous_commit.as_deref(), log)
    }

    /// Like [`Notifier::compose`], with `log` covering the commits after `since`.
    fn compose_since(
        &self,
        result: &BuildResult,
        since: Option<&str>,
        log: &[String],
    ) -> WebhookPayload {
        let branch = local_branch(&result.branch);

        let links: Vec<String> = result
            .artifacts
            .iter()
            .map(|a| format!("<{}|{}>", a.url, a.file_name))
            .collect();
        let title = format!(
            "Latest installers of <{}/tree/{branch}|{branch}>:\r\n{}\r\n",
            self.repo_url,
            links.join("\r\n"),
        );

        let mut entries: Vec<String> = log.iter().map(|line| self.link_commit(line)).collect();
        entries.push(format!("<{}/commits/{branch}|more...>\r\n", self.repo_url));

        let header = match since {
            Some(previous) => format!("Changes since {previous}:"),
            None => "Latest changes:".to_string(),
        };
        let text = format!("{header}\r\n{}", entries.join("\n"));

        WebhookPayload {
            attachments: vec![Attachment {
                fallback: format!("commits for {}", result.commit),
                title,
                text,
            }],
        }
    }

    /// `<hash>: rest` → `<commit-url|hash>: rest`.
    fn link_commit(&self, line: &str) -> String {
        match line.split_once(':') {
            Some((hash, rest)) if !hash.is_empty() && !hash.contains(' ') => {
                format!("<{}/commit/{hash}|{hash}>:{rest}", self.repo_url)
            }
            _ => line.to_string(),
        }
    }
}
