//! In-memory fakes for the command and webhook seams (testing only)
//!
//! `ScriptedRunner` records every command and answers from a script;
//! `MemoryWebhook` records every payload. Neither touches the system.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CommandError, NotifyError};
use crate::notify::{WebhookPayload, WebhookSender};
use crate::runner::{CommandRunner, CommandSpec};

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Lines(Vec<String>),
    Fail(i32),
}

#[derive(Debug, Clone)]
struct Rule {
    prefix: Vec<String>,
    reply: Reply,
}

impl Rule {
    fn matches(&self, command: &CommandSpec) -> bool {
        let prefix: Vec<&str> = self.prefix.iter().map(String::as_str).collect();
        command.starts_with(&prefix)
    }
}

/// Command runner that replies from a script instead of spawning processes.
///
/// Rules are matched by argv prefix; the first matching rule wins and
/// unmatched commands succeed with no output.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    log: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands starting with `prefix` succeed and print `lines`.
    pub fn respond(mut self, prefix: &[&str], lines: &[&str]) -> Self {
        self.rules.push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            reply: Reply::Lines(lines.iter().map(|s| s.to_string()).collect()),
        });
        self
    }

    /// Commands starting with `prefix` exit with status 1.
    pub fn fail_on(self, prefix: &[&str]) -> Self {
        self.fail_with(prefix, 1)
    }

    /// Commands starting with `prefix` exit with `code`.
    pub fn fail_with(mut self, prefix: &[&str], code: i32) -> Self {
        self.rules.push(Rule {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            reply: Reply::Fail(code),
        });
        self
    }

    /// Every command run so far, in order.
    pub fn commands(&self) -> Vec<CommandSpec> {
        self.log.lock().unwrap().clone()
    }

    /// Commands run so far whose argv starts with `prefix`.
    pub fn commands_starting_with(&self, prefix: &[&str]) -> Vec<CommandSpec> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command: &CommandSpec) -> Result<Vec<String>, CommandError> {
        self.log.lock().unwrap().push(command.clone());

        match self.rules.iter().find(|r| r.matches(command)).map(|r| &r.reply) {
            Some(Reply::Lines(lines)) => Ok(lines.clone()),
            Some(Reply::Fail(code)) => Err(CommandError::NonZeroExit {
                command: command.to_string(),
                code: Some(*code),
                stderr: "scripted failure".to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryWebhook
// ---------------------------------------------------------------------------

/// Webhook that stores payloads and answers with a fixed status.
#[derive(Debug)]
pub struct MemoryWebhook {
    status: u16,
    sent: Mutex<Vec<WebhookPayload>>,
}

impl Default for MemoryWebhook {
    fn default() -> Self {
        Self {
            status: 200,
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryWebhook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every post with `status`.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Payloads posted so far (including rejected ones).
    pub fn sent(&self) -> Vec<WebhookPayload> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for MemoryWebhook {
    async fn send(&self, payload: &WebhookPayload) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(payload.clone());
        if self.status == 200 {
            Ok(())
        } else {
            Err(NotifyError::Status(self.status))
        }
    }
}
