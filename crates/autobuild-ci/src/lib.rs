//! autobuild CI - continuous packaging of release branches
//!
//! Provides the run orchestrator that:
//! - Enumerates release branches (plus always-built ones) and their heads
//! - Builds and uploads installers for heads not built before
//! - Announces each build on a chat webhook
//! - Records the build in the state store

pub mod builder;
pub mod config;
pub mod error;
pub mod fakes;
pub mod git;
pub mod notify;
pub mod pipeline;
pub mod result;
pub mod runner;
pub mod telemetry;
pub mod upload;
pub mod version;

// Re-export key types
pub use builder::BuildDriver;
pub use config::{AutobuildConfig, WebhookTarget};
pub use error::{AutobuildError, CommandError, ConfigError, NotifyError, Result};
pub use git::{BranchHead, GitRepo};
pub use notify::{Attachment, Notifier, SlackWebhook, WebhookPayload, WebhookSender};
pub use pipeline::{Autobuilder, RunOptions};
pub use result::{BranchOutcome, BranchReport, BuildResult, RunReport, Stage};
pub use runner::{CommandRunner, CommandSpec, ProcessRunner};
pub use telemetry::init_tracing;
pub use upload::{ArtifactUploader, UploadedArtifact};
pub use version::derive_version;
