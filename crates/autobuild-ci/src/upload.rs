//! Installer upload to the storage bucket.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{AutobuildConfig, VERSION_PLACEHOLDER};
use crate::error::Result;
use crate::runner::{CommandRunner, CommandSpec};

/// An installer as stored in the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedArtifact {
    /// File name produced by the build, e.g. `lantern_2.0.1_abc1234_amd64.deb`.
    pub file_name: String,

    /// Object key: `<timestamp>_<version>_<file_name>`.
    pub key: String,

    /// Public link to the object.
    pub url: String,
}

/// Copies each installer under a unique key, uploads it and removes the copy.
#[derive(Clone)]
pub struct ArtifactUploader {
    runner: Arc<dyn CommandRunner>,
    bucket: String,
    installers: Vec<String>,
    upload_program: String,
}

impl ArtifactUploader {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        bucket: impl Into<String>,
        installers: Vec<String>,
        upload_program: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            bucket: bucket.into(),
            installers,
            upload_program: upload_program.into(),
        }
    }

    pub fn from_config(runner: Arc<dyn CommandRunner>, config: &AutobuildConfig) -> Self {
        Self::new(
            runner,
            config.bucket.clone(),
            config.installers.clone(),
            config.upload_program.clone(),
        )
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Installer file names for `version`.
    pub fn installer_names(&self, version: &str) -> Vec<String> {
        self.installers
            .iter()
            .map(|template| template.replace(VERSION_PLACEHOLDER, version))
            .collect()
    }

    /// Public link of `key` in the bucket.
    pub fn link(&self, key: &str) -> String {
        format!("http://{}.s3.amazonaws.com/{}", self.bucket, key)
    }

    /// Upload the installers of `version`, keyed by the current time.
    pub async fn upload(&self, version: &str, dry_run: bool) -> Result<Vec<UploadedArtifact>> {
        self.upload_at(version, Utc::now(), dry_run).await
    }

    /// Upload the installers of `version` keyed by `at`.
    ///
    /// In a dry run no command is issued but the same links are returned.
    /// The first failing command aborts the batch.
    pub async fn upload_at(
        &self,
        version: &str,
        at: DateTime<Utc>,
        dry_run: bool,
    ) -> Result<Vec<UploadedArtifact>> {
        let prefix = format!("{}_{}_", timestamp(at), version);
        let mut artifacts = Vec::with_capacity(self.installers.len());

        for file_name in self.installer_names(version) {
            let key = format!("{prefix}{file_name}");

            if !dry_run {
                info!(file = %file_name, bucket = %self.bucket, "Uploading installer");
                self.runner
                    .run(&CommandSpec::new("cp").args([file_name.as_str(), key.as_str()]))
                    .await?;
                self.runner
                    .run(&CommandSpec::new(self.upload_program.clone()).args([
                        "put".to_string(),
                        key.clone(),
                        "-P".to_string(),
                        format!("s3://{}", self.bucket),
                    ]))
                    .await?;
                self.runner
                    .run(&CommandSpec::new("rm").arg(key.as_str()))
                    .await?;
            }

            artifacts.push(UploadedArtifact {
                url: self.link(&key),
                file_name,
                key,
            });
        }

        Ok(artifacts)
    }
}

/// Upload timestamp: `YYYYmmddHHMMSS` in UTC, suffixed with the zone name.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%d%H%M%SUTC").to_string()
}
