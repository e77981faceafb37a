//! Backups pulled from another host with `rsync` over ssh.
//!
//! The remote host is expected to have produced `<stem><extension>` in
//! `remote_path` already; this producer only fetches it.

use async_trait::async_trait;
use rotabak_core::capability::{ArtifactTarget, BackupProducer};
use rotabak_core::fs::PartialFile;
use rotabak_core::{CoreError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use super::command::{require_program, run_captured, CommandSpec};

const SSH_COMMAND: &str = "ssh -o StrictHostKeyChecking=no -o NumberOfPasswordPrompts=0";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RsyncGetOptions {
    pub remote_host: String,
    pub remote_user: String,
    pub remote_path: String,

    /// Suffix of the file to fetch, including its leading dot
    pub extension: String,

    #[serde(default)]
    pub command_opts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RsyncGetProducer {
    options: RsyncGetOptions,
}

impl RsyncGetProducer {
    pub fn new(options: RsyncGetOptions) -> Self {
        Self { options }
    }

    fn fetch_command(&self, rsync: PathBuf, name: &str, destination: &Path) -> CommandSpec {
        let options = &self.options;
        let source = format!(
            "{}@{}:{}/{}",
            options.remote_user,
            options.remote_host,
            options.remote_path.trim_end_matches('/'),
            name
        );
        CommandSpec::new(rsync)
            .args(["-e", SSH_COMMAND])
            .args(options.command_opts.iter().cloned())
            .arg(source)
            .arg(destination.to_string_lossy())
    }

    fn produce_blocking(&self, target: &ArtifactTarget) -> Result<String> {
        let rsync = require_program("rsync")?;

        let name = format!("{}{}", target.stem, self.options.extension);
        let output = PartialFile::create(target.path_for(&name))?;
        let fetch = self.fetch_command(rsync, &name, output.path());
        info!("Running: {}", fetch);
        run_captured(&fetch).map_err(|e| CoreError::Backup(format!("rsync failed: {}", e)))?;
        output.commit();

        Ok(name)
    }
}

#[async_trait]
impl BackupProducer for RsyncGetProducer {
    fn kind(&self) -> &'static str {
        "rsyncget"
    }

    async fn produce(&self, target: &ArtifactTarget) -> Result<String> {
        let producer = self.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || producer.produce_blocking(&target)).await?
    }
}
