//! `tar` archives piped through a compressor.

use async_trait::async_trait;
use rotabak_core::capability::{ArtifactTarget, BackupProducer};
use rotabak_core::fs::PartialFile;
use rotabak_core::Result;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use super::command::{require_program, run_pipeline, CommandSpec, CompressProgram};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TarballOptions {
    pub includes: Vec<PathBuf>,

    #[serde(default)]
    pub excludes: Vec<String>,

    /// Extra `tar` arguments; options must precede the includes
    #[serde(default)]
    pub command_opts: Vec<String>,

    #[serde(default)]
    pub compress_prog: CompressProgram,

    #[serde(default)]
    pub compress_opts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TarballProducer {
    options: TarballOptions,
}

impl TarballProducer {
    pub fn new(options: TarballOptions) -> Self {
        Self { options }
    }

    fn archive_command(&self, tar: PathBuf) -> CommandSpec {
        let options = &self.options;
        CommandSpec::new(tar)
            .args(["--create", "--file=-"])
            .args(options.command_opts.iter().cloned())
            .args(options.excludes.iter().map(|e| format!("--exclude={}", e)))
            .args(options.includes.iter().map(|p| p.display().to_string()))
    }

    fn produce_blocking(&self, target: &ArtifactTarget) -> Result<String> {
        let archive = self.archive_command(require_program("tar")?);
        let compress = self.options.compress_prog.stage(&self.options.compress_opts)?;

        let name = format!("{}.tar.{}", target.stem, self.options.compress_prog.extension());
        let output = PartialFile::create(target.path_for(&name))?;
        info!("Running pipeline: [{}] | [{}]", archive, compress);
        run_pipeline(&[archive, compress], None, output.path())?;
        output.commit();

        Ok(name)
    }
}

#[async_trait]
impl BackupProducer for TarballProducer {
    fn kind(&self) -> &'static str {
        "tarball"
    }

    async fn produce(&self, target: &ArtifactTarget) -> Result<String> {
        let producer = self.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || producer.produce_blocking(&target)).await?
    }
}
