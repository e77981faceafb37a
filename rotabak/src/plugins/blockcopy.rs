//! Raw copies of block devices, optionally read from an LVM snapshot.

use async_trait::async_trait;
use chrono::Utc;
use rotabak_core::capability::{ArtifactTarget, BackupProducer};
use rotabak_core::fs::PartialFile;
use rotabak_core::Result;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use super::command::{run_pipeline, CompressProgram};
use super::lvm::{default_snapshot_size, LvmSnapshot, SnapshotType};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockCopyOptions {
    pub block_device: PathBuf,

    #[serde(default)]
    pub snapshot_type: Option<SnapshotType>,

    #[serde(default = "default_snapshot_size")]
    pub snapshot_size: String,

    #[serde(default)]
    pub compress_prog: CompressProgram,

    #[serde(default)]
    pub compress_opts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BlockCopyProducer {
    options: BlockCopyOptions,
}

impl BlockCopyProducer {
    pub fn new(options: BlockCopyOptions) -> Self {
        Self { options }
    }

    fn produce_blocking(&self, target: &ArtifactTarget) -> Result<String> {
        let options = &self.options;
        let compress = options.compress_prog.stage(&options.compress_opts)?;

        let name = format!("{}.img.{}", target.stem, options.compress_prog.extension());
        let output = PartialFile::create(target.path_for(&name))?;

        // Declared after `output` so the snapshot is released first
        let snapshot = match options.snapshot_type {
            Some(SnapshotType::Lvm) => {
                let prefix = Utc::now().timestamp().to_string();
                Some(LvmSnapshot::create(&options.block_device, &prefix, &options.snapshot_size)?)
            }
            None => None,
        };
        let source = snapshot
            .as_ref()
            .map(|s| s.device().to_path_buf())
            .unwrap_or_else(|| options.block_device.clone());

        info!("Copying {} through [{}] into {}", source.display(), compress, name);
        run_pipeline(&[compress], Some(&source), output.path())?;
        drop(snapshot);
        output.commit();

        Ok(name)
    }
}

#[async_trait]
impl BackupProducer for BlockCopyProducer {
    fn kind(&self) -> &'static str {
        "blockcopy"
    }

    async fn produce(&self, target: &ArtifactTarget) -> Result<String> {
        let producer = self.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || producer.produce_blocking(&target)).await?
    }
}
