//! Filesystem archives written by `fsarchiver savefs`.
//!
//! Each filesystem can be read from an LVM snapshot; every snapshot taken
//! is removed again before the archive is kept, whether or not the archive
//! was written.

use async_trait::async_trait;
use chrono::Utc;
use rotabak_core::capability::{ArtifactTarget, BackupProducer};
use rotabak_core::fs::PartialFile;
use rotabak_core::{CoreError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use super::command::{require_program, run_captured, CommandSpec};
use super::lvm::{default_snapshot_size, LvmSnapshot, SnapshotType};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsaFilesystem {
    pub block_device: PathBuf,

    #[serde(default)]
    pub snapshot_type: Option<SnapshotType>,

    #[serde(default = "default_snapshot_size")]
    pub snapshot_size: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FsArchiverOptions {
    pub filesystems: Vec<FsaFilesystem>,

    #[serde(default)]
    pub excludes: Vec<String>,

    /// Archive label (`-L`)
    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub command_opts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FsArchiverProducer {
    options: FsArchiverOptions,
}

impl FsArchiverProducer {
    pub fn new(options: FsArchiverOptions) -> Self {
        Self { options }
    }

    fn savefs_command(&self, fsarchiver: PathBuf, archive: &Path, devices: &[PathBuf]) -> CommandSpec {
        let options = &self.options;
        let mut command = CommandSpec::new(fsarchiver)
            .arg("savefs")
            .args(options.excludes.iter().map(|e| format!("--exclude={}", e)));
        if let Some(description) = &options.description {
            command = command.arg("-L").arg(description.as_str());
        }
        command
            .args(options.command_opts.iter().cloned())
            .arg(archive.to_string_lossy())
            .args(devices.iter().map(|d| d.display().to_string()))
    }

    fn produce_blocking(&self, target: &ArtifactTarget) -> Result<String> {
        let fsarchiver = require_program("fsarchiver")?;

        let name = format!("{}.fsa", target.stem);
        let output = PartialFile::create(target.path_for(&name))?;

        // Declared after `output` so the snapshots are released first
        let prefix = Utc::now().timestamp().to_string();
        let mut snapshots = Vec::new();
        let mut devices = Vec::with_capacity(self.options.filesystems.len());
        for filesystem in &self.options.filesystems {
            match filesystem.snapshot_type {
                Some(SnapshotType::Lvm) => {
                    let snapshot =
                        LvmSnapshot::create(&filesystem.block_device, &prefix, &filesystem.snapshot_size)?;
                    devices.push(snapshot.device().to_path_buf());
                    snapshots.push(snapshot);
                }
                None => devices.push(filesystem.block_device.clone()),
            }
        }

        let savefs = self.savefs_command(fsarchiver, output.path(), &devices);
        info!("Running fsarchiver: {}", savefs);
        let result = run_captured(&savefs);
        drop(snapshots);
        result.map_err(|e| CoreError::Backup(format!("fsarchiver failed: {}", e)))?;
        output.commit();

        Ok(name)
    }
}

#[async_trait]
impl BackupProducer for FsArchiverProducer {
    fn kind(&self) -> &'static str {
        "fsarchiver"
    }

    async fn produce(&self, target: &ArtifactTarget) -> Result<String> {
        let producer = self.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || producer.produce_blocking(&target)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_and_command() {
        let options: FsArchiverOptions = toml::from_str(
            r#"
            excludes = ["/var/cache/*", "*.iso"]
            description = "root and home"
            command_opts = ["-j2", "-z3"]

            [[filesystems]]
            block_device = "/dev/vg0/root"
            snapshot_type = "lvm"

            [[filesystems]]
            block_device = "/dev/sda1"
            "#,
        )
        .unwrap();
        assert_eq!(options.filesystems.len(), 2);
        assert_eq!(options.filesystems[0].snapshot_type, Some(SnapshotType::Lvm));
        assert_eq!(options.filesystems[0].snapshot_size, "1024M");
        assert_eq!(options.filesystems[1].snapshot_type, None);

        let producer = FsArchiverProducer::new(options);
        let command = producer.savefs_command(
            PathBuf::from("/usr/sbin/fsarchiver"),
            Path::new("/srv/sys/sys-20240610.fsa"),
            &[PathBuf::from("/dev/vg0/snap_1_root"), PathBuf::from("/dev/sda1")],
        );
        assert_eq!(
            command.args,
            vec![
                "savefs",
                "--exclude=/var/cache/*",
                "--exclude=*.iso",
                "-L",
                "root and home",
                "-j2",
                "-z3",
                "/srv/sys/sys-20240610.fsa",
                "/dev/vg0/snap_1_root",
                "/dev/sda1"
            ]
        );
    }

    #[test]
    fn test_unknown_snapshot_type_is_rejected() {
        let result: std::result::Result<FsArchiverOptions, _> = toml::from_str(
            r#"
            [[filesystems]]
            block_device = "/dev/vg0/root"
            snapshot_type = "zfs"
            "#,
        );
        assert!(result.is_err());
    }
}
