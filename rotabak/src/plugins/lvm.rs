//! LVM snapshots of logical volumes, held for the duration of a block copy.

use rotabak_core::{CoreError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use super::command::{require_program, run_captured, CommandSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotType {
    Lvm,
}

pub fn default_snapshot_size() -> String {
    "1024M".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalVolume {
    pub volume_group: String,
    pub name: String,
}

impl LogicalVolume {
    /// Parse `/dev/<vg>/<lv>`.
    pub fn from_device(device: &Path) -> Result<Self> {
        let text = device.to_string_lossy();
        let parts: Vec<&str> = text
            .strip_prefix("/dev/")
            .map(|rest| rest.split('/').collect())
            .unwrap_or_default();

        match parts.as_slice() {
            [vg, lv] if is_lvm_name(vg) && is_lvm_name(lv) => Ok(Self {
                volume_group: vg.to_string(),
                name: lv.to_string(),
            }),
            _ => Err(CoreError::Backup(format!(
                "cannot parse LVM logical volume name: [{}]",
                text
            ))),
        }
    }
}

fn is_lvm_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// `<digits>M` or `<digits>G`, as accepted by `lvcreate -L`.
pub fn is_valid_snapshot_size(size: &str) -> bool {
    match size.strip_suffix('M').or_else(|| size.strip_suffix('G')) {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// A live snapshot; removed with `lvremove -f` when dropped.
#[derive(Debug)]
pub struct LvmSnapshot {
    device: PathBuf,
    lvremove: PathBuf,
}

impl LvmSnapshot {
    pub fn create(origin: &Path, prefix: &str, size: &str) -> Result<Self> {
        let volume = LogicalVolume::from_device(origin)?;
        let lvcreate = require_program("lvcreate")?;
        let lvremove = require_program("lvremove")?;

        let snapshot_name = format!("snap_{}_{}", prefix, volume.name);
        let create = CommandSpec::new(lvcreate)
            .args(["-s", "-L", size, "-n", snapshot_name.as_str()])
            .arg(origin.to_string_lossy());
        run_captured(&create)
            .map_err(|e| CoreError::Backup(format!("creation of LVM snapshot failed: {}", e)))?;

        let device = PathBuf::from(format!("/dev/{}/{}", volume.volume_group, snapshot_name));
        info!("Created LVM snapshot {}", device.display());
        Ok(Self { device, lvremove })
    }

    pub fn device(&self) -> &Path {
        &self.device
    }
}

impl Drop for LvmSnapshot {
    fn drop(&mut self) {
        let remove = CommandSpec::new(&self.lvremove)
            .arg("-f")
            .arg(self.device.to_string_lossy());
        match run_captured(&remove) {
            Ok(_) => info!("Removed LVM snapshot {}", self.device.display()),
            Err(e) => error!("Deletion of LVM snapshot {} failed: {}", self.device.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_logical_volume() {
        let volume = LogicalVolume::from_device(Path::new("/dev/vg0/root-fs_1.2")).unwrap();
        assert_eq!(volume.volume_group, "vg0");
        assert_eq!(volume.name, "root-fs_1.2");

        for bad in ["/dev/sda1", "/dev/vg0/lv/extra", "/mnt/vg0/lv", "/dev/vg 0/lv", "/dev//lv"] {
            assert!(LogicalVolume::from_device(Path::new(bad)).is_err(), "{}", bad);
        }
    }

    #[test]
    fn test_snapshot_size() {
        assert!(is_valid_snapshot_size("1024M"));
        assert!(is_valid_snapshot_size("5G"));
        assert!(!is_valid_snapshot_size("G"));
        assert!(!is_valid_snapshot_size("10T"));
        assert!(!is_valid_snapshot_size("1.5G"));
        assert!(!is_valid_snapshot_size("1024"));
    }
}
