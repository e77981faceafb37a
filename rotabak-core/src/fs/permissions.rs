//! Ownership and mode of produced artifacts.

use nix::unistd::{chown, Gid, Group, Uid, User};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{CoreError, Result};

/// Ownership and permission bits applied to new artifacts and their sidecars
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePermissions {
    /// User name of the new owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Group name of the new group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Unix mode bits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

impl FilePermissions {
    pub fn is_empty(&self) -> bool {
        self.owner.is_none() && self.group.is_none() && self.mode.is_none()
    }

    /// Apply these settings to a file
    pub fn apply_to_path(&self, path: &Path) -> Result<()> {
        if self.owner.is_some() || self.group.is_some() {
            let uid = self.owner.as_deref().map(lookup_user).transpose()?;
            let gid = self.group.as_deref().map(lookup_group).transpose()?;
            chown(path, uid, gid).map_err(|e| {
                CoreError::Ownership(format!("chown {}: {}", path.display(), e))
            })?;
        }

        if let Some(mode) = self.mode {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
        }

        Ok(())
    }
}

fn lookup_user(name: &str) -> Result<Uid> {
    match User::from_name(name) {
        Ok(Some(user)) => Ok(user.uid),
        Ok(None) => Err(CoreError::Ownership(format!("unknown user '{}'", name))),
        Err(e) => Err(CoreError::Ownership(format!("lookup of user '{}': {}", name, e))),
    }
}

fn lookup_group(name: &str) -> Result<Gid> {
    match Group::from_name(name) {
        Ok(Some(group)) => Ok(group.gid),
        Ok(None) => Err(CoreError::Ownership(format!("unknown group '{}'", name))),
        Err(e) => Err(CoreError::Ownership(format!("lookup of group '{}': {}", name, e))),
    }
}
