//! Off-site copies kept in another directory, typically a mounted share.

use async_trait::async_trait;
use rotabak_core::capability::{ObjectStore, RemoteTransport, StoredObject};
use rotabak_core::fs::store::{list_directory, remove_if_present};
use rotabak_core::{CoreError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryRemoteOptions {
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DirectoryRemote {
    dir: PathBuf,
}

impl DirectoryRemote {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ObjectStore for DirectoryRemote {
    fn describe(&self) -> String {
        format!("remote directory {}", self.dir.display())
    }

    /// A missing directory is an error: the share is probably not mounted.
    async fn list_objects(&self) -> Result<Vec<StoredObject>> {
        if !tokio::fs::try_exists(&self.dir).await? {
            return Err(CoreError::Transport(format!(
                "remote directory {} does not exist",
                self.dir.display()
            )));
        }
        let dir = self.dir.clone();
        let mut objects = tokio::task::spawn_blocking(move || list_directory(&dir)).await??;
        objects.retain(|o| !is_in_flight(&o.name));
        Ok(objects)
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        remove_if_present(&self.dir.join(name)).await
    }
}

#[async_trait]
impl RemoteTransport for DirectoryRemote {
    /// Copy under a temporary name, then rename into place.
    async fn upload(&self, local_path: &Path) -> Result<()> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CoreError::Transport(format!("invalid upload path {}", local_path.display())))?;

        let staging = self.dir.join(in_flight_name(name));
        let destination = self.dir.join(name);
        debug!("Copying {} to {}", local_path.display(), destination.display());

        if let Err(e) = tokio::fs::copy(local_path, &staging).await {
            remove_if_present(&staging).await?;
            return Err(CoreError::Transport(format!("copy of {} failed: {}", name, e)));
        }
        tokio::fs::rename(&staging, &destination).await?;
        Ok(())
    }
}

const IN_FLIGHT_PREFIX: &str = ".rotabak-upload.";

fn in_flight_name(name: &str) -> String {
    format!("{}{}", IN_FLIGHT_PREFIX, name)
}

fn is_in_flight(name: &str) -> bool {
    name.starts_with(IN_FLIGHT_PREFIX)
}
