//! Directory-backed local artifact store.
//!
//! Artifacts of an entry live flat in one directory. Listings are ordered by
//! modification time so older backups come first.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;
use walkdir::WalkDir;

use crate::capability::{LocalStore, ObjectStore, StoredObject};
use crate::checksum::{self, ChecksumKind};
use crate::fs::permissions::FilePermissions;
use crate::Result;

#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

/// List the regular files directly inside `dir`, oldest first.
pub fn list_directory(dir: &Path) -> Result<Vec<StoredObject>> {
    let mut files: Vec<(SystemTime, StoredObject)> = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = entry.metadata()?;
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let name = entry.file_name().to_string_lossy().into_owned();
        files.push((modified, StoredObject::new(name, metadata.len())));
    }

    files.sort_by(|(a_time, a), (b_time, b)| a_time.cmp(b_time).then_with(|| a.name.cmp(&b.name)));
    Ok(files.into_iter().map(|(_, object)| object).collect())
}

/// Remove a file, treating an already missing file as success.
pub async fn remove_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Already absent: {}", path.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    fn describe(&self) -> String {
        self.dir.display().to_string()
    }

    async fn list_objects(&self) -> Result<Vec<StoredObject>> {
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || list_directory(&dir)).await?
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        remove_if_present(&self.dir.join(name)).await
    }
}

#[async_trait]
impl LocalStore for DirectoryStore {
    async fn prepare(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    fn root(&self) -> &Path {
        &self.dir
    }

    async fn write_checksums(&self, artifact: &str, kinds: &[ChecksumKind]) -> Result<Vec<String>> {
        let dir = self.dir.clone();
        let artifact = artifact.to_string();
        let kinds = kinds.to_vec();
        tokio::task::spawn_blocking(move || {
            kinds
                .into_iter()
                .map(|kind| checksum::write_sidecar(&dir, &artifact, kind))
                .collect::<Result<Vec<_>>>()
        })
        .await?
    }

    async fn apply_permissions(&self, files: &[String], permissions: &FilePermissions) -> Result<()> {
        let paths: Vec<PathBuf> = files.iter().map(|f| self.dir.join(f)).collect();
        let permissions = permissions.clone();
        tokio::task::spawn_blocking(move || {
            paths
                .iter()
                .try_for_each(|path| permissions.apply_to_path(path))
        })
        .await?
    }
}
