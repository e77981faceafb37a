//! Capability interfaces the pipeline drives.
//!
//! Concrete producers, encryptors, transports and notifiers are bound to an
//! entry once, when the configuration is resolved, and the pipeline only
//! ever sees them through these traits.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::checksum::ChecksumKind;
use crate::fs::permissions::FilePermissions;
use crate::Result;

/// One object as reported by a store listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub size: u64,
}

impl StoredObject {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

/// Where a producer must write a new artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTarget {
    /// Local storage directory of the entry
    pub dir: PathBuf,

    /// `<base>-<YYYYMMDD>`; the producer appends its own suffix
    pub stem: String,
}

impl ArtifactTarget {
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }
}

/// Flat namespace of named objects that can be listed and deleted.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human readable location, for logs
    fn describe(&self) -> String;

    /// Every object in the store, in the store's natural order.
    async fn list_objects(&self) -> Result<Vec<StoredObject>>;

    /// Delete one object. Deleting an object that does not exist succeeds.
    async fn delete_object(&self, name: &str) -> Result<()>;
}

/// The entry's local storage directory.
#[async_trait]
pub trait LocalStore: ObjectStore {
    /// Make sure the storage location exists.
    async fn prepare(&self) -> Result<()>;

    /// Directory new artifacts are written to
    fn root(&self) -> &Path;

    fn path_of(&self, name: &str) -> PathBuf {
        self.root().join(name)
    }

    /// Write one sidecar per algorithm for `artifact`, returning their names.
    async fn write_checksums(&self, artifact: &str, kinds: &[ChecksumKind]) -> Result<Vec<String>>;

    async fn apply_permissions(&self, files: &[String], permissions: &FilePermissions) -> Result<()>;
}

/// Creates a new artifact.
///
/// On failure nothing may be left behind under the target directory, and
/// any transient resource taken while producing (snapshots, frozen
/// filesystems) must be released on every exit path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackupProducer: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Returns the file name of the new artifact inside `target.dir`.
    async fn produce(&self, target: &ArtifactTarget) -> Result<String>;
}

/// Replaces a plaintext artifact by its encrypted form.
///
/// On success the plaintext is gone; on failure no ciphertext remains.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Encryptor: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Returns the file name of the encrypted artifact inside `dir`.
    async fn encrypt(&self, dir: &Path, artifact: &str) -> Result<String>;
}

/// Off-site copy of the artifacts.
#[async_trait]
pub trait RemoteTransport: ObjectStore {
    /// Upload a local file, keeping its file name.
    async fn upload(&self, local_path: &Path) -> Result<()>;
}

/// Delivers the end-of-run summary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    fn kind(&self) -> &'static str;

    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}
