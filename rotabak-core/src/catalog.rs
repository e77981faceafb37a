//! Catalog of the artifacts an entry has in one store.

use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::debug;

use crate::artifact::{self, Artifact};
use crate::capability::{ObjectStore, StoredObject};
use crate::checksum::{self, ChecksumKind};
use crate::Result;

/// Artifacts of one entry in one store, in listing order (for a local
/// directory: modification time, oldest first).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactCatalog {
    artifacts: Vec<Artifact>,
}

impl ArtifactCatalog {
    /// Enumerate `store` and keep the artifacts belonging to `base`.
    pub async fn list<S: ObjectStore + ?Sized>(store: &S, base: &str) -> Result<Self> {
        let objects = store.list_objects().await?;
        Self::from_objects(&objects, base)
    }

    /// Build the catalog from a raw listing. Sidecar files are folded into
    /// their artifact; a name that looks like an artifact of `base` but
    /// carries an impossible date fails the whole listing.
    pub fn from_objects(objects: &[StoredObject], base: &str) -> Result<Self> {
        let names: HashSet<&str> = objects.iter().map(|o| o.name.as_str()).collect();
        let mut artifacts = Vec::new();

        for object in objects {
            if checksum::is_sidecar(&object.name) || !artifact::matches_base(&object.name, base) {
                continue;
            }
            let present = ChecksumKind::ALL
                .into_iter()
                .filter(|kind| names.contains(kind.sidecar_name(&object.name).as_str()));
            artifacts.push(Artifact::from_name(&object.name, base, object.size)?.with_checksums(present));
        }

        Ok(Self { artifacts })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Artifact> {
        self.artifacts.iter_mut().find(|a| a.name == name)
    }

    /// First artifact with the same name and size, the cheap proxy used to
    /// decide that a copy is already in place.
    pub fn find_copy(&self, other: &Artifact) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .find(|a| a.name == other.name && a.size == other.size)
    }

    pub fn remove(&mut self, name: &str) -> Option<Artifact> {
        let index = self.artifacts.iter().position(|a| a.name == name)?;
        Some(self.artifacts.remove(index))
    }

    /// Debug dump of the catalog, one line per artifact.
    pub fn log_listing(&self, scope: &str, today: NaiveDate) {
        for artifact in &self.artifacts {
            debug!(
                "{}: name=[{}] date=[{}] age=[{:>3}d] sums=[{}] size=[{}]",
                scope,
                artifact.name,
                artifact.date,
                artifact.age_days(today),
                artifact.checksum_list(),
                artifact.size
            );
        }
    }
}

impl FromIterator<Artifact> for ArtifactCatalog {
    fn from_iter<I: IntoIterator<Item = Artifact>>(iter: I) -> Self {
        Self {
            artifacts: iter.into_iter().collect(),
        }
    }
}
