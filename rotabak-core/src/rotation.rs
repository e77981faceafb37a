//! Deletion of artifacts that fell out of the retention schedule.

use tracing::{debug, error, info};

use crate::catalog::ArtifactCatalog;
use crate::capability::ObjectStore;
use crate::checksum::ChecksumKind;
use crate::context::RunContext;
use crate::retention::{classify, RetentionSchedule, Tier};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationOutcome {
    /// Artifacts removed together with their sidecars
    pub deleted: usize,
    /// Artifacts that could not be removed completely
    pub failed: Vec<String>,
}

/// Names of the artifacts classified as expired.
pub fn expired_artifacts(
    catalog: &ArtifactCatalog,
    schedule: &RetentionSchedule,
    ctx: &RunContext,
) -> Vec<String> {
    catalog
        .iter()
        .filter_map(|artifact| {
            let tier = classify(artifact.date, ctx.today, schedule, &ctx.anchors);
            debug!(
                "ROTATE: name=[{}] age=[{:>3}d] tier=[{}]",
                artifact.name,
                artifact.age_days(ctx.today),
                tier
            );
            (tier == Tier::Expired).then(|| artifact.name.clone())
        })
        .collect()
}

/// Delete every expired artifact from `store` and drop it from `catalog`.
/// Sidecars go first and the main file last, so a main file never
/// disappears while one of its sidecars is left behind. An artifact whose
/// files cannot all be deleted stays in the catalog with the sidecars it
/// still has, is reported as failed, and rotation carries on with the next
/// one.
pub async fn rotate<S: ObjectStore + ?Sized>(
    catalog: &mut ArtifactCatalog,
    schedule: &RetentionSchedule,
    ctx: &RunContext,
    store: &S,
) -> RotationOutcome {
    let mut outcome = RotationOutcome::default();

    for name in expired_artifacts(catalog, schedule, ctx) {
        let Some(artifact) = catalog.get(&name) else {
            continue;
        };
        let checksums: Vec<ChecksumKind> = artifact.checksums.iter().copied().collect();
        info!("Deleting backup '{}' from {}", name, store.describe());

        let mut removed = Vec::with_capacity(checksums.len());
        for kind in checksums {
            let sidecar = kind.sidecar_name(&name);
            debug!("Deleting file: {}", sidecar);
            match store.delete_object(&sidecar).await {
                Ok(()) => removed.push(kind),
                Err(e) => error!("Failed to delete '{}' from {}: {}", sidecar, store.describe(), e),
            }
        }

        let mut complete = false;
        if let Some(artifact) = catalog.get_mut(&name) {
            for kind in &removed {
                artifact.checksums.remove(kind);
            }
            if artifact.checksums.is_empty() {
                debug!("Deleting file: {}", name);
                match store.delete_object(&name).await {
                    Ok(()) => complete = true,
                    Err(e) => error!("Failed to delete '{}' from {}: {}", name, store.describe(), e),
                }
            }
        }

        if complete {
            catalog.remove(&name);
            outcome.deleted += 1;
        } else {
            outcome.failed.push(name);
        }
    }

    outcome
}
