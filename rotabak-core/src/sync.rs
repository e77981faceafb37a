//! Decide which local files must be copied to the remote store.
//!
//! Equality is judged on name and size only, never on content. The sidecar
//! list is compared separately so an upload that was interrupted after the
//! main file (checksum files missing on the remote side) is repaired without
//! sending the main file again.

use tracing::debug;

use crate::catalog::ArtifactCatalog;
use crate::context::RunContext;
use crate::retention::{classify, RetentionSchedule, Tier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDecision {
    /// Same name, size and sidecar list on the remote side
    UpToDate,
    /// Missing on the remote side, or present with another size
    Full,
    /// Main file present, sidecar list differs
    SidecarsOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransfer {
    pub artifact: String,
    pub tier: Tier,
    pub decision: TransferDecision,
    /// File names relative to the local store, main file first
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub transfers: Vec<PlannedTransfer>,
}

impl SyncPlan {
    /// Compare the local catalog against the remote one for every local
    /// artifact still inside the remote retention horizon.
    pub fn plan(
        local: &ArtifactCatalog,
        remote: &ArtifactCatalog,
        remote_schedule: &RetentionSchedule,
        ctx: &RunContext,
    ) -> Self {
        let mut transfers = Vec::new();

        for artifact in local.iter() {
            let tier = classify(artifact.date, ctx.today, remote_schedule, &ctx.anchors);
            if !tier.is_retained() {
                continue;
            }

            let (decision, files) = match remote.find_copy(artifact) {
                None => (TransferDecision::Full, artifact.related_files()),
                Some(copy) if copy.checksum_list() != artifact.checksum_list() => {
                    (TransferDecision::SidecarsOnly, artifact.sidecar_names())
                }
                Some(_) => (TransferDecision::UpToDate, Vec::new()),
            };

            debug!(
                "REMOTE-PLAN: name=[{}] age=[{}d] tier=[{}] decision=[{:?}] files=[{}]",
                artifact.name,
                artifact.age_days(ctx.today),
                tier,
                decision,
                files.join(",")
            );

            transfers.push(PlannedTransfer {
                artifact: artifact.name.clone(),
                tier,
                decision,
                files,
            });
        }

        Self { transfers }
    }

    /// Transfers that actually move at least one file.
    pub fn pending(&self) -> impl Iterator<Item = &PlannedTransfer> {
        self.transfers.iter().filter(|t| !t.files.is_empty())
    }

    pub fn file_count(&self) -> usize {
        self.transfers.iter().map(|t| t.files.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.file_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::checksum::ChecksumKind;
    use crate::context::CalendarAnchors;
    use chrono::NaiveDate;

    fn ctx() -> RunContext {
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        RunContext::new(today, CalendarAnchors::default()).with_hostname("test-host")
    }

    fn artifact(name: &str, size: u64, sums: &[ChecksumKind]) -> Artifact {
        Artifact::from_name(name, "a", size)
            .unwrap()
            .with_checksums(sums.iter().copied())
    }

    fn schedule() -> RetentionSchedule {
        RetentionSchedule::new(7, 4, 6)
    }

    #[test]
    fn test_missing_remote_means_full_transfer() {
        let local: ArtifactCatalog = [artifact("a-20240608.bin", 100, &[ChecksumKind::Sha256])]
            .into_iter()
            .collect();
        let remote = ArtifactCatalog::default();

        let plan = SyncPlan::plan(&local, &remote, &schedule(), &ctx());
        assert_eq!(plan.transfers.len(), 1);
        assert_eq!(plan.transfers[0].decision, TransferDecision::Full);
        assert_eq!(
            plan.transfers[0].files,
            vec!["a-20240608.bin".to_string(), "a-20240608.bin.sha256".to_string()]
        );
    }

    #[test]
    fn test_missing_sidecars_are_repaired_alone() {
        let local: ArtifactCatalog = [artifact("a-20240608.bin", 100, &[ChecksumKind::Sha256])]
            .into_iter()
            .collect();
        let remote: ArtifactCatalog = [artifact("a-20240608.bin", 100, &[])].into_iter().collect();

        let plan = SyncPlan::plan(&local, &remote, &schedule(), &ctx());
        assert_eq!(plan.transfers[0].decision, TransferDecision::SidecarsOnly);
        assert_eq!(plan.transfers[0].files, vec!["a-20240608.bin.sha256".to_string()]);
    }

    #[test]
    fn test_identical_copy_needs_nothing() {
        let local: ArtifactCatalog = [artifact("a-20240608.bin", 100, &[ChecksumKind::Sha256])]
            .into_iter()
            .collect();
        let remote = local.clone();

        let plan = SyncPlan::plan(&local, &remote, &schedule(), &ctx());
        assert_eq!(plan.transfers[0].decision, TransferDecision::UpToDate);
        assert!(plan.is_empty());
        assert_eq!(plan.pending().count(), 0);
    }

    #[test]
    fn test_size_mismatch_resends_everything() {
        let local: ArtifactCatalog = [artifact("a-20240608.bin", 100, &[ChecksumKind::Sha256])]
            .into_iter()
            .collect();
        let remote: ArtifactCatalog = [artifact("a-20240608.bin", 60, &[ChecksumKind::Sha256])]
            .into_iter()
            .collect();

        let plan = SyncPlan::plan(&local, &remote, &schedule(), &ctx());
        assert_eq!(plan.transfers[0].decision, TransferDecision::Full);
        assert_eq!(plan.file_count(), 2);
    }

    #[test]
    fn test_artifacts_outside_remote_horizon_are_skipped() {
        // Tuesday 2024-05-14 is neither daily, weekly nor monthly
        let local: ArtifactCatalog = [
            artifact("a-20240514.bin", 100, &[]),
            artifact("a-20240609.bin", 100, &[]),
        ]
        .into_iter()
        .collect();

        let plan = SyncPlan::plan(&local, &ArtifactCatalog::default(), &schedule(), &ctx());
        assert_eq!(plan.transfers.len(), 1);
        assert_eq!(plan.transfers[0].artifact, "a-20240609.bin");
        assert_eq!(plan.transfers[0].tier, Tier::Daily);
    }
}
