//! Processing of one backup entry.
//!
//! The steps always run in the same order: create, encrypt, checksum,
//! permissions, local rotation, then remote sync and remote rotation. A
//! failing step is recorded on the [`EntryReport`] and the pipeline moves
//! on; a later step is skipped only when the input it needs is missing.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::artifact::dated_stem;
use crate::capability::{ArtifactTarget, BackupProducer, Encryptor, LocalStore, RemoteTransport};
use crate::catalog::ArtifactCatalog;
use crate::checksum::ChecksumKind;
use crate::context::RunContext;
use crate::fs::FilePermissions;
use crate::retention::{classify, RetentionSchedule};
use crate::rotation::{rotate, RotationOutcome};
use crate::sync::SyncPlan;

/// A named backup job with its bound collaborators.
pub struct Entry {
    pub name: String,
    pub enabled: bool,
    pub base_name: String,
    pub schedule: RetentionSchedule,
    /// Falls back to `schedule` when unset
    pub remote_schedule: Option<RetentionSchedule>,
    pub checksums: Vec<ChecksumKind>,
    pub permissions: FilePermissions,
    pub local: Box<dyn LocalStore>,
    pub producer: Option<Box<dyn BackupProducer>>,
    pub encryptor: Option<Box<dyn Encryptor>>,
    pub remote: Option<Box<dyn RemoteTransport>>,
}

impl Entry {
    pub fn new(
        name: impl Into<String>,
        base_name: impl Into<String>,
        schedule: RetentionSchedule,
        local: Box<dyn LocalStore>,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            base_name: base_name.into(),
            schedule,
            remote_schedule: None,
            checksums: vec![ChecksumKind::Sha256],
            permissions: FilePermissions::default(),
            local,
            producer: None,
            encryptor: None,
            remote: None,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_producer(mut self, producer: Box<dyn BackupProducer>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn with_encryptor(mut self, encryptor: Box<dyn Encryptor>) -> Self {
        self.encryptor = Some(encryptor);
        self
    }

    pub fn with_remote(
        mut self,
        remote: Box<dyn RemoteTransport>,
        schedule: Option<RetentionSchedule>,
    ) -> Self {
        self.remote = Some(remote);
        self.remote_schedule = schedule;
        self
    }

    pub fn with_checksums(mut self, checksums: Vec<ChecksumKind>) -> Self {
        self.checksums = checksums;
        self
    }

    pub fn with_permissions(mut self, permissions: FilePermissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn remote_schedule(&self) -> &RetentionSchedule {
        self.remote_schedule.as_ref().unwrap_or(&self.schedule)
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("enabled", &self.enabled)
            .field("base_name", &self.base_name)
            .field("schedule", &self.schedule)
            .field("remote_schedule", &self.remote_schedule)
            .field("checksums", &self.checksums)
            .field("local", &self.local.describe())
            .field("producer", &self.producer.as_ref().map(|p| p.kind()))
            .field("encryptor", &self.encryptor.as_ref().map(|e| e.kind()))
            .field("remote", &self.remote.as_ref().map(|r| r.describe()))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Prepare,
    Create,
    Encrypt,
    Checksum,
    Permissions,
    LocalListing,
    LocalRotation,
    RemoteListing,
    Upload,
    RemoteRotation,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Prepare => "prepare",
            Step::Create => "create",
            Step::Encrypt => "encrypt",
            Step::Checksum => "checksum",
            Step::Permissions => "permissions",
            Step::LocalListing => "local listing",
            Step::LocalRotation => "local rotation",
            Step::RemoteListing => "remote listing",
            Step::Upload => "upload",
            Step::RemoteRotation => "remote rotation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: Step,
    pub message: String,
}

/// What happened to one entry during a run.
#[derive(Debug, Clone, Default)]
pub struct EntryReport {
    pub entry: String,
    /// Name of the artifact created by this run, after encryption
    pub created: Option<String>,
    pub failures: Vec<StepFailure>,
    pub local_deleted: usize,
    pub remote_deleted: usize,
    pub uploaded_files: usize,
    pub duration: Duration,
}

impl EntryReport {
    pub fn error_count(&self) -> usize {
        self.failures.len()
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Whether a new artifact dated `today` would be retained at all.
pub fn backup_due(schedule: &RetentionSchedule, ctx: &RunContext) -> bool {
    classify(ctx.today, ctx.today, schedule, &ctx.anchors).is_retained()
}

pub struct EntryPipeline<'a> {
    entry: &'a Entry,
    ctx: &'a RunContext,
    report: EntryReport,
}

impl<'a> EntryPipeline<'a> {
    pub fn new(entry: &'a Entry, ctx: &'a RunContext) -> Self {
        Self {
            entry,
            ctx,
            report: EntryReport {
                entry: entry.name.clone(),
                ..EntryReport::default()
            },
        }
    }

    pub async fn run(mut self) -> EntryReport {
        let started = Instant::now();
        let entry = self.entry;

        if let Err(e) = entry.local.prepare().await {
            self.fail(Step::Prepare, e);
        }

        let mut artifact = self.create().await;
        if let Some(name) = artifact.take() {
            artifact = self.encrypt(name).await;
        }
        if let Some(name) = &artifact {
            self.checksum(name).await;
        }
        self.report.created = artifact;

        let local_catalog = self.rotate_local().await;
        if entry.remote.is_some() {
            self.sync_remote(local_catalog.as_ref()).await;
        }

        self.report.duration = started.elapsed();
        self.report
    }

    fn fail(&mut self, step: Step, error: impl fmt::Display) {
        error!("Entry '{}': {} failed: {}", self.entry.name, step, error);
        self.report.failures.push(StepFailure {
            step,
            message: error.to_string(),
        });
    }

    async fn create(&mut self) -> Option<String> {
        let entry = self.entry;
        let producer = entry.producer.as_ref()?;

        if !backup_due(&entry.schedule, self.ctx) {
            info!(
                "Entry '{}': no backup due on {}, skipping creation",
                entry.name, self.ctx.today
            );
            return None;
        }

        let target = ArtifactTarget {
            dir: entry.local.root().to_path_buf(),
            stem: dated_stem(&entry.base_name, self.ctx.today),
        };
        info!("Entry '{}': creating backup {}", entry.name, target.stem);

        match producer.produce(&target).await {
            Ok(name) => {
                info!("Entry '{}': created {}", entry.name, name);
                Some(name)
            }
            Err(e) => {
                self.fail(Step::Create, e);
                None
            }
        }
    }

    async fn encrypt(&mut self, artifact: String) -> Option<String> {
        let entry = self.entry;
        let Some(encryptor) = entry.encryptor.as_ref() else {
            return Some(artifact);
        };

        match encryptor.encrypt(entry.local.root(), &artifact).await {
            Ok(encrypted) => {
                info!("Entry '{}': encrypted {} into {}", entry.name, artifact, encrypted);
                Some(encrypted)
            }
            Err(e) => {
                self.fail(Step::Encrypt, e);
                None
            }
        }
    }

    async fn checksum(&mut self, artifact: &str) {
        let entry = self.entry;
        let sidecars = match entry.local.write_checksums(artifact, &entry.checksums).await {
            Ok(sidecars) => sidecars,
            Err(e) => {
                self.fail(Step::Checksum, e);
                return;
            }
        };
        debug!("Entry '{}': wrote sidecars [{}]", entry.name, sidecars.join(","));

        if entry.permissions.is_empty() || sidecars.is_empty() {
            return;
        }
        let mut files = vec![artifact.to_string()];
        files.extend(sidecars);
        if let Err(e) = entry.local.apply_permissions(&files, &entry.permissions).await {
            self.fail(Step::Permissions, e);
        }
    }

    async fn rotate_local(&mut self) -> Option<ArtifactCatalog> {
        let entry = self.entry;
        let local = entry.local.as_ref();
        let mut catalog = match ArtifactCatalog::list(local, &entry.base_name).await {
            Ok(catalog) => catalog,
            Err(e) => {
                self.fail(Step::LocalListing, e);
                return None;
            }
        };
        catalog.log_listing("LOCAL", self.ctx.today);

        let outcome = rotate(&mut catalog, &entry.schedule, self.ctx, local).await;
        self.report.local_deleted = outcome.deleted;
        self.record_rotation_failures(Step::LocalRotation, outcome);
        Some(catalog)
    }

    async fn sync_remote(&mut self, local_catalog: Option<&ArtifactCatalog>) {
        let entry = self.entry;
        let Some(remote) = entry.remote.as_ref() else {
            return;
        };
        let schedule = entry.remote_schedule();

        let mut remote_catalog = match ArtifactCatalog::list(remote.as_ref(), &entry.base_name).await {
            Ok(catalog) => catalog,
            Err(e) => {
                self.fail(Step::RemoteListing, e);
                return;
            }
        };
        remote_catalog.log_listing("REMOTE", self.ctx.today);

        if let Some(local_catalog) = local_catalog {
            let plan = SyncPlan::plan(local_catalog, &remote_catalog, schedule, self.ctx);
            info!(
                "Entry '{}': {} file(s) to upload to {}",
                entry.name,
                plan.file_count(),
                remote.describe()
            );
            for transfer in plan.pending() {
                for file in &transfer.files {
                    debug!("Uploading {}", file);
                    match remote.upload(&entry.local.path_of(file)).await {
                        Ok(()) => self.report.uploaded_files += 1,
                        Err(e) => self.fail(Step::Upload, format!("{}: {}", file, e)),
                    }
                }
            }
        }

        let outcome = rotate(&mut remote_catalog, schedule, self.ctx, remote.as_ref()).await;
        self.report.remote_deleted = outcome.deleted;
        self.record_rotation_failures(Step::RemoteRotation, outcome);
    }

    fn record_rotation_failures(&mut self, step: Step, outcome: RotationOutcome) {
        for name in outcome.failed {
            self.fail(step, format!("could not delete {}", name));
        }
    }
}
