//! Validation of the loaded configuration and binding of every entry to
//! its concrete producer, encryptor, remote and local store.

use chrono::Weekday;
use indexmap::IndexMap;
use rotabak_core::capability::{BackupProducer, Encryptor, Notifier, RemoteTransport};
use rotabak_core::fs::{DirectoryStore, FilePermissions};
use rotabak_core::{CalendarAnchors, Entry, RetentionSchedule};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::config::{
    BackupSection, EncryptSection, EntrySection, FileConfig, GlobalSection, NotifySection,
    RemoteSection,
};
use crate::error::ConfigError;
use crate::plugins::blockcopy::BlockCopyProducer;
use crate::plugins::fsarchiver::FsArchiverProducer;
use crate::plugins::gnupg::GnupgEncryptor;
use crate::plugins::log_notifier::LogNotifier;
use crate::plugins::lvm::is_valid_snapshot_size;
use crate::plugins::mysqldp::MysqlDumpProducer;
use crate::plugins::pgdump::PgDumpProducer;
use crate::plugins::remote_dir::DirectoryRemote;
use crate::plugins::rsyncget::RsyncGetProducer;
use crate::plugins::s3_remote::S3Remote;
use crate::plugins::tarball::TarballProducer;
use crate::plugins::webhook::WebhookNotifier;

/// Everything a run needs, ready to use.
pub struct ResolvedConfig {
    pub anchors: CalendarAnchors,
    pub sleep_between: Duration,
    pub path_extra: Vec<PathBuf>,
    pub entries: Vec<Entry>,
    pub notifier: Option<Box<dyn Notifier>>,
}

pub fn resolve(config: FileConfig, hostname: &str) -> Result<ResolvedConfig, ConfigError> {
    let FileConfig {
        global,
        schedules,
        entries,
    } = config;

    let anchors = resolve_anchors(&global)?;
    for dir in &global.path_extra {
        if !dir.is_dir() {
            return Err(ConfigError::invalid(
                "global.path_extra",
                format!("{} is not a directory", dir.display()),
            ));
        }
    }

    let notifier = match &global.notify {
        Some(section) => Some(build_notifier(section, hostname)?),
        None => None,
    };

    let entries = entries
        .into_iter()
        .map(|(name, section)| resolve_entry(name, section, &schedules))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedConfig {
        anchors,
        sleep_between: Duration::from_secs(global.sleep_between),
        path_extra: global.path_extra,
        entries,
        notifier,
    })
}

fn resolve_anchors(global: &GlobalSection) -> Result<CalendarAnchors, ConfigError> {
    let day_of_week: Weekday = global.day_of_week.parse().map_err(|_| {
        ConfigError::invalid(
            "global.day_of_week",
            format!("'{}' is not a day of the week", global.day_of_week),
        )
    })?;
    if !(1..=31).contains(&global.day_of_month) {
        return Err(ConfigError::invalid(
            "global.day_of_month",
            format!("{} is not between 1 and 31", global.day_of_month),
        ));
    }
    Ok(CalendarAnchors {
        day_of_week,
        day_of_month: global.day_of_month,
    })
}

fn lookup_schedule(
    schedules: &IndexMap<String, RetentionSchedule>,
    scope: &str,
    name: &str,
) -> Result<RetentionSchedule, ConfigError> {
    schedules
        .get(name)
        .copied()
        .ok_or_else(|| ConfigError::invalid(scope, format!("unknown schedule '{}'", name)))
}

fn resolve_entry(
    name: String,
    section: EntrySection,
    schedules: &IndexMap<String, RetentionSchedule>,
) -> Result<Entry, ConfigError> {
    let scope = format!("entries.{}", name);

    let base_name = section.bakfile_basename.clone().unwrap_or_else(|| name.clone());
    if base_name.is_empty() || base_name.contains('/') {
        return Err(ConfigError::invalid(
            &scope,
            format!("invalid bakfile_basename '{}'", base_name),
        ));
    }

    let schedule = lookup_schedule(schedules, &scope, &section.backup_schedule)?;
    let remote_schedule = section
        .remote_schedule
        .as_deref()
        .map(|s| lookup_schedule(schedules, &scope, s))
        .transpose()?;

    if section.checksums.is_empty() {
        return Err(ConfigError::invalid(&scope, "checksums must not be empty"));
    }
    if let Some(kind) = section.checksums.iter().find(|k| !k.is_computable()) {
        return Err(ConfigError::invalid(
            &scope,
            format!("checksum algorithm '{}' cannot be produced", kind),
        ));
    }

    let permissions = FilePermissions {
        owner: section.bakfile_owner.clone(),
        group: section.bakfile_group.clone(),
        mode: section.bakfile_mode,
    };

    let mut entry = Entry::new(
        name,
        base_name,
        schedule,
        Box::new(DirectoryStore::new(section.bakfile_dir.clone())),
    )
    .with_checksums(section.checksums.clone())
    .with_permissions(permissions);
    entry.enabled = section.enabled;

    if let Some(backup) = section.backup {
        entry = entry.with_producer(build_producer(backup, &scope)?);
    }
    if let Some(encrypt) = section.encrypt {
        entry = entry.with_encryptor(build_encryptor(encrypt));
    }
    if let Some(remote) = section.remote {
        entry = entry.with_remote(build_remote(remote, &scope)?, remote_schedule);
    }

    debug!("Resolved {:?}", entry);
    Ok(entry)
}

fn build_producer(section: BackupSection, scope: &str) -> Result<Box<dyn BackupProducer>, ConfigError> {
    match section {
        BackupSection::Tarball(options) => {
            if options.includes.is_empty() {
                return Err(ConfigError::invalid(scope, "tarball includes must not be empty"));
            }
            if let Some(missing) = options.includes.iter().find(|p| !p.exists()) {
                return Err(ConfigError::invalid(
                    scope,
                    format!("tarball include {} does not exist", missing.display()),
                ));
            }
            Ok(Box::new(TarballProducer::new(options)))
        }
        BackupSection::Pgdump(options) => Ok(Box::new(PgDumpProducer::new(options))),
        BackupSection::Mysqldp(options) => Ok(Box::new(MysqlDumpProducer::new(options))),
        BackupSection::Rsyncget(options) => {
            if !options.extension.is_empty() && !options.extension.starts_with('.') {
                return Err(ConfigError::invalid(
                    scope,
                    format!("rsyncget extension '{}' must start with '.'", options.extension),
                ));
            }
            if options.extension.contains('/') {
                return Err(ConfigError::invalid(
                    scope,
                    format!("rsyncget extension '{}' must not contain '/'", options.extension),
                ));
            }
            Ok(Box::new(RsyncGetProducer::new(options)))
        }
        BackupSection::Blockcopy(options) => {
            check_snapshot_size(scope, &options.snapshot_size)?;
            Ok(Box::new(BlockCopyProducer::new(options)))
        }
        BackupSection::Fsarchiver(options) => {
            if options.filesystems.is_empty() {
                return Err(ConfigError::invalid(scope, "fsarchiver filesystems must not be empty"));
            }
            for filesystem in &options.filesystems {
                check_snapshot_size(scope, &filesystem.snapshot_size)?;
            }
            Ok(Box::new(FsArchiverProducer::new(options)))
        }
    }
}

fn check_snapshot_size(scope: &str, size: &str) -> Result<(), ConfigError> {
    if is_valid_snapshot_size(size) {
        Ok(())
    } else {
        Err(ConfigError::invalid(scope, format!("invalid snapshot_size '{}'", size)))
    }
}

fn build_encryptor(section: EncryptSection) -> Box<dyn Encryptor> {
    match section {
        EncryptSection::Gnupg(options) => Box::new(GnupgEncryptor::new(options)),
    }
}

fn build_remote(section: RemoteSection, scope: &str) -> Result<Box<dyn RemoteTransport>, ConfigError> {
    match section {
        RemoteSection::Directory(options) => Ok(Box::new(DirectoryRemote::new(options.path))),
        RemoteSection::S3(options) => {
            if options.bucket.is_empty() || options.region.is_empty() {
                return Err(ConfigError::invalid(scope, "s3 bucket and region must not be empty"));
            }
            Ok(Box::new(S3Remote::new(options)))
        }
    }
}

fn build_notifier(section: &NotifySection, hostname: &str) -> Result<Box<dyn Notifier>, ConfigError> {
    match section {
        NotifySection::Webhook(options) => WebhookNotifier::new(options, hostname)
            .map(|n| Box::new(n) as Box<dyn Notifier>)
            .map_err(|e| ConfigError::invalid("global.notify", e.to_string())),
        NotifySection::Log => Ok(Box::new(LogNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load;
    use rotabak_core::ChecksumKind;
    use tempfile::TempDir;

    /// Write `body` as a configuration file; `{dir}` expands to a scratch
    /// directory that exists.
    fn load_str(body: &str) -> (TempDir, FileConfig) {
        let dir = TempDir::new().unwrap();
        let content = body.replace("{dir}", &dir.path().display().to_string());
        let path = dir.path().join("rotabak.toml");
        std::fs::write(&path, content).unwrap();
        let config = load(&path).unwrap();
        (dir, config)
    }

    const VALID: &str = r#"
[global]
day_of_week = "Fri"
day_of_month = 15
sleep_between = 2
path_extra = ["{dir}"]
[global.notify]
type = "log"

[schedules.short]
daily = 3
weekly = 0
monthly = 0

[schedules.long]
daily = 7
weekly = 4
monthly = 12

[entries.etc]
bakfile_dir = "{dir}/etc"
backup_schedule = "long"
remote_schedule = "short"
checksums = ["sha512"]
[entries.etc.backup]
type = "tarball"
includes = ["{dir}"]
[entries.etc.encrypt]
type = "gnupg"
recipient = "ops@example.net"
[entries.etc.remote]
type = "directory"
path = "{dir}/offsite"

[entries.disk]
enabled = false
bakfile_dir = "{dir}/disk"
bakfile_basename = "vm-disk"
backup_schedule = "long"
[entries.disk.backup]
type = "blockcopy"
block_device = "/dev/vg0/vm"
snapshot_type = "lvm"
snapshot_size = "2G"
[entries.disk.remote]
type = "directory"
path = "{dir}/offsite"
"#;

    #[test]
    fn test_resolve_valid_configuration() {
        let (_dir, config) = load_str(VALID);
        let resolved = resolve(config, "backup01").unwrap();

        assert_eq!(resolved.anchors.day_of_week, Weekday::Fri);
        assert_eq!(resolved.anchors.day_of_month, 15);
        assert_eq!(resolved.sleep_between, Duration::from_secs(2));
        assert_eq!(resolved.notifier.as_ref().map(|n| n.kind()), Some("log"));
        assert_eq!(resolved.entries.len(), 2);

        let etc = &resolved.entries[0];
        assert_eq!(etc.name, "etc");
        assert_eq!(etc.base_name, "etc");
        assert_eq!(etc.checksums, vec![ChecksumKind::Sha512]);
        assert_eq!(etc.producer.as_ref().map(|p| p.kind()), Some("tarball"));
        assert_eq!(etc.encryptor.as_ref().map(|e| e.kind()), Some("gnupg"));
        assert_eq!(*etc.remote_schedule(), RetentionSchedule::new(3, 0, 0));

        let disk = &resolved.entries[1];
        assert!(!disk.enabled);
        assert_eq!(disk.base_name, "vm-disk");
        assert_eq!(disk.producer.as_ref().map(|p| p.kind()), Some("blockcopy"));
        // No remote schedule given: the local one applies
        assert_eq!(*disk.remote_schedule(), RetentionSchedule::new(7, 4, 12));
    }

    fn resolve_error(body: &str) -> String {
        let (_dir, config) = load_str(body);
        match resolve(config, "backup01") {
            Err(e @ ConfigError::Invalid { .. }) => e.to_string(),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("configuration unexpectedly accepted"),
        }
    }

    fn entry_with(extra: &str) -> String {
        format!(
            r#"
[schedules.std]
daily = 7
weekly = 0
monthly = 0

[entries.etc]
bakfile_dir = "{{dir}}/etc"
backup_schedule = "std"
{}
"#,
            extra
        )
    }

    #[test]
    fn test_unknown_schedule() {
        let message = resolve_error(&entry_with(r#"remote_schedule = "weekly""#));
        assert!(message.contains("unknown schedule 'weekly'"), "{}", message);
    }

    #[test]
    fn test_md5_cannot_be_produced() {
        let message = resolve_error(&entry_with(r#"checksums = ["md5"]"#));
        assert!(message.contains("md5"), "{}", message);
        let message = resolve_error(&entry_with("checksums = []"));
        assert!(message.contains("must not be empty"), "{}", message);
    }

    #[test]
    fn test_invalid_base_name() {
        let message = resolve_error(&entry_with(r#"bakfile_basename = "etc/main""#));
        assert!(message.contains("bakfile_basename"), "{}", message);
    }

    #[test]
    fn test_missing_tarball_include() {
        let message = resolve_error(&entry_with(
            "[entries.etc.backup]\ntype = \"tarball\"\nincludes = [\"{dir}/nowhere\"]",
        ));
        assert!(message.contains("does not exist"), "{}", message);
    }

    #[test]
    fn test_invalid_snapshot_size() {
        let message = resolve_error(&entry_with(
            "[entries.etc.backup]\ntype = \"blockcopy\"\nblock_device = \"/dev/vg0/lv\"\nsnapshot_size = \"1T\"",
        ));
        assert!(message.contains("snapshot_size"), "{}", message);
    }

    #[test]
    fn test_rsyncget_extension_needs_dot() {
        let message = resolve_error(&entry_with(
            "[entries.etc.backup]\ntype = \"rsyncget\"\nremote_host = \"db01\"\nremote_user = \"backup\"\nremote_path = \"/out\"\nextension = \"sql.xz\"",
        ));
        assert!(message.contains("must start with '.'"), "{}", message);
    }

    #[test]
    fn test_fsarchiver_needs_filesystems() {
        let message = resolve_error(&entry_with(
            "[entries.etc.backup]\ntype = \"fsarchiver\"\nfilesystems = []",
        ));
        assert!(message.contains("filesystems must not be empty"), "{}", message);

        let message = resolve_error(&entry_with(
            "[entries.etc.backup]\ntype = \"fsarchiver\"\n[[entries.etc.backup.filesystems]]\nblock_device = \"/dev/vg0/root\"\nsnapshot_type = \"lvm\"\nsnapshot_size = \"lots\"",
        ));
        assert!(message.contains("snapshot_size"), "{}", message);
    }

    #[test]
    fn test_every_producer_and_remote_type_resolves() {
        let (_dir, config) = load_str(
            r#"
[schedules.std]
daily = 7
weekly = 0
monthly = 0

[entries.shop]
bakfile_dir = "{dir}/shop"
backup_schedule = "std"
[entries.shop.backup]
type = "mysqldp"
dbname = "shop"
[entries.shop.remote]
type = "s3"
bucket = "offsite-backups"
region = "eu-west-1"
[entries.shop.remote.access_key]
public = "AKIAEXAMPLE"
secret = "secret"

[entries.pulled]
bakfile_dir = "{dir}/pulled"
backup_schedule = "std"
[entries.pulled.backup]
type = "rsyncget"
remote_host = "db01"
remote_user = "backup"
remote_path = "/out"
extension = ".sql.xz"

[entries.sys]
bakfile_dir = "{dir}/sys"
backup_schedule = "std"
[entries.sys.backup]
type = "fsarchiver"
[[entries.sys.backup.filesystems]]
block_device = "/dev/vg0/root"
snapshot_type = "lvm"
snapshot_size = "512M"
"#,
        );
        let resolved = resolve(config, "backup01").unwrap();

        let kinds: Vec<Option<&str>> = resolved
            .entries
            .iter()
            .map(|e| e.producer.as_ref().map(|p| p.kind()))
            .collect();
        assert_eq!(kinds, vec![Some("mysqldp"), Some("rsyncget"), Some("fsarchiver")]);
        let remote = resolved.entries[0].remote.as_ref().unwrap();
        assert_eq!(remote.describe(), "s3://offsite-backups (eu-west-1)");
    }

    #[test]
    fn test_invalid_anchors() {
        let message = resolve_error("[global]\nday_of_week = \"Someday\"\n");
        assert!(message.contains("day_of_week"), "{}", message);
        let message = resolve_error("[global]\nday_of_month = 32\n");
        assert!(message.contains("day_of_month"), "{}", message);
        let message = resolve_error("[global]\nday_of_month = 0\n");
        assert!(message.contains("day_of_month"), "{}", message);
    }

    #[test]
    fn test_missing_path_extra() {
        let message = resolve_error("[global]\npath_extra = [\"{dir}/not-there\"]\n");
        assert!(message.contains("path_extra"), "{}", message);
    }
}
