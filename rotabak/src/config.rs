//! Configuration loading.
//!
//! The configuration is either one TOML file or a directory of `*.toml`
//! fragments. Fragments are read in file-name order and their top-level
//! tables are merged key by key, later fragments overriding earlier ones.

use indexmap::IndexMap;
use rotabak_core::{ChecksumKind, RetentionSchedule};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::ConfigError;
use crate::plugins::blockcopy::BlockCopyOptions;
use crate::plugins::fsarchiver::FsArchiverOptions;
use crate::plugins::gnupg::GnupgOptions;
use crate::plugins::mysqldp::MysqlDumpOptions;
use crate::plugins::pgdump::PgDumpOptions;
use crate::plugins::remote_dir::DirectoryRemoteOptions;
use crate::plugins::rsyncget::RsyncGetOptions;
use crate::plugins::s3_remote::S3RemoteOptions;
use crate::plugins::tarball::TarballOptions;
use crate::plugins::webhook::WebhookOptions;

/// Used when neither `--config` nor `ROTABAK_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rotabak.d";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub global: GlobalSection,

    #[serde(default)]
    pub schedules: IndexMap<String, RetentionSchedule>,

    #[serde(default)]
    pub entries: IndexMap<String, EntrySection>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSection {
    /// Weekday kept by the weekly tier (`Mon`..`Sun`)
    #[serde(default = "default_day_of_week")]
    pub day_of_week: String,

    /// Day of month kept by the monthly tier
    #[serde(default = "default_day_of_month")]
    pub day_of_month: u32,

    /// Seconds to wait after each processed entry
    #[serde(default)]
    pub sleep_between: u64,

    /// Directories appended to `PATH` before running external programs
    #[serde(default)]
    pub path_extra: Vec<PathBuf>,

    #[serde(default)]
    pub notify: Option<NotifySection>,
}

impl Default for GlobalSection {
    fn default() -> Self {
        Self {
            day_of_week: default_day_of_week(),
            day_of_month: default_day_of_month(),
            sleep_between: 0,
            path_extra: Vec::new(),
            notify: None,
        }
    }
}

fn default_day_of_week() -> String {
    "Mon".to_string()
}

fn default_day_of_month() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntrySection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub bakfile_dir: PathBuf,

    /// Defaults to the entry name
    #[serde(default)]
    pub bakfile_basename: Option<String>,

    pub backup_schedule: String,

    /// Defaults to `backup_schedule`
    #[serde(default)]
    pub remote_schedule: Option<String>,

    #[serde(default = "default_checksums")]
    pub checksums: Vec<ChecksumKind>,

    #[serde(default)]
    pub bakfile_owner: Option<String>,

    #[serde(default)]
    pub bakfile_group: Option<String>,

    #[serde(default)]
    pub bakfile_mode: Option<u32>,

    #[serde(default)]
    pub backup: Option<BackupSection>,

    #[serde(default)]
    pub encrypt: Option<EncryptSection>,

    #[serde(default)]
    pub remote: Option<RemoteSection>,
}

fn default_enabled() -> bool {
    true
}

fn default_checksums() -> Vec<ChecksumKind> {
    vec![ChecksumKind::Sha256]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackupSection {
    Tarball(TarballOptions),
    Pgdump(PgDumpOptions),
    Mysqldp(MysqlDumpOptions),
    Rsyncget(RsyncGetOptions),
    Blockcopy(BlockCopyOptions),
    Fsarchiver(FsArchiverOptions),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EncryptSection {
    Gnupg(GnupgOptions),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteSection {
    Directory(DirectoryRemoteOptions),
    S3(S3RemoteOptions),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotifySection {
    Webhook(WebhookOptions),
    Log,
}

/// Files making up the configuration at `path`, in merge order.
pub fn fragment_paths(path: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut fragments = Vec::new();
    for entry in WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        let is_toml = entry.path().extension().is_some_and(|ext| ext == "toml");
        if entry.file_type().is_file() && is_toml {
            fragments.push(entry.into_path());
        }
    }

    if fragments.is_empty() {
        return Err(ConfigError::NoFragments(path.to_path_buf()));
    }
    Ok(fragments)
}

/// Read, merge and deserialize the configuration at `path`.
pub fn load(path: &Path) -> Result<FileConfig, ConfigError> {
    let mut merged = toml::Table::new();

    for fragment in fragment_paths(path)? {
        debug!("Loading configuration fragment {}", fragment.display());
        let content = std::fs::read_to_string(&fragment).map_err(|source| ConfigError::Read {
            path: fragment.clone(),
            source,
        })?;
        let table: toml::Table = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: fragment.clone(),
            source,
        })?;
        merge_fragment(&mut merged, table);
    }

    toml::Value::Table(merged)
        .try_into()
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Merge one fragment into `merged`. Tables found at the top level of both
/// are merged one level deep; anything else is replaced.
fn merge_fragment(merged: &mut toml::Table, fragment: toml::Table) {
    for (key, value) in fragment {
        if let toml::Value::Table(incoming) = &value {
            if let Some(toml::Value::Table(existing)) = merged.get_mut(&key) {
                for (inner_key, inner_value) in incoming {
                    existing.insert(inner_key.clone(), inner_value.clone());
                }
                continue;
            }
        }
        merged.insert(key, value);
    }
}
