//! MySQL/MariaDB dumps through `mysqldump`, piped through a compressor.

use async_trait::async_trait;
use rotabak_core::capability::{ArtifactTarget, BackupProducer};
use rotabak_core::fs::PartialFile;
use rotabak_core::Result;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use super::command::{require_program, run_pipeline, CommandSpec, CompressProgram};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MysqlDumpOptions {
    pub dbname: String,

    #[serde(default = "default_host")]
    pub dbhost: String,

    #[serde(default = "default_user")]
    pub dbuser: String,

    /// Handed to mysqldump through `MYSQL_PWD`
    #[serde(default)]
    pub dbpass: Option<String>,

    #[serde(default)]
    pub command_opts: Vec<String>,

    #[serde(default)]
    pub compress_prog: CompressProgram,

    #[serde(default)]
    pub compress_opts: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_user() -> String {
    "root".to_string()
}

#[derive(Debug, Clone)]
pub struct MysqlDumpProducer {
    options: MysqlDumpOptions,
}

impl MysqlDumpProducer {
    pub fn new(options: MysqlDumpOptions) -> Self {
        Self { options }
    }

    fn dump_command(&self, mysqldump: PathBuf) -> CommandSpec {
        let options = &self.options;
        let mut command = CommandSpec::new(mysqldump)
            .arg(format!("--host={}", options.dbhost))
            .arg(format!("--user={}", options.dbuser))
            .args(options.command_opts.iter().cloned())
            .arg(options.dbname.as_str());
        if let Some(password) = options.dbpass.as_deref().filter(|p| !p.is_empty()) {
            command = command.env("MYSQL_PWD", password);
        }
        command
    }

    fn produce_blocking(&self, target: &ArtifactTarget) -> Result<String> {
        let options = &self.options;
        let compress = options.compress_prog.stage(&options.compress_opts)?;
        let dump = self.dump_command(require_program("mysqldump")?);

        let name = format!("{}.sql.{}", target.stem, options.compress_prog.extension());
        let output = PartialFile::create(target.path_for(&name))?;
        info!("Running pipeline: [{}] | [{}]", dump, compress);
        run_pipeline(&[dump, compress], None, output.path())?;
        output.commit();

        Ok(name)
    }
}

#[async_trait]
impl BackupProducer for MysqlDumpProducer {
    fn kind(&self) -> &'static str {
        "mysqldp"
    }

    async fn produce(&self, target: &ArtifactTarget) -> Result<String> {
        let producer = self.clone();
        let target = target.clone();
        tokio::task::spawn_blocking(move || producer.produce_blocking(&target)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_command() {
        let options: MysqlDumpOptions = toml::from_str(
            r#"
            dbname = "shop"
            dbpass = "hunter2"
            command_opts = ["--single-transaction"]
            compress_prog = "zstd"
            "#,
        )
        .unwrap();
        assert_eq!(options.dbhost, "127.0.0.1");
        assert_eq!(options.dbuser, "root");
        assert_eq!(options.compress_prog.extension(), "zst");

        let command = MysqlDumpProducer::new(options).dump_command(PathBuf::from("/usr/bin/mysqldump"));
        assert_eq!(
            command.args,
            vec!["--host=127.0.0.1", "--user=root", "--single-transaction", "shop"]
        );
        assert_eq!(command.envs, vec![("MYSQL_PWD".to_string(), "hunter2".to_string())]);
        assert!(!command.to_string().contains("hunter2"));
    }

    #[test]
    fn test_empty_password_is_not_passed() {
        let options: MysqlDumpOptions = toml::from_str(
            r#"
            dbname = "shop"
            dbpass = ""
            "#,
        )
        .unwrap();
        let command = MysqlDumpProducer::new(options).dump_command(PathBuf::from("mysqldump"));
        assert!(command.envs.is_empty());
    }
}
