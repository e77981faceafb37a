//! PostgreSQL dumps through `pg_dump`.

use async_trait::async_trait;
use rotabak_core::capability::{ArtifactTarget, BackupProducer};
use rotabak_core::fs::PartialFile;
use rotabak_core::Result;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::info;

use super::command::{require_program, run_pipeline, CommandSpec};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PgDumpOptions {
    pub dbname: String,

    #[serde(default = "default_host")]
    pub dbhost: String,

    #[serde(default = "default_user")]
    pub dbuser: String,

    /// Handed to pg_dump through `PGPASSWORD`
    #[serde(default)]
    pub dbpass: Option<String>,

    #[serde(default)]
    pub command_opts: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_user() -> String {
    "postgres".to_string()
}

#[derive(Debug, Clone)]
pub struct PgDumpProducer {
    options: PgDumpOptions,
}

impl PgDumpProducer {
    pub fn new(options: PgDumpOptions) -> Self {
        Self { options }
    }

    fn dump_command(&self, pg_dump: PathBuf) -> CommandSpec {
        let options = &self.options;
        let mut command = CommandSpec::new(pg_dump)
            .arg(format!("--host={}", options.dbhost))
            .arg(format!("--username={}", options.dbuser))
            .arg("--no-password")
            .args(options.command_opts.iter().cloned())
            .arg(options.dbname.as_str());
        if let Some(password) = options.dbpass.as_deref().filter(|p| !p.is_empty()) {
            command = command.env("PGPASSWORD", password);
        }
        command
    }

    fn produce_blocking(&self, target: &ArtifactTarget) -> Result<String> {
        let dump = self.dump_command(require_program("pg_dump")?);

        let name = format!("{}.pgdump", target.stem);
        let output = PartialFile::create(target.path_for(&name))?;
        info!("Running: {}", dump);
        run_pipeline(&[dump], None, output.path())?;
        output.commit();

        Ok(name)
    }
}

#[async_trait]
impl BackupProducer for PgDumpProducer {
    fn kind(&self) -> &'static str {
        "pgdump"
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
        let options: PgDumpOptions = toml::from_str(
            r#"
            dbname = "billing"
            dbpass = "s3cret"
            command_opts = ["--format=custom"]
            "#,
        )
        .unwrap();
        assert_eq!(options.dbhost, "127.0.0.1");
        assert_eq!(options.dbuser, "postgres");

        let command = PgDumpProducer::new(options).dump_command(PathBuf::from("/usr/bin/pg_dump"));
        assert_eq!(
            command.args,
            vec![
                "--host=127.0.0.1",
                "--username=postgres",
                "--no-password",
                "--format=custom",
                "billing"
            ]
        );
        assert_eq!(command.envs, vec![("PGPASSWORD".to_string(), "s3cret".to_string())]);
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let result: std::result::Result<PgDumpOptions, _> = toml::from_str(
            r#"
            dbname = "billing"
            db_pass = "typo"
            "#,
        );
        assert!(result.is_err());
    }
}
