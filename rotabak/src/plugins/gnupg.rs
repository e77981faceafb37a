//! Public-key encryption of artifacts with GnuPG.

use async_trait::async_trait;
use rotabak_core::capability::Encryptor;
use rotabak_core::fs::PartialFile;
use rotabak_core::{CoreError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::command::{require_program, run_captured, CommandSpec};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GnupgOptions {
    pub recipient: String,

    #[serde(default)]
    pub command_opts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GnupgEncryptor {
    options: GnupgOptions,
}

impl GnupgEncryptor {
    pub fn new(options: GnupgOptions) -> Self {
        Self { options }
    }

    fn encrypt_command(&self, gpg: PathBuf, source: &Path, destination: &Path) -> CommandSpec {
        CommandSpec::new(gpg)
            .args(["--batch", "--yes", "--output"])
            .arg(destination.to_string_lossy())
            .arg("--recipient")
            .arg(self.options.recipient.as_str())
            .args(self.options.command_opts.iter().cloned())
            .arg("--encrypt")
            .arg(source.to_string_lossy())
    }

    fn encrypt_blocking(&self, dir: &Path, artifact: &str) -> Result<String> {
        let gpg = require_program("gpg")?;
        let encrypted = format!("{}.gpg", artifact);
        let source = dir.join(artifact);
        let output = PartialFile::create(dir.join(&encrypted))?;

        let command = self.encrypt_command(gpg, &source, output.path());
        run_captured(&command).map_err(|e| CoreError::Encryption(format!("GnuPG failed: {}", e)))?;
        replace_plaintext(&source, output)?;

        info!("Encrypted {} for {}", encrypted, self.options.recipient);
        Ok(encrypted)
    }
}

/// Delete the plaintext, then keep the ciphertext. If the plaintext cannot
/// be deleted the ciphertext goes away with `output`.
fn replace_plaintext(source: &Path, output: PartialFile) -> Result<()> {
    debug!("Deleting original unencrypted file: {}", source.display());
    std::fs::remove_file(source).map_err(|e| {
        CoreError::Encryption(format!("failed to delete {}: {}", source.display(), e))
    })?;
    output.commit();
    Ok(())
}

#[async_trait]
impl Encryptor for GnupgEncryptor {
    fn kind(&self) -> &'static str {
        "gnupg"
    }

    async fn encrypt(&self, dir: &Path, artifact: &str) -> Result<String> {
        let encryptor = self.clone();
        let dir = dir.to_path_buf();
        let artifact = artifact.to_string();
        tokio::task::spawn_blocking(move || encryptor.encrypt_blocking(&dir, &artifact)).await?
    }
}
