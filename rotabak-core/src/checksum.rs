//! Checksum sidecar files.
//!
//! A sidecar sits next to its artifact as `<artifact>.<algorithm>` and holds
//! one line in the usual `sha256sum` format: `<hex digest>  <artifact>`.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use crate::{CoreError, Result};

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumKind {
    /// Every algorithm recognised as a sidecar extension, in extension order.
    pub const ALL: [ChecksumKind; 6] = [
        ChecksumKind::Md5,
        ChecksumKind::Sha1,
        ChecksumKind::Sha224,
        ChecksumKind::Sha256,
        ChecksumKind::Sha384,
        ChecksumKind::Sha512,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ChecksumKind::Md5 => "md5",
            ChecksumKind::Sha1 => "sha1",
            ChecksumKind::Sha224 => "sha224",
            ChecksumKind::Sha256 => "sha256",
            ChecksumKind::Sha384 => "sha384",
            ChecksumKind::Sha512 => "sha512",
        }
    }

    pub fn sidecar_name(self, artifact: &str) -> String {
        format!("{}.{}", artifact, self.extension())
    }

    /// Whether this build can produce the digest (md5 sidecars are only
    /// recognised when listing).
    pub fn is_computable(self) -> bool {
        !matches!(self, ChecksumKind::Md5)
    }

    fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.extension() == ext)
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ChecksumKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(&s.to_ascii_lowercase())
            .ok_or_else(|| CoreError::UnsupportedChecksum(s.to_string()))
    }
}

/// Algorithm of a sidecar file name, if the name is one.
pub fn sidecar_kind(name: &str) -> Option<ChecksumKind> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() {
        return None;
    }
    ChecksumKind::from_extension(ext)
}

pub fn is_sidecar(name: &str) -> bool {
    sidecar_kind(name).is_some()
}

/// Compute the digest of `dir/artifact` and write its sidecar next to it.
/// Returns the sidecar file name.
pub fn write_sidecar(dir: &Path, artifact: &str, kind: ChecksumKind) -> Result<String> {
    let source = dir.join(artifact);
    let digest = match kind {
        ChecksumKind::Md5 => return Err(CoreError::UnsupportedChecksum(kind.to_string())),
        ChecksumKind::Sha1 => digest_file::<Sha1>(&source)?,
        ChecksumKind::Sha224 => digest_file::<Sha224>(&source)?,
        ChecksumKind::Sha256 => digest_file::<Sha256>(&source)?,
        ChecksumKind::Sha384 => digest_file::<Sha384>(&source)?,
        ChecksumKind::Sha512 => digest_file::<Sha512>(&source)?,
    };

    let sidecar = kind.sidecar_name(artifact);
    std::fs::write(dir.join(&sidecar), format!("{}  {}\n", digest, artifact))?;
    Ok(sidecar)
}

fn digest_file<D: Digest>(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sidecar_detection() {
        assert_eq!(sidecar_kind("etc-20240605.tar.xz.sha256"), Some(ChecksumKind::Sha256));
        assert_eq!(sidecar_kind("etc-20240605.tar.xz.md5"), Some(ChecksumKind::Md5));
        assert!(!is_sidecar("etc-20240605.tar.xz"));
        assert!(!is_sidecar("etc-20240605.sha256sum"));
        assert!(!is_sidecar(".sha256"));
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("SHA512".parse::<ChecksumKind>().unwrap(), ChecksumKind::Sha512);
        assert!("crc32".parse::<ChecksumKind>().is_err());
    }

    #[test]
    fn test_write_sha256_sidecar() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("data-20240101.bin"), b"abc")?;

        let sidecar = write_sidecar(dir.path(), "data-20240101.bin", ChecksumKind::Sha256)?;
        assert_eq!(sidecar, "data-20240101.bin.sha256");

        let content = std::fs::read_to_string(dir.path().join(&sidecar))?;
        assert_eq!(
            content,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad  data-20240101.bin\n"
        );
        Ok(())
    }

    #[test]
    fn test_write_sha1_sidecar() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("a-20240101"), b"abc")?;

        let sidecar = write_sidecar(dir.path(), "a-20240101", ChecksumKind::Sha1)?;
        let content = std::fs::read_to_string(dir.path().join(sidecar))?;
        assert!(content.starts_with("a9993e364706816aba3e25717850c26c9cd0d89d  "));
        Ok(())
    }

    #[test]
    fn test_md5_cannot_be_produced() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a-20240101"), b"abc").unwrap();
        let result = write_sidecar(dir.path(), "a-20240101", ChecksumKind::Md5);
        assert!(matches!(result, Err(CoreError::UnsupportedChecksum(_))));
        assert!(!dir.path().join("a-20240101.md5").exists());
    }

    #[test]
    fn test_missing_artifact_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = write_sidecar(dir.path(), "missing", ChecksumKind::Sha256);
        assert!(matches!(result, Err(CoreError::Io(_))));
    }
}
