//! Off-site copies in an S3 bucket, driven through the `aws` command line
//! client.
//!
//! Objects are stored at the bucket root under their artifact file name.
//! Credentials come from the usual AWS environment and configuration files
//! unless an access key is configured for the bucket.

use async_trait::async_trait;
use rotabak_core::capability::{ObjectStore, RemoteTransport, StoredObject};
use rotabak_core::{CoreError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::command::{require_program, run_captured, run_stdout, CommandSpec};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3RemoteOptions {
    pub bucket: String,
    pub region: String,

    #[serde(default)]
    pub access_key: Option<S3AccessKey>,

    /// `aws` executable; looked up in `PATH` when unset
    #[serde(default)]
    pub cli_path: Option<PathBuf>,
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3AccessKey {
    pub public: String,
    pub secret: String,
}

impl std::fmt::Debug for S3AccessKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3AccessKey")
            .field("public", &self.public)
            .field("secret", &"***")
            .finish()
    }
}

/// The part of `aws s3api list-objects-v2` output used here.
#[derive(Debug, Default, Deserialize)]
struct ObjectListing {
    #[serde(rename = "Contents", default)]
    contents: Vec<ListedObject>,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size")]
    size: u64,
}

#[derive(Debug, Clone)]
pub struct S3Remote {
    options: S3RemoteOptions,
}

impl S3Remote {
    pub fn new(options: S3RemoteOptions) -> Self {
        Self { options }
    }

    fn aws(&self) -> Result<CommandSpec> {
        let program = match &self.options.cli_path {
            Some(path) => path.clone(),
            None => require_program("aws")?,
        };
        let mut command = CommandSpec::new(program);
        if let Some(key) = &self.options.access_key {
            command = command
                .env("AWS_ACCESS_KEY_ID", key.public.as_str())
                .env("AWS_SECRET_ACCESS_KEY", key.secret.as_str());
        }
        Ok(command)
    }

    fn list_command(&self) -> Result<CommandSpec> {
        Ok(self
            .aws()?
            .args(["s3api", "list-objects-v2", "--output", "json"])
            .args(["--bucket", self.options.bucket.as_str()])
            .args(["--region", self.options.region.as_str()]))
    }

    fn upload_command(&self, local_path: &Path, name: &str) -> Result<CommandSpec> {
        Ok(self
            .aws()?
            .args(["s3", "cp", "--only-show-errors"])
            .arg(local_path.to_string_lossy())
            .arg(format!("s3://{}/{}", self.options.bucket, name))
            .args(["--region", self.options.region.as_str()]))
    }

    fn delete_command(&self, name: &str) -> Result<CommandSpec> {
        Ok(self
            .aws()?
            .args(["s3api", "delete-object"])
            .args(["--bucket", self.options.bucket.as_str()])
            .args(["--key", name])
            .args(["--region", self.options.region.as_str()]))
    }
}

/// Parse a listing; an empty bucket may print nothing at all.
fn parse_listing(output: &str) -> Result<Vec<StoredObject>> {
    if output.trim().is_empty() {
        return Ok(Vec::new());
    }
    let listing: ObjectListing = serde_json::from_str(output)
        .map_err(|e| CoreError::Transport(format!("unreadable S3 listing: {}", e)))?;
    Ok(listing
        .contents
        .into_iter()
        .map(|object| StoredObject::new(object.key, object.size))
        .collect())
}

async fn run_blocking<T, F>(job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await?
        .map_err(|e| match e {
            CoreError::Transport(_) => e,
            other => CoreError::Transport(other.to_string()),
        })
}

#[async_trait]
impl ObjectStore for S3Remote {
    fn describe(&self) -> String {
        format!("s3://{} ({})", self.options.bucket, self.options.region)
    }

    async fn list_objects(&self) -> Result<Vec<StoredObject>> {
        let command = self.list_command()?;
        run_blocking(move || parse_listing(&run_stdout(&command)?)).await
    }

    async fn delete_object(&self, name: &str) -> Result<()> {
        let command = self.delete_command(name)?;
        run_blocking(move || run_captured(&command).map(|_| ())).await
    }
}

#[async_trait]
impl RemoteTransport for S3Remote {
    async fn upload(&self, local_path: &Path) -> Result<()> {
        let name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CoreError::Transport(format!("invalid upload path {}", local_path.display())))?;
        debug!("Uploading {} to {}", local_path.display(), self.describe());

        let command = self.upload_command(local_path, name)?;
        run_blocking(move || run_captured(&command).map(|_| ())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotabak_core::ArtifactCatalog;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const LISTING: &str = r#"{
        "Contents": [
            {"Key": "etc-20240609.tar.xz", "Size": 1024, "StorageClass": "STANDARD"},
            {"Key": "etc-20240609.tar.xz.sha256", "Size": 84, "StorageClass": "STANDARD"},
            {"Key": "notes.txt", "Size": 3, "StorageClass": "STANDARD"}
        ],
        "RequestCharged": null
    }"#;

    fn options(cli_path: Option<PathBuf>) -> S3RemoteOptions {
        S3RemoteOptions {
            bucket: "offsite-backups".to_string(),
            region: "eu-west-1".to_string(),
            access_key: None,
            cli_path,
        }
    }

    /// Stand-in for the `aws` client: logs its arguments, prints `LISTING`
    /// for list requests and fails for keys containing "locked".
    fn fake_cli(dir: &TempDir) -> (PathBuf, PathBuf) {
        let log = dir.path().join("calls.log");
        let listing = dir.path().join("listing.json");
        std::fs::write(&listing, LISTING).unwrap();
        let script = format!(
            "#!/bin/sh\n\
             echo \"$*\" >> '{log}'\n\
             case \"$*\" in\n\
               *locked*) echo 'AccessDenied' >&2; exit 255 ;;\n\
               *list-objects-v2*) cat '{listing}' ;;\n\
             esac\n",
            log = log.display(),
            listing = listing.display()
        );
        let cli = dir.path().join("aws");
        std::fs::write(&cli, script).unwrap();
        std::fs::set_permissions(&cli, std::fs::Permissions::from_mode(0o755)).unwrap();
        (cli, log)
    }

    #[test]
    fn test_parse_listing() {
        let objects = parse_listing(LISTING).unwrap();
        assert_eq!(objects.len(), 3);
        assert_eq!(objects[0], StoredObject::new("etc-20240609.tar.xz", 1024));
        assert!(parse_listing("").unwrap().is_empty());
        assert!(parse_listing("{}").unwrap().is_empty());
        assert!(matches!(parse_listing("<html>"), Err(CoreError::Transport(_))));
    }

    #[test]
    fn test_command_layout() {
        let mut options = options(Some(PathBuf::from("/usr/local/bin/aws")));
        options.access_key = Some(S3AccessKey {
            public: "AKIAEXAMPLE".to_string(),
            secret: "wJalrXUtnFEMI".to_string(),
        });
        let remote = S3Remote::new(options);

        let upload = remote
            .upload_command(Path::new("/srv/etc/etc-20240610.tar.xz"), "etc-20240610.tar.xz")
            .unwrap();
        assert_eq!(
            upload.args,
            vec![
                "s3",
                "cp",
                "--only-show-errors",
                "/srv/etc/etc-20240610.tar.xz",
                "s3://offsite-backups/etc-20240610.tar.xz",
                "--region",
                "eu-west-1"
            ]
        );
        assert!(upload.envs.contains(&("AWS_SECRET_ACCESS_KEY".to_string(), "wJalrXUtnFEMI".to_string())));
        assert!(!upload.to_string().contains("wJalrXUtnFEMI"));
        assert!(!format!("{:?}", remote.options.access_key).contains("wJalrXUtnFEMI"));

        let delete = remote.delete_command("etc-20240101.tar.xz").unwrap();
        assert_eq!(
            delete.args,
            vec![
                "s3api",
                "delete-object",
                "--bucket",
                "offsite-backups",
                "--key",
                "etc-20240101.tar.xz",
                "--region",
                "eu-west-1"
            ]
        );
    }

    #[tokio::test]
    async fn test_remote_operations_through_cli() {
        let dir = TempDir::new().unwrap();
        let (cli, log) = fake_cli(&dir);
        let remote = S3Remote::new(options(Some(cli)));

        let catalog = ArtifactCatalog::list(&remote, "etc").await.unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.iter().next().unwrap().checksum_list(), "sha256");

        let local = dir.path().join("etc-20240610.tar.xz");
        std::fs::write(&local, b"archive").unwrap();
        remote.upload(&local).await.unwrap();
        remote.delete_object("etc-20240101.tar.xz").await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].contains("s3://offsite-backups/etc-20240610.tar.xz"));
        assert!(calls[2].contains("--key etc-20240101.tar.xz"));
    }

    #[tokio::test]
    async fn test_cli_failure_is_transport_error() {
        let dir = TempDir::new().unwrap();
        let (cli, _log) = fake_cli(&dir);
        let remote = S3Remote::new(options(Some(cli)));

        match remote.delete_object("etc-locked.tar.xz").await {
            Err(CoreError::Transport(message)) => assert!(message.contains("AccessDenied"), "{}", message),
            other => panic!("unexpected result: {:?}", other),
        }

        let missing = S3Remote::new(options(Some(dir.path().join("no-such-aws"))));
        assert!(matches!(missing.list_objects().await, Err(CoreError::Transport(_))));
    }
}
