//! External program helpers shared by the producers and the encryptor.
//!
//! All functions here block; callers run them inside
//! `tokio::task::spawn_blocking`.

use rotabak_core::{CoreError, Result};
use serde::Deserialize;
use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use tracing::debug;

/// Locate the executable `program` in the directories listed in `PATH`.
pub fn find_in_path(program: &str) -> Option<PathBuf> {
    let search_path = std::env::var_os("PATH")?;
    find_in(program, &search_path)
}

fn find_in(program: &str, search_path: &OsStr) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    which::which_in(program, Some(search_path), cwd).ok()
}

pub fn require_program(program: &str) -> Result<PathBuf> {
    find_in_path(program).ok_or_else(|| {
        CoreError::Command(format!(
            "Command '{}' not found in PATH. Check {} is installed and in PATH",
            program, program
        ))
    })
}

/// Compressors a stream can be piped through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressProgram {
    #[default]
    Xz,
    Gzip,
    Bzip2,
    Lzop,
    Lz4,
    Zstd,
}

impl CompressProgram {
    pub fn program(self) -> &'static str {
        match self {
            CompressProgram::Xz => "xz",
            CompressProgram::Gzip => "gzip",
            CompressProgram::Bzip2 => "bzip2",
            CompressProgram::Lzop => "lzop",
            CompressProgram::Lz4 => "lz4",
            CompressProgram::Zstd => "zstd",
        }
    }

    /// Conventional file extension of the compressed output
    pub fn extension(self) -> &'static str {
        match self {
            CompressProgram::Xz => "xz",
            CompressProgram::Gzip => "gz",
            CompressProgram::Bzip2 => "bz2",
            CompressProgram::Lzop => "lzo",
            CompressProgram::Lz4 => "lz4",
            CompressProgram::Zstd => "zst",
        }
    }

    /// Command reading stdin and writing the compressed stream to stdout.
    pub fn stage(self, opts: &[String]) -> Result<CommandSpec> {
        let mut spec = CommandSpec::new(require_program(self.program())?);
        spec.args.push("--stdout".to_string());
        spec.args.extend(opts.iter().cloned());
        Ok(spec)
    }
}

/// One program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command
    }
}

// Environment values are not displayed.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Run `stages` as a shell-style pipeline, feeding the first stage from
/// `input` (or nothing) and writing the last stage's stdout to `output`.
/// Every stage must exit successfully.
pub fn run_pipeline(stages: &[CommandSpec], input: Option<&Path>, output: &Path) -> Result<()> {
    let Some(last) = stages.len().checked_sub(1) else {
        return Err(CoreError::Command("empty pipeline".to_string()));
    };
    let sink = File::create(output)?;

    let mut children: Vec<(String, Child)> = Vec::with_capacity(stages.len());
    let mut upstream: Option<Stdio> = match input {
        Some(path) => Some(Stdio::from(File::open(path)?)),
        None => None,
    };

    for (index, stage) in stages.iter().enumerate() {
        debug!("Spawning pipeline stage {}: {}", index, stage);
        let mut command = stage.command();
        command.stdin(upstream.take().unwrap_or_else(Stdio::null));
        if index == last {
            command.stdout(Stdio::from(sink.try_clone()?));
        } else {
            command.stdout(Stdio::piped());
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                abort(&mut children);
                return Err(CoreError::Command(format!("failed to start '{}': {}", stage, e)));
            }
        };
        if index != last {
            upstream = child.stdout.take().map(Stdio::from);
        }
        children.push((stage.to_string(), child));
    }
    drop(sink);

    let mut failed = Vec::new();
    for (name, mut child) in children {
        let status = child.wait()?;
        debug!("Pipeline stage exited: [{}] status=[{}]", name, status);
        if !status.success() {
            failed.push(format!("'{}' ({})", name, status));
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Command(format!("FAILED commands: {}", failed.join(", "))))
    }
}

/// Run one command, returning its combined stdout and stderr. A non-zero
/// exit status is an error carrying that output.
pub fn run_captured(spec: &CommandSpec) -> Result<String> {
    let output = execute(spec)?;
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(text)
}

/// Like [`run_captured`] but returns stdout alone, for commands whose
/// output gets parsed.
pub fn run_stdout(spec: &CommandSpec) -> Result<String> {
    let output = execute(spec)?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn execute(spec: &CommandSpec) -> Result<Output> {
    debug!("Running: {}", spec);
    let output = spec
        .command()
        .stdin(Stdio::null())
        .output()
        .map_err(|e| CoreError::Command(format!("failed to start '{}': {}", spec, e)))?;

    if output.status.success() {
        return Ok(output);
    }
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    Err(CoreError::Command(format!(
        "'{}' exited with {}\n{}",
        spec,
        output.status,
        text.trim_end()
    )))
}

fn abort(children: &mut Vec<(String, Child)>) {
    for (name, child) in children.iter_mut() {
        if let Err(e) = child.kill() {
            debug!("Could not kill '{}': {}", name, e);
        }
        let _ = child.wait();
    }
    children.clear();
}
