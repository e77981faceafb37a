//! rotabak - Main entry point
//!
//! Runs every configured backup entry once: create, encrypt, checksum,
//! rotate, then mirror to the remote side.

mod config;
mod error;
mod exit;
mod plugins;
mod resolve;
mod utils;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use rotabak_core::context::detect_hostname;
use rotabak_core::{RunController, RunContext};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use crate::exit::ExitStatus;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file, or directory of *.toml fragments
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Also write the log to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let status = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitStatus::Success,
                _ => ExitStatus::InvalidArguments,
            };
            let _ = e.print();
            return status.into();
        }
    };

    let _ = dotenvy::dotenv();

    if let Err(e) = utils::logger::init(&args.log_level, args.log_file.as_deref()) {
        eprintln!("{:#}", e);
        return ExitStatus::Unexpected.into();
    }

    match run(args) {
        Ok(status) => status.into(),
        Err(e) => {
            error!("{:#}", e);
            ExitStatus::Unexpected.into()
        }
    }
}

fn run(args: Args) -> anyhow::Result<ExitStatus> {
    let config_path = args
        .config
        .or_else(|| std::env::var_os("ROTABAK_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));

    info!(
        "Starting rotabak v{} (config: {})",
        env!("CARGO_PKG_VERSION"),
        config_path.display()
    );

    let hostname = detect_hostname();
    let resolved = match config::load(&config_path).and_then(|c| resolve::resolve(c, &hostname)) {
        Ok(resolved) => resolved,
        Err(e) => {
            error!("{}", e);
            return Ok(e.exit_status());
        }
    };

    extend_path(&resolved.path_extra).context("Failed to extend PATH")?;

    let ctx = RunContext::for_today(resolved.anchors)
        .with_hostname(hostname)
        .with_sleep_between(resolved.sleep_between);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    let report = runtime.block_on(async {
        RunController::new(&ctx, resolved.notifier.as_deref())
            .run(&resolved.entries)
            .await
    });

    info!(
        "Run {} finished: {} processed, {} failed",
        report.run_id,
        report.processed(),
        report.failed()
    );

    Ok(if report.succeeded() {
        ExitStatus::Success
    } else {
        ExitStatus::OperationFailed
    })
}

/// Append `dirs` to `PATH`. Called before the runtime starts so no other
/// thread reads the environment concurrently.
fn extend_path(dirs: &[PathBuf]) -> anyhow::Result<()> {
    if dirs.is_empty() {
        return Ok(());
    }
    let current = std::env::var_os("PATH").unwrap_or_default();
    let joined = join_search_path(&current, dirs)?;
    std::env::set_var("PATH", joined);
    Ok(())
}

fn join_search_path(current: &OsString, extra: &[PathBuf]) -> anyhow::Result<OsString> {
    let paths = std::env::split_paths(current)
        .chain(extra.iter().cloned())
        .filter(|p| p != Path::new(""));
    Ok(std::env::join_paths(paths)?)
}
