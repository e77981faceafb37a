//! Configuration errors. Everything here is fatal and reported before any
//! entry is processed.

use std::path::PathBuf;

use crate::exit::ExitStatus;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Configuration not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("No configuration fragments (*.toml) in {}", .0.display())]
    NoFragments(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to scan configuration directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in {scope}: {message}")]
    Invalid { scope: String, message: String },
}

impl ConfigError {
    pub fn invalid(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            scope: scope.into(),
            message: message.into(),
        }
    }

    pub fn exit_status(&self) -> ExitStatus {
        match self {
            ConfigError::NotFound(_)
            | ConfigError::NoFragments(_)
            | ConfigError::Read { .. }
            | ConfigError::Walk(_) => ExitStatus::ConfigUnreadable,
            ConfigError::Parse { .. } | ConfigError::Invalid { .. } => ExitStatus::ConfigInvalid,
        }
    }
}
