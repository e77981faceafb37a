//! Error types for the backup core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid artifact name '{name}': {reason}")]
    InvalidArtifactName { name: String, reason: String },

    #[error("Unsupported checksum algorithm: {0}")]
    UnsupportedChecksum(String),

    #[error("Ownership error: {0}")]
    Ownership(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Backup error: {0}")]
    Backup(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, CoreError>;
