//! Startup and top-level errors.

use std::path::PathBuf;

use thiserror::Error;

use crate::playback::CleanupError;
use crate::player::StartError;
use crate::profile::Identity;

/// Errors that end the program.
#[derive(Debug, Error)]
pub enum AppError {
  #[error("Failed to read config {path:?}: {source}")]
  ConfigRead {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("Invalid config {path:?}: {source}")]
  ConfigParse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("{identity} video not found: {path:?}")]
  VideoNotFound { identity: Identity, path: PathBuf },

  #[error("Player executable not found (install mpv, add it to PATH or set playerPath)")]
  PlayerNotFound,

  #[error("Failed to start background video: {0}")]
  Start(#[from] StartError),

  #[error(transparent)]
  Cleanup(#[from] CleanupError),

  #[error("Runtime error: {0}")]
  Runtime(#[from] std::io::Error),

  #[error("Failed to initialize logging: {0}")]
  Logging(#[from] log::SetLoggerError),
}
