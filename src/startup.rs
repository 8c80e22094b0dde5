//! Checks that must pass before any playback starts.

use std::path::PathBuf;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::player::Launcher;
use crate::profile::Identity;

/// Verify both videos exist and the player can be found.
///
/// Returns the player executable. Nothing is spawned on failure.
pub fn preflight(config: &AppConfig, launcher: &dyn Launcher) -> Result<PathBuf, AppError> {
  for (identity, path) in [
    (Identity::Background, &config.background_video),
    (Identity::Demo, &config.demo_video),
  ] {
    if !path.exists() {
      log::error!("{} video not found: {:?}", identity, path);
      log::error!("Please check that the file exists at this exact path");
      return Err(AppError::VideoNotFound {
        identity,
        path: path.clone(),
      });
    }
    log::info!(
      "{} video found: {}",
      identity,
      path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    );
  }

  launcher.locate().ok_or(AppError::PlayerNotFound)
}
