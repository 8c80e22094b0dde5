//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Config file name inside the per-user config directory.
const CONFIG_FILE: &str = "config.json";
const APP_DIR: &str = "flicswitch";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
  /// Video looped while idle.
  #[serde(default)]
  pub background_video: PathBuf,

  /// Video played once per button press.
  #[serde(default)]
  pub demo_video: PathBuf,

  /// System volume while the background video plays (0-100).
  #[serde(default = "default_background_volume")]
  pub background_volume: u8,

  /// System volume while the demo video plays (0-100).
  #[serde(default = "default_demo_volume")]
  pub demo_volume: u8,

  /// Display index the player goes fullscreen on.
  #[serde(default)]
  pub display_index: u32,

  /// Custom player executable path (None = auto-detect).
  #[serde(default)]
  pub player_path: Option<String>,

  /// Additional player command-line arguments.
  #[serde(default)]
  pub player_args: Vec<String>,

  /// Drive the system mixer.
  #[serde(default = "default_true")]
  pub volume_control: bool,

  /// Seconds to wait for a graceful exit before force killing.
  #[serde(default = "default_graceful_stop_timeout_secs")]
  pub graceful_stop_timeout_secs: f64,

  /// Time the player gets to come up before its liveness is trusted.
  #[serde(default = "default_start_settle_ms")]
  pub start_settle_ms: u64,

  /// End-of-playback poll interval.
  #[serde(default = "default_monitor_poll_ms")]
  pub monitor_poll_ms: u64,

  /// Delay before raising the volume for a demo louder than the background.
  #[serde(default = "default_volume_ramp_delay_ms")]
  pub volume_ramp_delay_ms: u64,
}

fn default_background_volume() -> u8 {
  50
}

fn default_demo_volume() -> u8 {
  75
}

fn default_true() -> bool {
  true
}

fn default_graceful_stop_timeout_secs() -> f64 {
  3.0
}

fn default_start_settle_ms() -> u64 {
  500
}

fn default_monitor_poll_ms() -> u64 {
  500
}

fn default_volume_ramp_delay_ms() -> u64 {
  500
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      background_video: PathBuf::new(),
      demo_video: PathBuf::new(),
      background_volume: default_background_volume(),
      demo_volume: default_demo_volume(),
      display_index: 0,
      player_path: None,
      player_args: Vec::new(),
      volume_control: true,
      graceful_stop_timeout_secs: default_graceful_stop_timeout_secs(),
      start_settle_ms: default_start_settle_ms(),
      monitor_poll_ms: default_monitor_poll_ms(),
      volume_ramp_delay_ms: default_volume_ramp_delay_ms(),
    }
  }
}

impl AppConfig {
  /// Default config file location.
  pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
  }

  /// Load configuration.
  ///
  /// An explicit `path` must exist. Without one the default location is
  /// tried and defaults are used when no file is there.
  pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
    let (path, required) = match path {
      Some(path) => (path.to_path_buf(), true),
      None => match Self::default_path() {
        Some(path) => (path, false),
        None => return Ok(Self::default()),
      },
    };

    if !required && !path.exists() {
      log::debug!("No config file at {:?}, using defaults", path);
      return Ok(Self::default());
    }

    let contents = std::fs::read_to_string(&path).map_err(|source| AppError::ConfigRead {
      path: path.clone(),
      source,
    })?;
    let config = serde_json::from_str(&contents).map_err(|source| AppError::ConfigParse {
      path: path.clone(),
      source,
    })?;
    log::info!("Loaded config from {:?}", path);
    Ok(config)
  }

  /// Explicit player path, ignoring empty strings.
  pub fn player_path(&self) -> Option<PathBuf> {
    self
      .player_path
      .as_ref()
      .filter(|s| !s.trim().is_empty())
      .map(PathBuf::from)
  }

  pub fn graceful_stop_timeout(&self) -> Duration {
    Duration::from_secs_f64(self.graceful_stop_timeout_secs)
  }

  pub fn start_settle(&self) -> Duration {
    Duration::from_millis(self.start_settle_ms)
  }

  pub fn monitor_poll_interval(&self) -> Duration {
    Duration::from_millis(self.monitor_poll_ms)
  }

  pub fn volume_ramp_delay(&self) -> Duration {
    Duration::from_millis(self.volume_ramp_delay_ms)
  }

  /// Validate configuration values.
  pub fn validate(&self) -> Result<(), String> {
    if self.background_video.as_os_str().is_empty() {
      return Err("Background video path cannot be empty".to_string());
    }
    if self.demo_video.as_os_str().is_empty() {
      return Err("Demo video path cannot be empty".to_string());
    }
    if self.background_volume > 100 || self.demo_volume > 100 {
      return Err("Volumes must be between 0 and 100".to_string());
    }
    if !self.graceful_stop_timeout_secs.is_finite() || self.graceful_stop_timeout_secs <= 0.0 {
      return Err("Graceful stop timeout must be a positive number of seconds".to_string());
    }
    if self.monitor_poll_ms == 0 {
      return Err("Monitor poll interval must be at least 1 ms".to_string());
    }
    Ok(())
  }
}
