//! The two videos the controller switches between.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::AppConfig;

/// Which of the two configured videos a profile describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Identity {
  Background,
  Demo,
}

impl fmt::Display for Identity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Identity::Background => f.write_str("background"),
      Identity::Demo => f.write_str("demo"),
    }
  }
}

/// Everything needed to play one video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoProfile {
  pub identity: Identity,
  pub path: PathBuf,
  /// Loop forever instead of exiting at the end of the file.
  pub looping: bool,
  /// System output volume while this video plays (0-100).
  pub volume_percent: u8,
}

impl VideoProfile {
  /// File name for log output.
  pub fn display_name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| self.path.display().to_string())
  }
}

/// The background/demo pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profiles {
  pub background: VideoProfile,
  pub demo: VideoProfile,
}

impl Profiles {
  pub fn from_config(config: &AppConfig) -> Self {
    Self {
      background: VideoProfile {
        identity: Identity::Background,
        path: config.background_video.clone(),
        looping: true,
        volume_percent: config.background_volume,
      },
      demo: VideoProfile {
        identity: Identity::Demo,
        path: config.demo_video.clone(),
        looping: false,
        volume_percent: config.demo_volume,
      },
    }
  }

  pub fn get(&self, identity: Identity) -> &VideoProfile {
    match identity {
      Identity::Background => &self.background,
      Identity::Demo => &self.demo,
    }
  }
}
