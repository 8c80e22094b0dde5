//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

/// Loops a background video and plays a demo video on each button press.
#[derive(Debug, Parser)]
#[command(name = "flicswitch", version, about)]
pub struct Cli {
  /// Background video (looped).
  pub background: Option<PathBuf>,

  /// Demo video (played once per press).
  pub demo: Option<PathBuf>,

  /// Config file (JSON). Defaults to the user config directory.
  #[arg(short, long)]
  pub config: Option<PathBuf>,

  /// Player executable.
  #[arg(long)]
  pub player: Option<PathBuf>,

  /// Display index for fullscreen playback.
  #[arg(long)]
  pub display: Option<u32>,

  /// Background volume in percent.
  #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
  pub background_volume: Option<u8>,

  /// Demo volume in percent.
  #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
  pub demo_volume: Option<u8>,

  /// Leave the system volume alone.
  #[arg(long)]
  pub no_volume: bool,

  /// Do not read commands from stdin.
  #[arg(long)]
  pub no_stdin: bool,

  /// Log level (error, warn, info, debug, trace).
  #[arg(long, default_value = "info")]
  pub log_level: log::LevelFilter,

  /// Extra arguments passed to the player.
  #[arg(last = true)]
  pub player_args: Vec<String>,
}

impl Cli {
  /// Apply command-line overrides on top of the loaded config.
  pub fn apply(&self, config: &mut AppConfig) {
    if let Some(path) = &self.background {
      config.background_video = path.clone();
    }
    if let Some(path) = &self.demo {
      config.demo_video = path.clone();
    }
    if let Some(player) = &self.player {
      config.player_path = Some(player.to_string_lossy().into_owned());
    }
    if let Some(display) = self.display {
      config.display_index = display;
    }
    if let Some(volume) = self.background_volume {
      config.background_volume = volume;
    }
    if let Some(volume) = self.demo_volume {
      config.demo_volume = volume;
    }
    if self.no_volume {
      config.volume_control = false;
    }
    if !self.player_args.is_empty() {
      config.player_args = self.player_args.clone();
    }
  }
}
