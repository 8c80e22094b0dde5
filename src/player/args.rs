//! Player command-line construction.
//!
//! Reference: https://mpv.io/manual/master/#options

use crate::profile::VideoProfile;

/// Launch settings shared by every profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
  /// Display the window (and fullscreen) is placed on.
  pub display_index: u32,
  /// User-specified extra arguments, inserted before the media path.
  pub extra_args: Vec<String>,
}

impl LaunchOptions {
  /// Build the full argument list for `profile`.
  ///
  /// The media path is always the final argument and is preceded by `--`
  /// so paths starting with a dash are not read as options.
  pub fn args_for(&self, profile: &VideoProfile) -> Vec<String> {
    let mut args = vec![
      "--fullscreen".to_string(),
      "--no-osc".to_string(),
      "--no-border".to_string(),
      "--ontop".to_string(),
      format!("--screen={}", self.display_index),
      format!("--fs-screen={}", self.display_index),
      "--quiet".to_string(),
    ];

    if profile.looping {
      args.push("--loop-file=inf".to_string());
    }

    args.extend(self.extra_args.iter().cloned());

    args.push("--".to_string());
    args.push(profile.path.to_string_lossy().into_owned());
    args
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::profile::Identity;
  use std::path::PathBuf;

  fn profile(looping: bool) -> VideoProfile {
    VideoProfile {
      identity: Identity::Background,
      path: PathBuf::from("/videos/loop.mp4"),
      looping,
      volume_percent: 50,
    }
  }

  #[test]
  fn test_looping_profile_args() {
    let options = LaunchOptions {
      display_index: 1,
      extra_args: Vec::new(),
    };
    let args = options.args_for(&profile(true));

    assert!(args.contains(&"--fullscreen".to_string()));
    assert!(args.contains(&"--no-osc".to_string()));
    assert!(args.contains(&"--no-border".to_string()));
    assert!(args.contains(&"--ontop".to_string()));
    assert!(args.contains(&"--quiet".to_string()));
    assert!(args.contains(&"--screen=1".to_string()));
    assert!(args.contains(&"--fs-screen=1".to_string()));
    assert!(args.contains(&"--loop-file=inf".to_string()));
    assert_eq!(args.last().map(String::as_str), Some("/videos/loop.mp4"));
  }

  #[test]
  fn test_play_once_has_no_loop_flag() {
    let args = LaunchOptions::default().args_for(&profile(false));
    assert!(!args.iter().any(|a| a.starts_with("--loop")));
    assert!(args.contains(&"--screen=0".to_string()));
  }

  #[test]
  fn test_extra_args_precede_path() {
    let options = LaunchOptions {
      display_index: 0,
      extra_args: vec!["--hwdec=auto".to_string()],
    };
    let args = options.args_for(&profile(true));
    let extra = args.iter().position(|a| a == "--hwdec=auto").unwrap();
    let separator = args.iter().position(|a| a == "--").unwrap();
    assert!(extra < separator);
    assert_eq!(separator, args.len() - 2);
  }
}
