//! Playback state and the session owned by the controller.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::player::ProcessHandle;
use crate::profile::{Identity, VideoProfile};

/// Which video should be showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "target")]
pub enum PlaybackState {
  /// Nothing started yet.
  Idle,
  /// Background video looping.
  Background,
  /// Demo video playing once.
  Demo,
  /// A start for the given video is in flight.
  Transitioning(Identity),
  /// Stopped by the operator, or left without a player by a failed start.
  Stopped,
  /// Shut down; no further triggers are handled.
  Terminated,
}

impl fmt::Display for PlaybackState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PlaybackState::Idle => f.write_str("idle"),
      PlaybackState::Background => f.write_str("background"),
      PlaybackState::Demo => f.write_str("demo"),
      PlaybackState::Transitioning(target) => write!(f, "transitioning to {}", target),
      PlaybackState::Stopped => f.write_str("stopped"),
      PlaybackState::Terminated => f.write_str("terminated"),
    }
  }
}

/// Snapshot published after every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackStatus {
  pub state: PlaybackState,
  pub active: Option<Identity>,
  pub generation: u64,
  pub pid: Option<u32>,
}

impl Default for PlaybackStatus {
  fn default() -> Self {
    Self {
      state: PlaybackState::Idle,
      active: None,
      generation: 0,
      pid: None,
    }
  }
}

/// Session counter, bumped on every start attempt.
///
/// Cloned into monitors so they can tell when their session is superseded;
/// only the controller advances it.
#[derive(Debug, Clone, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
  pub fn current(&self) -> u64 {
    self.0.load(Ordering::Acquire)
  }

  pub(crate) fn advance(&self) -> u64 {
    self.0.fetch_add(1, Ordering::AcqRel) + 1
  }
}

/// The one mutable playback session.
#[derive(Debug, Default)]
pub struct PlaybackSession {
  pub active_profile: Option<VideoProfile>,
  pub process: Option<ProcessHandle>,
  pub generation: Generation,
}

impl PlaybackSession {
  /// Whether the session holds a process that is still running.
  pub fn is_live(&self) -> bool {
    self.process.as_ref().is_some_and(|p| p.is_alive())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_generation_is_shared_and_monotonic() {
    let generation = Generation::default();
    let view = generation.clone();

    assert_eq!(generation.advance(), 1);
    assert_eq!(generation.advance(), 2);
    assert_eq!(view.current(), 2);
  }

  #[test]
  fn test_status_serialization() {
    let status = PlaybackStatus {
      state: PlaybackState::Transitioning(Identity::Demo),
      active: Some(Identity::Background),
      generation: 3,
      pid: Some(42),
    };
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["state"]["state"], "transitioning");
    assert_eq!(json["state"]["target"], "demo");
    assert_eq!(json["active"], "background");
    assert_eq!(json["generation"], 3);
  }
}
