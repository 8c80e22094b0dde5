//! Playback module - decides which video is showing and drives the player.
//!
//! Architecture:
//! - `state.rs` - playback state, published status and the session
//! - `monitor.rs` - end-of-playback poller for the demo video
//! - `controller.rs` - the single-consumer trigger loop and its transitions

mod controller;
mod monitor;
mod state;

pub use controller::{CleanupError, Controller, ControllerSettings};
pub use monitor::{EndOfPlaybackMonitor, MonitorExit, MonitorToken};
pub use state::{Generation, PlaybackSession, PlaybackState, PlaybackStatus};
