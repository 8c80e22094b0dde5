//! Player module - spawns and supervises the external mpv process.
//!
//! Architecture:
//! - `process.rs` - executable detection and the `Launcher`/`PlayerProcess` seam
//! - `args.rs` - command-line construction for a video profile
//! - `handle.rs` - the live process handle and its read-only liveness probe
//! - `control.rs` - start/replace/stop with graceful-then-forced termination

mod args;
mod control;
mod handle;
mod process;

#[cfg(test)]
pub(crate) mod fake;

pub use args::LaunchOptions;
pub use control::{Player, StartError, StopError, StopOutcome};
pub use handle::{LivenessProbe, ProcessHandle};
pub use process::{find_mpv, Launcher, PlayerProcess, ProcessExit, SystemLauncher};
