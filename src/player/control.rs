//! Start, stop and replace the player process.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use super::args::LaunchOptions;
use super::handle::ProcessHandle;
use super::process::Launcher;
use crate::profile::VideoProfile;

/// Poll step while waiting for a process to exit.
const EXIT_POLL: Duration = Duration::from_millis(25);

/// How long a killed process gets to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// How long an exited process's stderr gets to reach the reader.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Error, Debug)]
pub enum StartError {
  #[error("Player executable not found")]
  LauncherNotFound,
  #[error("Failed to spawn player: {0}")]
  SpawnFailed(#[source] io::Error),
  #[error("Player exited immediately: {0}")]
  ExitedImmediately(String),
  #[error("Failed to tear down previous player: {0}")]
  ReplaceFailed(#[source] io::Error),
}

#[derive(Error, Debug)]
pub enum StopError {
  #[error("Failed to kill player (pid {pid:?}): {source}")]
  KillFailed {
    pid: Option<u32>,
    #[source]
    source: io::Error,
  },
  #[error("Player (pid {pid:?}) still running after kill")]
  Unresponsive { pid: Option<u32> },
}

/// How a stop request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
  /// The process had already exited; nothing was signalled.
  AlreadyExited,
  /// The process exited after the graceful request.
  Exited,
  /// The process ignored the graceful request and was killed.
  Killed,
}

/// Drives one external player process at a time.
///
/// Holds no process state itself: the caller owns the [`ProcessHandle`]
/// returned by [`Player::start`] and passes it back for replacement or stop.
pub struct Player {
  launcher: Arc<dyn Launcher>,
  options: LaunchOptions,
  settle: Duration,
  executable: Mutex<Option<PathBuf>>,
}

impl Player {
  /// Create a player. `executable` is the path found during preflight, if any.
  pub fn new(
    launcher: Arc<dyn Launcher>,
    options: LaunchOptions,
    settle: Duration,
    executable: Option<PathBuf>,
  ) -> Self {
    Self {
      launcher,
      options,
      settle,
      executable: Mutex::new(executable),
    }
  }

  /// Resolve the executable, locating it again if it was never found or lost.
  async fn executable(&self) -> Result<PathBuf, StartError> {
    if let Some(path) = self.executable.lock().clone() {
      return Ok(path);
    }

    log::info!("Locating player executable...");
    let launcher = self.launcher.clone();
    let found = tokio::task::spawn_blocking(move || launcher.locate())
      .await
      .unwrap_or_else(|e| {
        log::error!("Player lookup task failed: {}", e);
        None
      });

    match found {
      Some(path) => {
        log::info!("Using player at {:?}", path);
        *self.executable.lock() = Some(path.clone());
        Ok(path)
      }
      None => Err(StartError::LauncherNotFound),
    }
  }

  /// Start `profile`, replacing the process in `current`.
  ///
  /// The previous process is killed and reaped before the new one is
  /// spawned. On `LauncherNotFound` and `ReplaceFailed` `current` is left
  /// untouched and `next_generation` is never called; on every other
  /// outcome it is `None` when this returns.
  pub async fn start(
    &self,
    current: &mut Option<ProcessHandle>,
    profile: &VideoProfile,
    next_generation: impl FnOnce() -> u64,
  ) -> Result<ProcessHandle, StartError> {
    let executable = self.executable().await?;

    if let Some(previous) = current.take() {
      if let Err(e) = self.force_stop(&previous).await {
        *current = Some(previous);
        return Err(StartError::ReplaceFailed(e));
      }
    }
    let generation = next_generation();

    let args = self.options.args_for(profile);
    log::info!(
      "Starting {} video: {} (loop={}, generation={})",
      profile.identity,
      profile.display_name(),
      profile.looping,
      generation
    );

    let process = self.launcher.spawn(&executable, &args).map_err(|e| {
      if e.kind() == io::ErrorKind::NotFound {
        log::warn!("Player executable {:?} disappeared, will locate again", executable);
        *self.executable.lock() = None;
      }
      StartError::SpawnFailed(e)
    })?;
    let handle = ProcessHandle::new(generation, process);

    tokio::time::sleep(self.settle).await;

    match handle.exit() {
      Ok(None) => {
        log::info!("Player started (pid {:?})", handle.pid());
        Ok(handle)
      }
      Ok(Some(exit)) => {
        wait_for_stderr(&handle).await;
        let stderr = handle.stderr_tail();
        let reason = if stderr.is_empty() {
          exit.to_string()
        } else {
          format!("{}: {}", exit, stderr)
        };
        Err(StartError::ExitedImmediately(reason))
      }
      Err(e) => {
        // Unknown state; make sure nothing is left behind.
        if let Err(stop_err) = self.force_stop(&handle).await {
          log::warn!(
            "Failed to tear down player (pid {:?}) after poll error: {}",
            handle.pid(),
            stop_err
          );
        }
        Err(StartError::SpawnFailed(e))
      }
    }
  }

  /// Stop gracefully, force-killing after `graceful_timeout`.
  ///
  /// Calling this on a process that has already exited is a no-op.
  pub async fn stop(
    &self,
    handle: &ProcessHandle,
    graceful_timeout: Duration,
  ) -> Result<StopOutcome, StopError> {
    if !handle.is_alive() {
      log::debug!("Player (pid {:?}) already exited", handle.pid());
      return Ok(StopOutcome::AlreadyExited);
    }

    log::info!("Stopping player (pid {:?})...", handle.pid());
    if let Err(e) = handle.terminate() {
      log::warn!("Graceful termination request failed: {}", e);
    }

    if wait_for_exit(handle, graceful_timeout).await {
      log::info!("Player stopped");
      return Ok(StopOutcome::Exited);
    }

    log::warn!(
      "Player did not exit within {:?}, force killing...",
      graceful_timeout
    );
    self.kill(handle).await?;
    Ok(StopOutcome::Killed)
  }

  /// Drop the cached executable so the next start locates it again.
  #[cfg(test)]
  pub(crate) fn forget_executable(&self) {
    *self.executable.lock() = None;
  }

  /// Non-blocking liveness poll.
  pub fn is_alive(&self, handle: &ProcessHandle) -> bool {
    handle.is_alive()
  }

  /// Kill without a graceful request and wait for the process to be reaped.
  async fn force_stop(&self, handle: &ProcessHandle) -> io::Result<()> {
    if !handle.is_alive() {
      return Ok(());
    }
    log::debug!("Replacing player (pid {:?})", handle.pid());
    self.kill(handle).await.map_err(|e| match e {
      StopError::KillFailed { source, .. } => source,
      StopError::Unresponsive { .. } => {
        io::Error::new(io::ErrorKind::TimedOut, "player still running after kill")
      }
    })
  }

  async fn kill(&self, handle: &ProcessHandle) -> Result<(), StopError> {
    if let Err(source) = handle.kill() {
      // Lost a race with a natural exit.
      if !handle.is_alive() {
        return Ok(());
      }
      return Err(StopError::KillFailed {
        pid: handle.pid(),
        source,
      });
    }

    if wait_for_exit(handle, REAP_TIMEOUT).await {
      Ok(())
    } else {
      Err(StopError::Unresponsive { pid: handle.pid() })
    }
  }
}

/// Give the stderr reader a moment to drain the pipe of an exited process.
async fn wait_for_stderr(handle: &ProcessHandle) {
  let deadline = tokio::time::Instant::now() + STDERR_DRAIN_TIMEOUT;
  while !handle.stderr_closed() && tokio::time::Instant::now() < deadline {
    tokio::time::sleep(EXIT_POLL).await;
  }
}

/// Poll until the process exits or `timeout` elapses. Returns whether it exited.
async fn wait_for_exit(handle: &ProcessHandle, timeout: Duration) -> bool {
  let deadline = tokio::time::Instant::now() + timeout;
  loop {
    if !handle.is_alive() {
      return true;
    }
    let now = tokio::time::Instant::now();
    if now >= deadline {
      return false;
    }
    tokio::time::sleep(EXIT_POLL.min(deadline - now)).await;
  }
}
