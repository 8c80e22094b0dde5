//! Shared handle to the live player process.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

use super::process::{PlayerProcess, ProcessExit};

type SharedProcess = Arc<Mutex<Box<dyn PlayerProcess>>>;

/// The one live player process, tagged with the generation that spawned it.
///
/// Only the playback controller holds a `ProcessHandle`. Monitors get a
/// [`LivenessProbe`], which can poll but never signal the process.
pub struct ProcessHandle {
  generation: u64,
  pid: Option<u32>,
  process: SharedProcess,
}

impl ProcessHandle {
  pub(crate) fn new(generation: u64, process: Box<dyn PlayerProcess>) -> Self {
    let pid = process.id();
    Self {
      generation,
      pid,
      process: Arc::new(Mutex::new(process)),
    }
  }

  pub fn generation(&self) -> u64 {
    self.generation
  }

  /// Process id at spawn time.
  pub fn pid(&self) -> Option<u32> {
    self.pid
  }

  /// Exit status, or `None` while the process is running.
  pub fn exit(&self) -> io::Result<Option<ProcessExit>> {
    self.process.lock().try_exit()
  }

  /// Non-blocking liveness poll. A failed poll counts as not alive.
  pub fn is_alive(&self) -> bool {
    poll_alive(&self.process, self.pid)
  }

  pub(crate) fn terminate(&self) -> io::Result<()> {
    self.process.lock().terminate()
  }

  pub(crate) fn kill(&self) -> io::Result<()> {
    self.process.lock().kill()
  }

  pub fn stderr_tail(&self) -> String {
    self.process.lock().stderr_tail()
  }

  /// Whether everything the process wrote to stderr has been read.
  pub fn stderr_closed(&self) -> bool {
    self.process.lock().stderr_closed()
  }

  /// Read-only view for an end-of-playback monitor.
  pub fn probe(&self) -> LivenessProbe {
    LivenessProbe {
      pid: self.pid,
      process: self.process.clone(),
    }
  }
}

impl std::fmt::Debug for ProcessHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ProcessHandle")
      .field("generation", &self.generation)
      .field("pid", &self.pid)
      .finish()
  }
}

/// Liveness view of a [`ProcessHandle`].
#[derive(Clone)]
pub struct LivenessProbe {
  pid: Option<u32>,
  process: SharedProcess,
}

impl LivenessProbe {
  pub fn is_alive(&self) -> bool {
    poll_alive(&self.process, self.pid)
  }
}

fn poll_alive(process: &SharedProcess, pid: Option<u32>) -> bool {
  match process.lock().try_exit() {
    Ok(None) => true,
    Ok(Some(_)) => false,
    Err(e) => {
      log::warn!("Liveness poll failed for pid {:?}: {}", pid, e);
      false
    }
  }
}
