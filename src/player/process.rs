//! Player binary detection and process spawning.

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};

/// How long a candidate binary gets to answer `--version`.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of stderr lines kept for failure reports.
const STDERR_TAIL_LINES: usize = 20;

/// How a player process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
  pub code: Option<i32>,
  pub signal: Option<i32>,
}

impl ProcessExit {
  fn from_status(status: std::process::ExitStatus) -> Self {
    #[cfg(unix)]
    let signal = {
      use std::os::unix::process::ExitStatusExt;
      status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    Self {
      code: status.code(),
      signal,
    }
  }
}

impl fmt::Display for ProcessExit {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.code, self.signal) {
      (Some(code), _) => write!(f, "exit code {}", code),
      (None, Some(signal)) => write!(f, "signal {}", signal),
      (None, None) => write!(f, "unknown exit status"),
    }
  }
}

/// A running external player process.
///
/// Every method must return promptly; waiting is done by the caller through
/// repeated [`PlayerProcess::try_exit`] polls.
pub trait PlayerProcess: Send {
  /// OS process id, if the process has not been reaped yet.
  fn id(&self) -> Option<u32>;
  /// Non-blocking exit check. `Ok(None)` means still running.
  fn try_exit(&mut self) -> io::Result<Option<ProcessExit>>;
  /// Ask the process to exit.
  fn terminate(&mut self) -> io::Result<()>;
  /// Kill the process without giving it a chance to clean up.
  fn kill(&mut self) -> io::Result<()>;
  /// Last lines the process wrote to stderr.
  fn stderr_tail(&self) -> String {
    String::new()
  }
  /// Whether the stderr pipe has reached end of file.
  fn stderr_closed(&self) -> bool {
    true
  }
}

/// Locates and spawns the player executable.
pub trait Launcher: Send + Sync {
  /// Find a working player executable.
  fn locate(&self) -> Option<PathBuf>;
  /// Spawn `program` with `args`.
  fn spawn(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn PlayerProcess>>;
}

/// Launcher backed by the real `mpv` binary.
#[derive(Debug, Clone, Default)]
pub struct SystemLauncher {
  configured: Option<PathBuf>,
}

impl SystemLauncher {
  /// Create a launcher. `configured` takes precedence over auto-detection.
  pub fn new(configured: Option<PathBuf>) -> Self {
    Self { configured }
  }
}

impl Launcher for SystemLauncher {
  fn locate(&self) -> Option<PathBuf> {
    if let Some(path) = &self.configured {
      if responds_to_version(path) {
        return Some(path.clone());
      }
      log::warn!("Configured player {:?} is not usable, falling back to auto-detect", path);
    }
    find_mpv()
  }

  fn spawn(&self, program: &Path, args: &[String]) -> io::Result<Box<dyn PlayerProcess>> {
    log::info!("Spawning player: {:?} {:?}", program, args);

    let mut child = tokio::process::Command::new(program)
      .args(args)
      .stdin(Stdio::null())
      .stdout(Stdio::null())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()?;

    let tail = Arc::new(Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES)));
    let closed = Arc::new(AtomicBool::new(true));
    if let Some(stderr) = child.stderr.take() {
      closed.store(false, Ordering::Release);
      let tail = tail.clone();
      let closed = closed.clone();
      tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
          log::debug!(target: "player", "{}", line);
          let mut tail = tail.lock();
          if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
          }
          tail.push_back(line);
        }
        closed.store(true, Ordering::Release);
      });
    }

    Ok(Box::new(ChildProcess {
      child,
      tail,
      closed,
    }))
  }
}

/// A spawned player process.
struct ChildProcess {
  child: tokio::process::Child,
  tail: Arc<Mutex<VecDeque<String>>>,
  closed: Arc<AtomicBool>,
}

impl PlayerProcess for ChildProcess {
  fn id(&self) -> Option<u32> {
    self.child.id()
  }

  fn try_exit(&mut self) -> io::Result<Option<ProcessExit>> {
    Ok(self.child.try_wait()?.map(ProcessExit::from_status))
  }

  #[cfg(unix)]
  fn terminate(&mut self) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // Already reaped.
    let Some(pid) = self.child.id() else {
      return Ok(());
    };
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)?;
    Ok(())
  }

  #[cfg(not(unix))]
  fn terminate(&mut self) -> io::Result<()> {
    self.child.start_kill()
  }

  fn kill(&mut self) -> io::Result<()> {
    self.child.start_kill()
  }

  fn stderr_tail(&self) -> String {
    let tail = self.tail.lock();
    tail.iter().cloned().collect::<Vec<_>>().join("\n")
  }

  fn stderr_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }
}

/// Find a working mpv executable in PATH or common locations.
pub fn find_mpv() -> Option<PathBuf> {
  // Check PATH first
  if let Ok(path) = which::which("mpv") {
    if responds_to_version(&path) {
      return Some(path);
    }
    log::warn!("mpv found in PATH at {:?} but it does not run", path);
  }

  #[cfg(windows)]
  let common_paths: &[&str] = &[
    r"C:\Program Files\mpv\mpv.exe",
    r"C:\Program Files (x86)\mpv\mpv.exe",
    r"C:\mpv\mpv.exe",
    r"C:\mpv\bin\mpv.exe",
  ];

  #[cfg(target_os = "macos")]
  let common_paths: &[&str] = &[
    "/usr/local/bin/mpv",
    "/opt/homebrew/bin/mpv",
    "/Applications/mpv.app/Contents/MacOS/mpv",
  ];

  #[cfg(not(any(windows, target_os = "macos")))]
  let common_paths: &[&str] = &["/usr/bin/mpv", "/usr/local/bin/mpv", "/snap/bin/mpv"];

  for path in common_paths {
    let p = PathBuf::from(path);
    if !p.exists() {
      log::debug!("Not found: {:?}", p);
      continue;
    }
    if responds_to_version(&p) {
      return Some(p);
    }
    log::warn!("Found but not working: {:?}", p);
  }

  log::error!("mpv not found in PATH or any common location");
  None
}

/// Run `<path> --version` and report whether it exits successfully in time.
fn responds_to_version(path: &Path) -> bool {
  let mut child = match Command::new(path)
    .arg("--version")
    .stdin(Stdio::null())
    .stdout(Stdio::null())
    .stderr(Stdio::null())
    .spawn()
  {
    Ok(child) => child,
    Err(e) => {
      log::debug!("Probe of {:?} failed: {}", path, e);
      return false;
    }
  };

  let deadline = Instant::now() + PROBE_TIMEOUT;
  loop {
    match child.try_wait() {
      Ok(Some(status)) => return status.success(),
      Ok(None) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(50)),
      Ok(None) => {
        log::warn!("Probe of {:?} timed out", path);
        let _ = child.kill();
        let _ = child.wait();
        return false;
      }
      Err(e) => {
        log::debug!("Probe of {:?} failed: {}", path, e);
        return false;
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exit_display() {
    let exit = ProcessExit {
      code: Some(2),
      signal: None,
    };
    assert_eq!(exit.to_string(), "exit code 2");

    let exit = ProcessExit {
      code: None,
      signal: Some(9),
    };
    assert_eq!(exit.to_string(), "signal 9");
  }

  #[test]
  fn test_missing_binary_is_not_usable() {
    assert!(!responds_to_version(Path::new("/definitely/not/a/player")));
  }

  #[test]
  fn test_configured_missing_binary_falls_back() {
    let launcher = SystemLauncher::new(Some(PathBuf::from("/definitely/not/a/player")));
    // Whatever auto-detection finds, it must not be the bogus configured path.
    assert_ne!(
      launcher.locate(),
      Some(PathBuf::from("/definitely/not/a/player"))
    );
  }
}
