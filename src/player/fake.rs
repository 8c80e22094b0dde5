//! Scripted launcher for tests.

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::process::{Launcher, PlayerProcess, ProcessExit};

/// How the next spawned fake process behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
  RunsForever,
  FailsToSpawn,
  ExitsImmediately,
  /// Exits on its own once it has been polled this many times.
  ExitsAfterPolls(u32),
  /// Only a kill stops it.
  IgnoresTerminate,
  /// The first liveness poll fails; afterwards it runs until stopped.
  PollFailsOnce,
  /// Survives both terminate and kill; exits on its own after this many polls.
  Unkillable(u32),
}

/// Polls of `stderr_closed` before an immediately-exiting process's stderr
/// has been read.
const STDERR_DRAIN_POLLS: u32 = 3;

#[derive(Debug)]
struct Shared {
  locatable: bool,
  script: VecDeque<FakeBehavior>,
  spawns: Vec<Vec<String>>,
  next_pid: u32,
  live: usize,
  max_live: usize,
  terminate_calls: usize,
  kill_calls: usize,
}

/// Launcher whose processes are plain in-memory state machines.
///
/// Tracks how many fake processes are alive at once so tests can assert the
/// single-process invariant.
pub struct FakeLauncher {
  shared: Arc<Mutex<Shared>>,
}

impl FakeLauncher {
  pub fn new() -> Self {
    Self {
      shared: Arc::new(Mutex::new(Shared {
        locatable: true,
        script: VecDeque::new(),
        spawns: Vec::new(),
        next_pid: 1000,
        live: 0,
        max_live: 0,
        terminate_calls: 0,
        kill_calls: 0,
      })),
    }
  }

  /// Queue behaviors for the next spawns; unscripted spawns run forever.
  pub fn script(&self, behaviors: impl IntoIterator<Item = FakeBehavior>) {
    self.shared.lock().script.extend(behaviors);
  }

  pub fn set_locatable(&self, locatable: bool) {
    self.shared.lock().locatable = locatable;
  }

  /// Number of spawn attempts, failed ones included.
  pub fn spawn_count(&self) -> usize {
    self.shared.lock().spawns.len()
  }

  /// Arguments of the n-th spawn attempt.
  pub fn spawn_args(&self, n: usize) -> Vec<String> {
    self.shared.lock().spawns[n].clone()
  }

  pub fn live(&self) -> usize {
    self.shared.lock().live
  }

  /// Highest number of simultaneously live processes seen.
  pub fn max_live(&self) -> usize {
    self.shared.lock().max_live
  }

  pub fn terminate_calls(&self) -> usize {
    self.shared.lock().terminate_calls
  }

  pub fn kill_calls(&self) -> usize {
    self.shared.lock().kill_calls
  }
}

impl Launcher for FakeLauncher {
  fn locate(&self) -> Option<PathBuf> {
    self
      .shared
      .lock()
      .locatable
      .then(|| PathBuf::from("/opt/fake/mpv"))
  }

  fn spawn(&self, _program: &Path, args: &[String]) -> io::Result<Box<dyn PlayerProcess>> {
    let mut shared = self.shared.lock();
    shared.spawns.push(args.to_vec());
    let behavior = shared.script.pop_front().unwrap_or(FakeBehavior::RunsForever);

    let alive = match behavior {
      FakeBehavior::FailsToSpawn => {
        return Err(io::Error::new(
          io::ErrorKind::PermissionDenied,
          "fake spawn failure",
        ))
      }
      FakeBehavior::ExitsImmediately => false,
      _ => true,
    };

    let pid = shared.next_pid;
    shared.next_pid += 1;
    if alive {
      shared.live += 1;
      shared.max_live = shared.max_live.max(shared.live);
    }

    Ok(Box::new(FakeProcess {
      pid,
      behavior,
      alive,
      exit: (!alive).then_some(ProcessExit {
        code: Some(1),
        signal: None,
      }),
      polls: 0,
      stderr_polls: Cell::new(0),
      shared: self.shared.clone(),
    }))
  }
}

struct FakeProcess {
  pid: u32,
  behavior: FakeBehavior,
  alive: bool,
  exit: Option<ProcessExit>,
  polls: u32,
  stderr_polls: Cell<u32>,
  shared: Arc<Mutex<Shared>>,
}

impl FakeProcess {
  fn die(&mut self, exit: ProcessExit) {
    if self.alive {
      self.alive = false;
      self.exit = Some(exit);
      self.shared.lock().live -= 1;
    }
  }
}

impl PlayerProcess for FakeProcess {
  fn id(&self) -> Option<u32> {
    self.alive.then_some(self.pid)
  }

  fn try_exit(&mut self) -> io::Result<Option<ProcessExit>> {
    if self.behavior == FakeBehavior::PollFailsOnce && self.polls == 0 {
      self.polls += 1;
      return Err(io::Error::other("fake poll failure"));
    }
    if let FakeBehavior::ExitsAfterPolls(limit) | FakeBehavior::Unkillable(limit) = self.behavior {
      self.polls += 1;
      if self.polls >= limit {
        self.die(ProcessExit {
          code: Some(0),
          signal: None,
        });
      }
    }
    Ok(self.exit)
  }

  fn terminate(&mut self) -> io::Result<()> {
    self.shared.lock().terminate_calls += 1;
    if !matches!(
      self.behavior,
      FakeBehavior::IgnoresTerminate | FakeBehavior::Unkillable(_)
    ) {
      self.die(ProcessExit {
        code: None,
        signal: Some(15),
      });
    }
    Ok(())
  }

  fn kill(&mut self) -> io::Result<()> {
    self.shared.lock().kill_calls += 1;
    if matches!(self.behavior, FakeBehavior::Unkillable(_)) {
      return Ok(());
    }
    self.die(ProcessExit {
      code: None,
      signal: Some(9),
    });
    Ok(())
  }

  fn stderr_tail(&self) -> String {
    match self.behavior {
      FakeBehavior::ExitsImmediately if self.stderr_closed() => {
        "Cannot open file '/videos/missing.mp4'".to_string()
      }
      _ => String::new(),
    }
  }

  /// The error text of an immediately-exiting process only shows up after a
  /// few polls, like a pipe the reader has not drained yet.
  fn stderr_closed(&self) -> bool {
    if self.behavior != FakeBehavior::ExitsImmediately {
      return true;
    }
    let polls = self.stderr_polls.get();
    if polls >= STDERR_DRAIN_POLLS {
      return true;
    }
    self.stderr_polls.set(polls + 1);
    false
  }
}
