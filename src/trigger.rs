//! Trigger queue and the producers that feed it.
//!
//! Every event source (stdin commands, Unix signals, Ctrl-C, end-of-playback
//! monitors, or any foreign thread) only pushes a [`Trigger`] into the queue.
//! The playback controller is the single consumer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::playback::PlaybackStatus;

/// Queue capacity. Producers wait when the controller falls this far behind.
const QUEUE_CAPACITY: usize = 32;

/// A discrete event consumed by the playback controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
  /// Start the background video for the first time.
  Initialize,
  /// The button: switch between background and demo.
  Toggle,
  ManualStop,
  ManualRestart,
  Shutdown,
  /// The demo started for `generation` ended on its own.
  DemoEnded { generation: u64 },
}

impl fmt::Display for Trigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Trigger::Initialize => f.write_str("initialize"),
      Trigger::Toggle => f.write_str("toggle"),
      Trigger::ManualStop => f.write_str("manual-stop"),
      Trigger::ManualRestart => f.write_str("manual-restart"),
      Trigger::Shutdown => f.write_str("shutdown"),
      Trigger::DemoEnded { generation } => write!(f, "demo-ended({})", generation),
    }
  }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
  #[error("Trigger queue closed")]
  Closed,
}

/// Producer side of the trigger queue.
///
/// A `Toggle` sent while an earlier toggle is still queued or being handled
/// is dropped, so a bouncing button cannot stack up transitions.
#[derive(Clone)]
pub struct TriggerSender {
  tx: async_channel::Sender<Trigger>,
  toggle_pending: Arc<AtomicBool>,
}

impl TriggerSender {
  /// Queue a trigger, waiting for room if the queue is full.
  pub async fn send(&self, trigger: Trigger) -> Result<(), DispatchError> {
    if !self.admit(trigger) {
      return Ok(());
    }
    self.tx.send(trigger).await.map_err(|_| {
      self.rollback(trigger);
      DispatchError::Closed
    })
  }

  /// Queue a trigger from a thread outside the async runtime.
  pub fn send_blocking(&self, trigger: Trigger) -> Result<(), DispatchError> {
    if !self.admit(trigger) {
      return Ok(());
    }
    self.tx.send_blocking(trigger).map_err(|_| {
      self.rollback(trigger);
      DispatchError::Closed
    })
  }

  fn admit(&self, trigger: Trigger) -> bool {
    if trigger == Trigger::Toggle && self.toggle_pending.swap(true, Ordering::AcqRel) {
      log::info!("Toggle already in progress, ignoring duplicate press");
      return false;
    }
    true
  }

  fn rollback(&self, trigger: Trigger) {
    if trigger == Trigger::Toggle {
      self.toggle_pending.store(false, Ordering::Release);
    }
  }
}

/// Consumer side of the trigger queue.
pub struct TriggerReceiver {
  rx: async_channel::Receiver<Trigger>,
  toggle_pending: Arc<AtomicBool>,
}

impl TriggerReceiver {
  /// Next trigger, or `None` once every sender is gone.
  pub async fn recv(&self) -> Option<Trigger> {
    self.rx.recv().await.ok()
  }

  /// Mark the in-flight toggle as resolved so the next press is accepted.
  pub fn toggle_resolved(&self) {
    self.toggle_pending.store(false, Ordering::Release);
  }
}

/// Create a bounded trigger queue.
pub fn trigger_queue() -> (TriggerSender, TriggerReceiver) {
  let (tx, rx) = async_channel::bounded(QUEUE_CAPACITY);
  let toggle_pending = Arc::new(AtomicBool::new(false));
  (
    TriggerSender {
      tx,
      toggle_pending: toggle_pending.clone(),
    },
    TriggerReceiver { rx, toggle_pending },
  )
}

/// A console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
  Trigger(Trigger),
  /// Print the current playback status.
  Status,
}

/// Parse a console command.
///
/// The single letters follow the hotkeys of the button bridge
/// (Ctrl+Alt+D / E / R).
pub fn parse_command(input: &str) -> Option<Command> {
  let trigger = match input.trim().to_ascii_lowercase().as_str() {
    "d" | "toggle" | "demo" => Trigger::Toggle,
    "e" | "stop" => Trigger::ManualStop,
    "r" | "restart" => Trigger::ManualRestart,
    "q" | "quit" | "exit" | "shutdown" => Trigger::Shutdown,
    "s" | "status" => return Some(Command::Status),
    _ => return None,
  };
  Some(Command::Trigger(trigger))
}

/// Read commands from stdin, one per line.
///
/// Stops at end of input without shutting the controller down, so the
/// program can run detached from a terminal.
pub fn spawn_stdin_listener(
  sender: TriggerSender,
  status: watch::Receiver<PlaybackStatus>,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
      match lines.next_line().await {
        Ok(Some(line)) => {
          if line.trim().is_empty() {
            continue;
          }
          match parse_command(&line) {
            Some(Command::Trigger(trigger)) => {
              if sender.send(trigger).await.is_err() {
                break;
              }
            }
            Some(Command::Status) => {
              let snapshot = status.borrow().clone();
              match serde_json::to_string(&snapshot) {
                Ok(json) => log::info!("Status: {}", json),
                Err(e) => log::warn!("Failed to serialize status: {}", e),
              }
            }
            None => log::warn!("Unknown command: {:?} (use d, e, r, s or q)", line.trim()),
          }
        }
        Ok(None) => {
          log::debug!("stdin closed, console commands disabled");
          break;
        }
        Err(e) => {
          log::error!("Failed to read stdin: {}", e);
          break;
        }
      }
    }
  })
}

/// Translate process signals into triggers.
///
/// Ctrl-C and SIGTERM shut down; on Unix SIGUSR1 toggles and SIGUSR2
/// restarts the background video.
pub fn spawn_signal_listener(sender: TriggerSender) -> JoinHandle<()> {
  tokio::spawn(async move {
    if let Err(e) = signal_loop(&sender).await {
      log::error!("Signal handling failed: {}", e);
    }
  })
}

#[cfg(unix)]
async fn signal_loop(sender: &TriggerSender) -> std::io::Result<()> {
  use tokio::signal::unix::{signal, SignalKind};

  let mut interrupt = signal(SignalKind::interrupt())?;
  let mut terminate = signal(SignalKind::terminate())?;
  let mut user1 = signal(SignalKind::user_defined1())?;
  let mut user2 = signal(SignalKind::user_defined2())?;

  loop {
    let trigger = tokio::select! {
      _ = interrupt.recv() => Trigger::Shutdown,
      _ = terminate.recv() => Trigger::Shutdown,
      _ = user1.recv() => Trigger::Toggle,
      _ = user2.recv() => Trigger::ManualRestart,
    };
    log::info!("Received signal, dispatching {}", trigger);
    if sender.send(trigger).await.is_err() {
      return Ok(());
    }
  }
}

#[cfg(not(unix))]
async fn signal_loop(sender: &TriggerSender) -> std::io::Result<()> {
  loop {
    tokio::signal::ctrl_c().await?;
    log::info!("Received exit signal...");
    if sender.send(Trigger::Shutdown).await.is_err() {
      return Ok(());
    }
  }
}
