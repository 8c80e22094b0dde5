//! End-of-playback detection for the demo video.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::state::Generation;
use crate::player::LivenessProbe;
use crate::trigger::{Trigger, TriggerSender};

/// Binds a monitor to one demo session.
#[derive(Debug, Clone)]
pub struct MonitorToken {
  pub target_generation: u64,
  cancel: CancellationToken,
}

impl MonitorToken {
  pub fn new(target_generation: u64) -> Self {
    Self {
      target_generation,
      cancel: CancellationToken::new(),
    }
  }

  /// Ask the monitor to stop. Takes effect within one poll interval.
  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancel.is_cancelled()
  }
}

/// Why a monitor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
  /// The process exited on its own and `demo-ended` was sent.
  Ended,
  Cancelled,
  /// A newer session started.
  Superseded,
  /// The trigger queue is gone.
  QueueClosed,
}

/// Polls the demo process and raises `demo-ended` once it exits.
pub struct EndOfPlaybackMonitor {
  token: MonitorToken,
  probe: LivenessProbe,
  generation: Generation,
  poll_interval: Duration,
  triggers: TriggerSender,
}

impl EndOfPlaybackMonitor {
  pub fn new(
    token: MonitorToken,
    probe: LivenessProbe,
    generation: Generation,
    poll_interval: Duration,
    triggers: TriggerSender,
  ) -> Self {
    Self {
      token,
      probe,
      generation,
      poll_interval,
      triggers,
    }
  }

  pub fn spawn(self) -> JoinHandle<MonitorExit> {
    tokio::spawn(self.run())
  }

  pub async fn run(self) -> MonitorExit {
    let target = self.token.target_generation;
    log::info!("Monitoring demo video for completion (generation {})", target);

    let exit = loop {
      tokio::select! {
        _ = self.token.cancel.cancelled() => break MonitorExit::Cancelled,
        _ = tokio::time::sleep(self.poll_interval) => {}
      }

      if self.token.is_cancelled() {
        break MonitorExit::Cancelled;
      }
      if self.generation.current() != target {
        break MonitorExit::Superseded;
      }
      if self.probe.is_alive() {
        continue;
      }

      log::info!("Demo video finished (generation {})", target);
      let trigger = Trigger::DemoEnded { generation: target };
      break match self.triggers.send(trigger).await {
        Ok(()) => MonitorExit::Ended,
        Err(_) => MonitorExit::QueueClosed,
      };
    };

    log::debug!("Demo monitor for generation {} ended: {:?}", target, exit);
    exit
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::player::fake::{FakeBehavior, FakeLauncher};
  use crate::player::{Launcher, ProcessHandle};
  use crate::trigger::trigger_queue;
  use std::path::Path;

  const POLL: Duration = Duration::from_millis(10);

  fn spawn_fake(launcher: &FakeLauncher, generation: u64) -> ProcessHandle {
    let process = launcher.spawn(Path::new("/opt/fake/mpv"), &[]).unwrap();
    ProcessHandle::new(generation, process)
  }

  #[tokio::test]
  async fn test_natural_exit_raises_one_trigger() {
    let launcher = FakeLauncher::new();
    launcher.script([FakeBehavior::ExitsAfterPolls(3)]);
    let generation = Generation::default();
    let current = generation.advance();
    let handle = spawn_fake(&launcher, current);
    let (sender, receiver) = trigger_queue();

    let monitor = EndOfPlaybackMonitor::new(
      MonitorToken::new(current),
      handle.probe(),
      generation,
      POLL,
      sender,
    );
    let exit = monitor.run().await;

    assert_eq!(exit, MonitorExit::Ended);
    assert_eq!(
      receiver.recv().await,
      Some(Trigger::DemoEnded { generation: current })
    );
    // Only one trigger is raised; the remaining sender is gone with the monitor.
    assert_eq!(receiver.recv().await, None);
  }

  #[tokio::test]
  async fn test_cancelled_monitor_is_silent() {
    let launcher = FakeLauncher::new();
    let generation = Generation::default();
    let current = generation.advance();
    let handle = spawn_fake(&launcher, current);
    let (sender, receiver) = trigger_queue();

    let token = MonitorToken::new(current);
    let task = EndOfPlaybackMonitor::new(token.clone(), handle.probe(), generation, POLL, sender)
      .spawn();
    tokio::time::sleep(POLL * 3).await;
    token.cancel();

    assert_eq!(task.await.unwrap(), MonitorExit::Cancelled);
    assert_eq!(receiver.recv().await, None);
  }

  #[tokio::test]
  async fn test_superseded_monitor_is_silent() {
    let launcher = FakeLauncher::new();
    launcher.script([FakeBehavior::ExitsAfterPolls(1)]);
    let generation = Generation::default();
    let stale = generation.advance();
    let handle = spawn_fake(&launcher, stale);
    let (sender, receiver) = trigger_queue();

    // A newer session started before the first poll.
    generation.advance();
    let exit = EndOfPlaybackMonitor::new(
      MonitorToken::new(stale),
      handle.probe(),
      generation,
      POLL,
      sender,
    )
    .run()
    .await;

    assert_eq!(exit, MonitorExit::Superseded);
    assert_eq!(receiver.recv().await, None);
  }
}
