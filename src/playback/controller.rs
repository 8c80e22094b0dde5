//! Playback controller - the single writer of the playback session.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::monitor::{EndOfPlaybackMonitor, MonitorExit, MonitorToken};
use super::state::{PlaybackSession, PlaybackState, PlaybackStatus};
use crate::config::AppConfig;
use crate::player::{Player, StartError, StopError, StopOutcome};
use crate::profile::{Identity, Profiles};
use crate::trigger::{trigger_queue, Trigger, TriggerReceiver, TriggerSender};
use crate::volume::{VolumeControl, VolumeError};

#[derive(Error, Debug)]
pub enum CleanupError {
  #[error("Failed to stop player during shutdown: {0}")]
  Stop(#[from] StopError),
}

/// Timing and profiles the controller works with.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
  pub profiles: Profiles,
  pub graceful_stop: Duration,
  pub poll_interval: Duration,
  /// Wait before raising the volume for a demo louder than the background.
  pub volume_ramp_delay: Duration,
}

impl ControllerSettings {
  pub fn from_config(config: &AppConfig) -> Self {
    Self {
      profiles: Profiles::from_config(config),
      graceful_stop: config.graceful_stop_timeout(),
      poll_interval: config.monitor_poll_interval(),
      volume_ramp_delay: config.volume_ramp_delay(),
    }
  }
}

struct ActiveMonitor {
  token: MonitorToken,
  task: JoinHandle<MonitorExit>,
}

/// Owns the playback session and handles triggers one at a time.
///
/// All producers go through [`TriggerSender`]; nothing else touches the
/// session, so two player starts or stops can never overlap.
pub struct Controller {
  player: Player,
  volume: Arc<dyn VolumeControl>,
  settings: ControllerSettings,
  session: PlaybackSession,
  state: PlaybackState,
  monitor: Option<ActiveMonitor>,
  sender: TriggerSender,
  receiver: TriggerReceiver,
  status: watch::Sender<PlaybackStatus>,
}

impl Controller {
  pub fn new(player: Player, volume: Arc<dyn VolumeControl>, settings: ControllerSettings) -> Self {
    let (sender, receiver) = trigger_queue();
    let (status, _) = watch::channel(PlaybackStatus::default());
    Self {
      player,
      volume,
      settings,
      session: PlaybackSession::default(),
      state: PlaybackState::Idle,
      monitor: None,
      sender,
      receiver,
      status,
    }
  }

  /// Handle for trigger producers.
  pub fn trigger_sender(&self) -> TriggerSender {
    self.sender.clone()
  }

  /// Status updates, published after every state change.
  pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
    self.status.subscribe()
  }

  pub fn state(&self) -> PlaybackState {
    self.state
  }

  pub fn session(&self) -> &PlaybackSession {
    &self.session
  }

  /// Whether an end-of-playback monitor is still running.
  pub fn monitor_active(&self) -> bool {
    self
      .monitor
      .as_ref()
      .is_some_and(|m| !m.token.is_cancelled() && !m.task.is_finished())
  }

  /// Start the background video for the first time.
  pub async fn initialize(&mut self) -> Result<(), StartError> {
    if self.state != PlaybackState::Idle {
      log::warn!("Already initialized (state {}), ignoring", self.state);
      return Ok(());
    }

    self.set_state(PlaybackState::Transitioning(Identity::Background));
    match self.start_profile(Identity::Background).await {
      Ok(()) => {
        self.set_state(PlaybackState::Background);
        self.apply_volume(Identity::Background).await;
        Ok(())
      }
      Err(e) => {
        log::error!("Failed to start background video: {}", e);
        self.set_state(PlaybackState::Idle);
        Err(e)
      }
    }
  }

  /// Process triggers until shutdown.
  pub async fn run(mut self) -> Result<(), CleanupError> {
    log::info!("Playback controller running (state {})", self.state);
    while let Some(trigger) = self.receiver.recv().await {
      if let ControlFlow::Break(result) = self.handle(trigger).await {
        return result;
      }
    }
    self.shutdown().await
  }

  /// Handle one trigger. Breaks with the cleanup result after shutdown.
  pub async fn handle(&mut self, trigger: Trigger) -> ControlFlow<Result<(), CleanupError>> {
    if self.state == PlaybackState::Terminated {
      log::warn!("Ignoring {} after shutdown", trigger);
      return ControlFlow::Break(Ok(()));
    }
    log::debug!("Handling {} in state {}", trigger, self.state);

    match trigger {
      Trigger::Initialize => {
        // Failure is already reported; the next trigger starts over.
        let _ = self.initialize().await;
      }
      Trigger::Toggle => {
        self.on_toggle().await;
        self.receiver.toggle_resolved();
      }
      Trigger::ManualStop => self.on_manual_stop().await,
      Trigger::ManualRestart => self.on_manual_restart().await,
      Trigger::DemoEnded { generation } => self.on_demo_ended(generation).await,
      Trigger::Shutdown => return ControlFlow::Break(self.shutdown().await),
    }
    ControlFlow::Continue(())
  }

  async fn on_toggle(&mut self) {
    match self.state {
      PlaybackState::Background | PlaybackState::Stopped => self.enter_demo().await,
      PlaybackState::Demo => {
        log::info!("Button pressed! Returning to background video...");
        self.cancel_monitor();
        self.enter_background().await;
      }
      PlaybackState::Idle => log::warn!("Button pressed before playback started, ignoring"),
      PlaybackState::Transitioning(_) | PlaybackState::Terminated => {}
    }
  }

  async fn on_demo_ended(&mut self, generation: u64) {
    let current = self.session.generation.current();
    if self.state != PlaybackState::Demo || generation != current {
      log::debug!(
        "Ignoring stale demo-ended({}) in state {} (generation {})",
        generation,
        self.state,
        current
      );
      return;
    }

    log::info!("Demo finished, returning to background video...");
    self.monitor = None;
    self.enter_background().await;
  }

  async fn on_manual_stop(&mut self) {
    self.cancel_monitor();

    let Some(handle) = self.session.process.take() else {
      log::warn!("Player is not running");
      self.session.active_profile = None;
      if self.state != PlaybackState::Idle {
        self.set_state(PlaybackState::Stopped);
      }
      return;
    };

    match self.player.stop(&handle, self.settings.graceful_stop).await {
      Ok(StopOutcome::AlreadyExited) => log::warn!("Player is not running"),
      Ok(_) => {}
      Err(e) => {
        // Keep the handle so the next start tries to tear it down again.
        log::error!("Failed to stop player: {}", e);
        self.session.process = Some(handle);
      }
    }
    self.session.active_profile = None;
    self.set_state(PlaybackState::Stopped);
  }

  async fn on_manual_restart(&mut self) {
    log::info!("Restarting background video...");
    self.cancel_monitor();
    self.enter_background().await;
  }

  async fn shutdown(&mut self) -> Result<(), CleanupError> {
    log::info!("Shutting down...");
    self.cancel_monitor();

    let result = match self.session.process.take() {
      Some(handle) => match self.player.stop(&handle, self.settings.graceful_stop).await {
        Ok(outcome) => {
          log::info!("Player closed ({:?})", outcome);
          Ok(())
        }
        Err(e) => {
          log::error!("Could not terminate player: {}", e);
          Err(CleanupError::from(e))
        }
      },
      None => Ok(()),
    };

    self.session.active_profile = None;
    self.set_state(PlaybackState::Terminated);
    log::info!("Cleanup complete");
    result
  }

  async fn enter_demo(&mut self) {
    log::info!(
      "Button pressed! Playing demo video: {}",
      self.settings.profiles.demo.display_name()
    );
    let prior = self.state;
    self.cancel_monitor();
    self.set_state(PlaybackState::Transitioning(Identity::Demo));

    match self.start_profile(Identity::Demo).await {
      Ok(()) => {
        self.set_state(PlaybackState::Demo);
        self.apply_volume(Identity::Demo).await;
        self.spawn_monitor();
      }
      Err(e) => {
        log::error!("Failed to start demo video: {}", e);
        if self.session.is_live() {
          self.set_state(prior);
        } else if prior == PlaybackState::Background {
          log::info!("Restoring background video...");
          self.enter_background().await;
        } else {
          self.settle_without_player();
        }
      }
    }
  }

  async fn enter_background(&mut self) {
    let prior = self.state;
    self.set_state(PlaybackState::Transitioning(Identity::Background));

    match self.start_profile(Identity::Background).await {
      Ok(()) => {
        self.set_state(PlaybackState::Background);
        self.apply_volume(Identity::Background).await;
        log::info!("Background video playing");
      }
      Err(e) => {
        log::error!("Failed to start background video: {}", e);
        match prior {
          // Nothing was torn down; keep showing what is on screen.
          PlaybackState::Demo if self.session.is_live() => {
            self.set_state(PlaybackState::Demo);
            self.spawn_monitor();
          }
          PlaybackState::Background if self.session.is_live() => {
            self.set_state(PlaybackState::Background);
          }
          _ => self.settle_without_player(),
        }
      }
    }
  }

  /// Start a profile as a new generation, replacing the current process.
  ///
  /// The generation only advances once the old process is gone, so a kept
  /// process stays current.
  async fn start_profile(&mut self, identity: Identity) -> Result<(), StartError> {
    let profile = self.settings.profiles.get(identity).clone();
    let generation = self.session.generation.clone();

    let started = self
      .player
      .start(&mut self.session.process, &profile, move || generation.advance())
      .await;
    match started {
      Ok(handle) => {
        self.session.process = Some(handle);
        self.session.active_profile = Some(profile);
        Ok(())
      }
      Err(e) => {
        if self.session.process.is_none() {
          self.session.active_profile = None;
        }
        Err(e)
      }
    }
  }

  /// Failed start with no live player left.
  fn settle_without_player(&mut self) {
    if !self.session.is_live() {
      self.session.process = None;
    }
    self.session.active_profile = None;
    self.set_state(PlaybackState::Stopped);
  }

  /// Apply the profile volume. Failures are logged and never block.
  async fn apply_volume(&self, identity: Identity) {
    let level = self.settings.profiles.get(identity).volume_percent;
    let background = self.settings.profiles.background.volume_percent;

    if identity == Identity::Demo && level > background && !self.settings.volume_ramp_delay.is_zero() {
      log::info!("Delaying volume increase for smooth transition...");
      tokio::time::sleep(self.settings.volume_ramp_delay).await;
    }

    let volume = self.volume.clone();
    match tokio::task::spawn_blocking(move || volume.set_level(level)).await {
      Ok(Ok(())) => {}
      Ok(Err(VolumeError::Unavailable)) => {
        log::warn!("Cannot set volume to {}% - audio control not available", level)
      }
      Ok(Err(e)) => log::warn!("Failed to set volume to {}%: {}", level, e),
      Err(e) => log::error!("Volume task failed: {}", e),
    }
  }

  fn spawn_monitor(&mut self) {
    let Some(handle) = &self.session.process else {
      return;
    };
    let token = MonitorToken::new(handle.generation());
    let task = EndOfPlaybackMonitor::new(
      token.clone(),
      handle.probe(),
      self.session.generation.clone(),
      self.settings.poll_interval,
      self.sender.clone(),
    )
    .spawn();
    self.monitor = Some(ActiveMonitor { token, task });
  }

  fn cancel_monitor(&mut self) {
    if let Some(monitor) = self.monitor.take() {
      log::debug!(
        "Cancelling demo monitor for generation {}",
        monitor.token.target_generation
      );
      monitor.token.cancel();
    }
  }

  fn set_state(&mut self, state: PlaybackState) {
    self.state = state;
    let status = PlaybackStatus {
      state,
      active: self.session.active_profile.as_ref().map(|p| p.identity),
      generation: self.session.generation.current(),
      pid: self.session.process.as_ref().and_then(|p| p.pid()),
    };
    log::debug!("Playback state: {}", state);
    self.status.send_replace(status);
  }
}
