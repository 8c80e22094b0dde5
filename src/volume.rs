//! Best-effort system output volume.
//!
//! On Windows the default render endpoint is driven through Core Audio.
//! Elsewhere the system mixer is driven through whichever command-line tool
//! the platform provides. When nothing is found every call reports
//! `Unavailable`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VolumeError {
  #[error("Volume control unavailable")]
  Unavailable,
  #[error("Volume command failed: {0}")]
  CommandFailed(String),
  #[error("Failed to run volume command: {0}")]
  Io(#[from] std::io::Error),
}

/// Sets the system output level.
pub trait VolumeControl: Send + Sync {
  /// Set the output level in percent (0-100). May block briefly.
  fn set_level(&self, percent: u8) -> Result<(), VolumeError>;
}

/// Mixer tools, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(windows, allow(dead_code))]
enum MixerKind {
  Wpctl,
  Pactl,
  Amixer,
  Osascript,
}

impl MixerKind {
  #[cfg(target_os = "macos")]
  const CANDIDATES: &'static [MixerKind] = &[MixerKind::Osascript];
  #[cfg(not(any(windows, target_os = "macos")))]
  const CANDIDATES: &'static [MixerKind] = &[MixerKind::Wpctl, MixerKind::Pactl, MixerKind::Amixer];

  fn binary(self) -> &'static str {
    match self {
      MixerKind::Wpctl => "wpctl",
      MixerKind::Pactl => "pactl",
      MixerKind::Amixer => "amixer",
      MixerKind::Osascript => "osascript",
    }
  }

  fn args(self, percent: u8) -> Vec<String> {
    match self {
      MixerKind::Wpctl => vec![
        "set-volume".into(),
        "@DEFAULT_AUDIO_SINK@".into(),
        format!("{}%", percent),
      ],
      MixerKind::Pactl => vec![
        "set-sink-volume".into(),
        "@DEFAULT_SINK@".into(),
        format!("{}%", percent),
      ],
      MixerKind::Amixer => vec![
        "-q".into(),
        "sset".into(),
        "Master".into(),
        format!("{}%", percent),
      ],
      MixerKind::Osascript => vec![
        "-e".into(),
        format!("set volume output volume {}", percent),
      ],
    }
  }
}

/// The mixer backend found on this machine.
#[derive(Debug, Clone)]
enum Mixer {
  #[cfg_attr(windows, allow(dead_code))]
  Command(MixerKind, PathBuf),
  /// Master volume of the default render endpoint.
  #[cfg(windows)]
  Endpoint,
}

/// Scalar level (0.0-1.0) for an endpoint volume call.
#[cfg_attr(not(windows), allow(dead_code))]
fn scalar_level(percent: u8) -> f32 {
  f32::from(percent.min(100)) / 100.0
}

/// System mixer.
#[derive(Debug, Clone)]
pub struct SystemVolume {
  mixer: Option<Mixer>,
}

impl SystemVolume {
  /// Detect the first available mixer.
  pub fn detect() -> Self {
    #[cfg(windows)]
    let mixer = match endpoint::default_device_present() {
      Ok(()) => Some(Mixer::Endpoint),
      Err(e) => {
        log::debug!("No default audio endpoint: {}", e);
        None
      }
    };
    #[cfg(not(windows))]
    let mixer = MixerKind::CANDIDATES.iter().find_map(|kind| {
      which::which(kind.binary())
        .ok()
        .map(|path| Mixer::Command(*kind, path))
    });

    match &mixer {
      Some(Mixer::Command(kind, path)) => {
        log::info!("Audio control initialized ({} at {:?})", kind.binary(), path)
      }
      #[cfg(windows)]
      Some(Mixer::Endpoint) => log::info!("Audio control initialized (default audio endpoint)"),
      None => log::warn!("Could not initialize audio control, volume control will be disabled"),
    }
    Self { mixer }
  }

  pub fn is_available(&self) -> bool {
    self.mixer.is_some()
  }
}

impl VolumeControl for SystemVolume {
  fn set_level(&self, percent: u8) -> Result<(), VolumeError> {
    let percent = percent.min(100);
    match &self.mixer {
      None => return Err(VolumeError::Unavailable),
      Some(Mixer::Command(kind, path)) => run_mixer(*kind, path, percent)?,
      #[cfg(windows)]
      Some(Mixer::Endpoint) => endpoint::set_master_level(scalar_level(percent))
        .map_err(|e| VolumeError::CommandFailed(format!("SetMasterVolumeLevelScalar: {}", e)))?,
    }

    log::info!("Volume set to {}%", percent);
    Ok(())
  }
}

fn run_mixer(kind: MixerKind, path: &Path, percent: u8) -> Result<(), VolumeError> {
  let output = Command::new(path)
    .args(kind.args(percent))
    .stdin(Stdio::null())
    .output()?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    return Err(VolumeError::CommandFailed(format!(
      "{} exited with {}: {}",
      kind.binary(),
      output.status,
      stderr.trim()
    )));
  }
  Ok(())
}

#[cfg(windows)]
mod endpoint {
  use windows::core::Result;
  use windows::Win32::Foundation::RPC_E_CHANGED_MODE;
  use windows::Win32::Media::Audio::Endpoints::IAudioEndpointVolume;
  use windows::Win32::Media::Audio::{eMultimedia, eRender, IMMDeviceEnumerator, MMDeviceEnumerator};
  use windows::Win32::System::Com::{
    CoCreateInstance, CoInitializeEx, CoUninitialize, CLSCTX_ALL, COINIT_MULTITHREADED,
  };

  /// Check that a default render endpoint exists.
  pub fn default_device_present() -> Result<()> {
    with_com(|| unsafe { default_endpoint_volume() }.map(|_| ()))
  }

  /// Set the master level of the default render endpoint.
  pub fn set_master_level(level: f32) -> Result<()> {
    with_com(|| unsafe {
      default_endpoint_volume()?.SetMasterVolumeLevelScalar(level, std::ptr::null())
    })
  }

  // Volume calls land on arbitrary blocking-pool threads, so COM is
  // initialized around each call.
  fn with_com<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    let initialized = unsafe {
      let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
      if hr.is_ok() {
        true
      } else if hr == RPC_E_CHANGED_MODE {
        false
      } else {
        return Err(hr.into());
      }
    };

    let result = f();

    if initialized {
      unsafe {
        CoUninitialize();
      }
    }
    result
  }

  unsafe fn default_endpoint_volume() -> Result<IAudioEndpointVolume> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)?;
    let device = enumerator.GetDefaultAudioEndpoint(eRender, eMultimedia)?;
    device.Activate(CLSCTX_ALL, None)
  }
}

/// Volume control that is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVolume;

impl VolumeControl for NoVolume {
  fn set_level(&self, percent: u8) -> Result<(), VolumeError> {
    log::debug!("Volume control disabled, leaving level at current value (wanted {}%)", percent);
    Ok(())
  }
}

/// Records requested levels instead of touching the mixer.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingVolume {
  levels: parking_lot::Mutex<Vec<u8>>,
}

#[cfg(test)]
impl RecordingVolume {
  pub fn levels(&self) -> Vec<u8> {
    self.levels.lock().clone()
  }

  pub fn last(&self) -> Option<u8> {
    self.levels.lock().last().copied()
  }
}

#[cfg(test)]
impl VolumeControl for RecordingVolume {
  fn set_level(&self, percent: u8) -> Result<(), VolumeError> {
    self.levels.lock().push(percent);
    Ok(())
  }
}
