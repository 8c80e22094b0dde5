use std::process::ExitCode;
use std::sync::Arc;

mod cli;
mod config;
mod error;
mod playback;
mod player;
mod profile;
mod startup;
mod trigger;
mod volume;

pub use cli::Cli;
pub use config::AppConfig;
pub use error::AppError;
pub use playback::{Controller, ControllerSettings, PlaybackState, PlaybackStatus};
pub use player::{LaunchOptions, Launcher, Player, SystemLauncher};
pub use profile::{Identity, Profiles, VideoProfile};
pub use trigger::{Trigger, TriggerSender};
pub use volume::{NoVolume, SystemVolume, VolumeControl};

use clap::Parser;

/// Parse the command line, run until shutdown and report the exit status.
pub fn run() -> ExitCode {
  let cli = Cli::parse();

  if let Err(e) = setup_logging(cli.log_level) {
    eprintln!("{}", e);
    return ExitCode::FAILURE;
  }

  match start(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      log::error!("{}", e);
      ExitCode::FAILURE
    }
  }
}

fn setup_logging(level: log::LevelFilter) -> Result<(), AppError> {
  fern::Dispatch::new()
    .format(|out, message, record| {
      out.finish(format_args!(
        "[{}][{}][{}] {}",
        humantime::format_rfc3339_seconds(std::time::SystemTime::now()),
        record.level(),
        record.target(),
        message
      ))
    })
    .level(level)
    .chain(std::io::stdout())
    .apply()?;
  Ok(())
}

fn start(cli: Cli) -> Result<(), AppError> {
  let mut config = AppConfig::load(cli.config.as_deref())?;
  cli.apply(&mut config);
  config.validate().map_err(AppError::InvalidConfig)?;

  log::info!("Starting flicswitch...");
  log::info!("Background: {:?}", config.background_video);
  log::info!("Demo: {:?}", config.demo_video);
  log::info!("Target display: {}", config.display_index);

  let launcher = Arc::new(SystemLauncher::new(config.player_path()));
  let executable = startup::preflight(&config, launcher.as_ref())?;
  log::info!("Found player: {:?}", executable);

  let runtime = tokio::runtime::Builder::new_multi_thread()
    .enable_all()
    .build()?;

  runtime.block_on(serve(config, launcher, executable, !cli.no_stdin))
}

async fn serve(
  config: AppConfig,
  launcher: Arc<SystemLauncher>,
  executable: std::path::PathBuf,
  read_stdin: bool,
) -> Result<(), AppError> {
  let options = LaunchOptions {
    display_index: config.display_index,
    extra_args: config.player_args.clone(),
  };
  if !options.extra_args.is_empty() {
    log::info!("Extra player args: {:?}", options.extra_args);
  }
  let player = Player::new(launcher, options, config.start_settle(), Some(executable));

  let mut volume_active = false;
  let volume: Arc<dyn VolumeControl> = if config.volume_control {
    let system = SystemVolume::detect();
    volume_active = system.is_available();
    Arc::new(system)
  } else {
    log::info!("Volume control disabled");
    Arc::new(NoVolume)
  };

  let mut controller = Controller::new(player, volume, ControllerSettings::from_config(&config));
  controller.initialize().await?;

  let sender = controller.trigger_sender();
  trigger::spawn_signal_listener(sender.clone());
  if read_stdin {
    trigger::spawn_stdin_listener(sender, controller.subscribe());
  }

  if volume_active {
    log::info!(
      "Background volume: {}% | Demo volume: {}%",
      config.background_volume,
      config.demo_volume
    );
  } else {
    log::info!("System volume is left unchanged");
  }
  log::info!("Controls:");
  if read_stdin {
    log::info!("  d + Enter: toggle demo/background");
    log::info!("  e + Enter: stop player");
    log::info!("  r + Enter: restart background");
    log::info!("  s + Enter: show status");
    log::info!("  q + Enter: quit");
  }
  #[cfg(unix)]
  log::info!("  SIGUSR1: toggle demo/background | SIGUSR2: restart background");
  log::info!("  Ctrl+C: exit");
  log::info!("System ready!");

  controller.run().await?;
  Ok(())
}
