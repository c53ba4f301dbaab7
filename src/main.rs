use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};

use audio_volume_notifier::config::{Config, ConfigOrigin};
use audio_volume_notifier::detector::{IconId, NotificationEvent};
use audio_volume_notifier::logging::{self, LoggingConfig};
use audio_volume_notifier::mixer::AlsaMixer;
use audio_volume_notifier::notifications::DesktopNotifier;
use audio_volume_notifier::service::{ServiceInstaller, ServiceManager};
use audio_volume_notifier::system::{MixerInterface, NotificationSinkInterface};

#[derive(Parser)]
#[command(name = "audio-volume-notifier")]
#[command(about = "ALSA mixer watcher that raises desktop notifications for volume and mute changes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run in daemon mode (default when no command is given)
    Daemon,
    /// Show the current volume and mute state
    Status,
    /// Set the volume of the monitored control
    Set {
        /// Volume percentage (0-100)
        #[arg(short, long)]
        volume: i64,
    },
    /// Toggle the mute switch (digital control if configured)
    ToggleMute,
    /// Show a test notification
    TestNotification,
    /// Validate configuration file
    CheckConfig,
    /// Install the systemd user unit
    Install,
    /// Remove the systemd user unit
    Uninstall,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_source) = Config::load_with_source(cli.config.as_deref())?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config
            .general
            .log_level
            .parse()
            .with_context(|| format!("invalid log level '{}'", config.general.log_level))?
    };
    let daemon_mode = matches!(cli.command, None | Some(Commands::Daemon));

    let (_guard, log_dir) = logging::initialize_logging(LoggingConfig {
        level,
        file_output: daemon_mode,
        console_output: true,
        log_dir: None,
        json_format: false,
    })?;
    if let Some(dir) = &log_dir {
        let _ = logging::cleanup_old_logs(dir, 7);
    }

    // The config loads before the subscriber exists; report the outcome
    // here where it is actually visible.
    match config_source.origin {
        ConfigOrigin::File => {
            info!("Configuration loaded from: {}", config_source.path.display())
        }
        ConfigOrigin::CreatedDefault => {
            info!(
                "Created default configuration file: {}",
                config_source.path.display()
            )
        }
        ConfigOrigin::UnsavedDefault => {
            warn!(
                "Could not save default configuration to {}, using built-in defaults",
                config_source.path.display()
            )
        }
    }

    match cli.command {
        Some(Commands::Status) => show_status(&config)?,
        Some(Commands::Set { volume }) => set_volume(&config, volume)?,
        Some(Commands::ToggleMute) => toggle_mute(&config)?,
        Some(Commands::TestNotification) => test_notification(&config)?,
        Some(Commands::CheckConfig) => check_config(&config)?,
        Some(Commands::Install) => ServiceInstaller::install_user_unit()?,
        Some(Commands::Uninstall) => ServiceInstaller::uninstall_user_unit()?,
        Some(Commands::Daemon) | None => run_daemon(config, cli.config).await?,
    }

    Ok(())
}

async fn run_daemon(config: Config, config_path: Option<String>) -> Result<()> {
    info!("Starting audio volume notifier daemon");

    println!("Audio volume notifier started");
    println!(
        "  Watching '{}' on card '{}'",
        config.devices.volume_control, config.devices.card
    );
    if let Some(control) = &config.devices.digital_control {
        println!("  Watching mute switch on '{control}'");
    }
    println!("  Press Ctrl+C to stop");

    let mut service = ServiceManager::new(config, config_path);
    service.run().await
}

fn show_status(config: &Config) -> Result<()> {
    let mixer = AlsaMixer::open(&config.devices.card, &config.devices.volume_control)?;

    println!(
        "{} on '{}': {}%{}",
        mixer.control(),
        mixer.card(),
        mixer.volume()?,
        if mixer.is_muted()? { " (muted)" } else { "" }
    );

    if let Some(control) = &config.devices.digital_control {
        let digital = AlsaMixer::open(&config.devices.card, control)?;
        println!(
            "{} on '{}': {}",
            digital.control(),
            digital.card(),
            if digital.is_muted()? { "muted" } else { "unmuted" }
        );
    }

    Ok(())
}

fn set_volume(config: &Config, volume: i64) -> Result<()> {
    let mixer = AlsaMixer::open(&config.devices.card, &config.devices.volume_control)?;
    mixer.set_volume(volume)?;
    println!("{} set to {}%", mixer.control(), volume.clamp(0, 100));
    Ok(())
}

fn toggle_mute(config: &Config) -> Result<()> {
    let control = config
        .devices
        .digital_control
        .as_deref()
        .unwrap_or(&config.devices.volume_control);
    let mixer = AlsaMixer::open(&config.devices.card, control)?;

    let muted = !mixer.is_muted()?;
    mixer.set_mute(muted)?;
    println!("{} {}", mixer.control(), if muted { "muted" } else { "unmuted" });
    Ok(())
}

fn test_notification(config: &Config) -> Result<()> {
    info!("Sending test notification");

    let sink = DesktopNotifier::new("test", config.notifications.timeout_ms);
    sink.show(&NotificationEvent {
        title: "Volume".to_string(),
        icon: IconId::Medium,
        value: Some(50),
    })?;

    println!("Test notification sent (check the top-right corner)");
    Ok(())
}

fn check_config(config: &Config) -> Result<()> {
    info!("Validating configuration");

    config.validate()?;

    println!("Configuration validation:");
    println!("  ✓ Configuration file parsed successfully");
    println!(
        "  ✓ Volume control: '{}' on card '{}'",
        config.devices.volume_control, config.devices.card
    );
    match &config.devices.digital_control {
        Some(control) => println!("  ✓ Digital mute control: '{control}'"),
        None => println!("  - No digital mute control configured"),
    }
    println!(
        "  ✓ Hotkeys: {} (step {} points)",
        if config.hotkeys.enabled { "enabled" } else { "disabled" },
        config.hotkeys.volume_step
    );

    Ok(())
}
