use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::signals::{SignalType, listen_for_signals};
use crate::bridge::{Channel, PollBridge, ShutdownHandle};
use crate::config::Config;
use crate::detector::ChangeDetector;
use crate::hotkeys::HotkeyRouter;
use crate::mixer::AlsaMixer;
use crate::notifications::DesktopNotifier;
use crate::system::MixerInterface;

/// Manages the daemon lifecycle: runs a monitor session, restarts it on
/// SIGHUP with a freshly loaded config, tears it down on SIGTERM/SIGINT.
pub struct ServiceManager {
    config: Config,
    config_path: Option<String>,
}

impl ServiceManager {
    pub fn new(config: Config, config_path: Option<String>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel::<SignalType>();

        tokio::spawn(async move {
            if let Err(e) = listen_for_signals(signal_tx).await {
                error!("Signal handler error: {e:#}");
            }
        });

        loop {
            let mut session = MonitorSession::start(&self.config)?;
            info!("Service started successfully, monitoring mixer changes");

            let end = loop {
                tokio::select! {
                    signal = signal_rx.recv() => match signal {
                        Some(SignalType::Shutdown) | None => break SessionEnd::Shutdown,
                        Some(SignalType::Reload) => break SessionEnd::Reload,
                    },
                    // The poll thread announces every exit; outside a
                    // requested shutdown that means monitoring is dead and
                    // the process must go down with it.
                    _ = &mut session.done_rx => break SessionEnd::PollExit,
                }
            };

            session.stop()?;

            match end {
                SessionEnd::PollExit => {
                    bail!("mixer poll loop exited without a shutdown request")
                }
                SessionEnd::Shutdown => break,
                SessionEnd::Reload => {
                    info!("Reloading configuration");
                    self.config = Config::load(self.config_path.as_deref())?;
                }
            }
        }

        info!("Service shutdown completed");
        Ok(())
    }
}

enum SessionEnd {
    Shutdown,
    Reload,
    PollExit,
}

/// One running monitor: the poll bridge on its own thread, plus the
/// optional hotkey router. `done_rx` resolves as soon as the poll thread
/// exits, whatever the reason.
struct MonitorSession {
    shutdown: ShutdownHandle,
    poll_thread: thread::JoinHandle<Result<()>>,
    done_rx: oneshot::Receiver<()>,
    hotkeys: Option<HotkeyRouter>,
}

impl MonitorSession {
    fn start(config: &Config) -> Result<Self> {
        let timeout_ms = config.notifications.timeout_ms;
        let detector = ChangeDetector::from_config(&config.notifications);

        let volume_mixer: Arc<dyn MixerInterface> = Arc::new(AlsaMixer::open(
            &config.devices.card,
            &config.devices.volume_control,
        )?);

        let mut channels = vec![Channel::volume(
            &config.devices.volume_control,
            volume_mixer.clone(),
            Arc::new(DesktopNotifier::new(&config.devices.volume_control, timeout_ms)),
            detector,
        )];

        let digital_mixer: Option<Arc<dyn MixerInterface>> = match &config.devices.digital_control
        {
            Some(control) => {
                let mixer: Arc<dyn MixerInterface> =
                    Arc::new(AlsaMixer::open(&config.devices.card, control)?);
                channels.push(Channel::mute(
                    control,
                    mixer.clone(),
                    Arc::new(DesktopNotifier::new(control, timeout_ms)),
                    detector,
                ));
                Some(mixer)
            }
            None => None,
        };

        let bridge = PollBridge::new(channels)?;

        // Hotkeys are optional glue: a headless or Wayland-only session
        // still gets change notifications.
        let hotkeys = if config.hotkeys.enabled {
            match HotkeyRouter::spawn(volume_mixer, digital_mixer, config.hotkeys.volume_step) {
                Ok(router) => Some(router),
                Err(e) => {
                    warn!("Global hotkeys unavailable: {e:#}");
                    None
                }
            }
        } else {
            None
        };

        Self::from_bridge(bridge, hotkeys)
    }

    fn from_bridge(mut bridge: PollBridge, hotkeys: Option<HotkeyRouter>) -> Result<Self> {
        let shutdown = bridge.shutdown_handle();
        let (done_tx, done_rx) = oneshot::channel();
        let poll_thread = thread::Builder::new()
            .name("mixer-poll".to_string())
            .spawn(move || {
                let result = bridge.run();
                let _ = done_tx.send(());
                result
            })?;

        Ok(Self {
            shutdown,
            poll_thread,
            done_rx,
            hotkeys,
        })
    }

    fn stop(mut self) -> Result<()> {
        self.shutdown.request_shutdown();
        match self.poll_thread.join() {
            Ok(result) => result.context("mixer poll loop failed")?,
            Err(_) => bail!("mixer poll thread panicked"),
        }
        if let Some(mut hotkeys) = self.hotkeys.take() {
            hotkeys.stop();
        }
        Ok(())
    }
}

/// Systemd user-unit installation helpers.
pub struct ServiceInstaller;

impl ServiceInstaller {
    pub fn install_user_unit() -> Result<()> {
        info!("Installing systemd user unit");

        let unit_content = Self::generate_user_unit()?;
        let unit_path = Self::user_unit_path()?;

        if let Some(parent) = unit_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&unit_path, unit_content)?;

        info!("Unit installed to: {}", unit_path.display());
        info!("To enable the service, run: systemctl --user enable --now audio-volume-notifier");

        Ok(())
    }

    pub fn uninstall_user_unit() -> Result<()> {
        info!("Uninstalling systemd user unit");

        let unit_path = Self::user_unit_path()?;
        if unit_path.exists() {
            std::fs::remove_file(&unit_path)?;
            info!("Unit removed from: {}", unit_path.display());
            info!("To stop the service, run: systemctl --user disable --now audio-volume-notifier");
        } else {
            warn!("Unit file not found at: {}", unit_path.display());
        }

        Ok(())
    }

    fn generate_user_unit() -> Result<String> {
        let current_exe = std::env::current_exe()?;
        let exe_path = current_exe.to_string_lossy();

        Ok(format!(
            "[Unit]\n\
             Description=ALSA volume change notifier\n\
             After=sound.target\n\
             \n\
             [Service]\n\
             ExecStart={exe_path} daemon\n\
             Restart=on-failure\n\
             Environment=RUST_LOG=info\n\
             \n\
             [Install]\n\
             WantedBy=default.target\n"
        ))
    }

    fn user_unit_path() -> Result<PathBuf> {
        let home_dir =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Failed to get home directory"))?;
        Ok(home_dir.join(".config/systemd/user/audio-volume-notifier.service"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{MockMixer, MockNotificationSink};
    use std::time::Duration;

    fn mock_session(mixer: &MockMixer, sink: &MockNotificationSink) -> MonitorSession {
        let bridge = PollBridge::new(vec![Channel::volume(
            "pcm",
            Arc::new(mixer.clone()),
            Arc::new(sink.clone()),
            ChangeDetector::new(false),
        )])
        .unwrap();
        MonitorSession::from_bridge(bridge, None).unwrap()
    }

    #[tokio::test]
    async fn a_dying_poll_thread_resolves_the_completion_channel() {
        let mixer = MockMixer::new(40, false).unwrap();
        let sink = MockNotificationSink::new();
        mixer.set_wait_failure(true);
        let mut session = mock_session(&mixer, &sink);

        tokio::time::timeout(Duration::from_secs(2), &mut session.done_rx)
            .await
            .expect("poll thread exit was never signalled")
            .expect("completion sender dropped");

        let err = session.stop().expect_err("the poll failure must propagate");
        assert!(format!("{err:#}").contains("wait descriptors"));
        assert!(sink.was_closed());
    }

    #[tokio::test]
    async fn a_healthy_session_stays_silent_until_stopped() {
        let mixer = MockMixer::new(40, false).unwrap();
        let sink = MockNotificationSink::new();
        let mut session = mock_session(&mixer, &sink);

        let early = tokio::time::timeout(Duration::from_millis(100), &mut session.done_rx).await;
        assert!(early.is_err(), "completion channel fired without a reason");

        session.stop().unwrap();
        assert!(sink.was_closed());
    }
}
