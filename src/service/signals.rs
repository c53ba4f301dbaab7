use anyhow::Result;
use signal_hook::consts::signal::*;
use signal_hook_tokio::Signals;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{info, warn};

/// Signal-driven service events.
#[derive(Debug, Clone, Copy)]
pub enum SignalType {
    /// SIGTERM / SIGINT: run the shutdown handshake and exit.
    Shutdown,
    /// SIGHUP: reload the configuration and restart the monitor session.
    Reload,
}

/// Listen for process signals and forward them as [`SignalType`] events.
/// Returns after a shutdown signal has been forwarded.
pub async fn listen_for_signals(tx: mpsc::UnboundedSender<SignalType>) -> Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGHUP])?;

    info!("Signal handler initialized, listening for SIGTERM, SIGINT, SIGHUP");

    while let Some(signal) = signals.next().await {
        match signal {
            SIGTERM | SIGINT => {
                info!(
                    "Received shutdown signal ({}), initiating graceful shutdown",
                    signal
                );
                let _ = tx.send(SignalType::Shutdown);
                break;
            }
            SIGHUP => {
                info!("Received SIGHUP, requesting configuration reload");
                if tx.send(SignalType::Reload).is_err() {
                    warn!("Service no longer listening, stopping signal handler");
                    break;
                }
            }
            _ => {
                warn!("Received unexpected signal: {}", signal);
            }
        }
    }

    Ok(())
}
