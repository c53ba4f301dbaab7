use anyhow::Result;

use crate::detector::NotificationEvent;

/// Trait for a single mixer control - abstracts the ALSA simple element so
/// the poll bridge and hotkey router can be exercised without hardware.
///
/// Implementations are shared between the poll thread and the hotkey
/// thread, so they must be internally synchronized.
pub trait MixerInterface: Send + Sync {
    /// Current playback volume as a 0-100 percentage.
    fn volume(&self) -> Result<i64>;

    /// Current playback switch state. Controls without a switch report
    /// unmuted.
    fn is_muted(&self) -> Result<bool>;

    /// Set the playback volume; values outside 0-100 are clamped.
    fn set_volume(&self, percent: i64) -> Result<()>;

    /// Set the playback switch.
    fn set_mute(&self, mute: bool) -> Result<()>;

    /// The poll descriptors that become readable when the mixer has
    /// pending change events.
    fn wait_descriptors(&self) -> Result<Vec<libc::pollfd>>;

    /// Acknowledge pending change events. Must be called after a wakeup,
    /// otherwise the descriptors stay ready and the poll loop spins.
    fn drain_events(&self) -> Result<()>;
}

/// Trait for a desktop notification sink - abstracts notify-rust so tests
/// can record events instead of talking to a notification server.
pub trait NotificationSinkInterface: Send + Sync {
    /// Display (or replace) the popup for this sink.
    fn show(&self, event: &NotificationEvent) -> Result<()>;

    /// Release any live popup handle. Called once when the poll loop exits.
    fn close(&self) -> Result<()>;
}
