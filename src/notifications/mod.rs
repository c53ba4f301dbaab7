use anyhow::{Context, Result};
use notify_rust::{Hint, Notification, Timeout};
use std::sync::Mutex;
use tracing::debug;

use crate::detector::NotificationEvent;
use crate::system::NotificationSinkInterface;

/// Application name reported to the notification server.
const APP_NAME: &str = "Volume Control";

/// Desktop notification sink backed by the freedesktop notification
/// service. One instance per monitored channel.
///
/// The id returned by the server is remembered and reused, so repeated
/// volume changes replace the popup in place instead of stacking a new
/// one per change.
pub struct DesktopNotifier {
    label: String,
    timeout_ms: u32,
    last_id: Mutex<Option<u32>>,
}

impl DesktopNotifier {
    pub fn new(label: &str, timeout_ms: u32) -> Self {
        Self {
            label: label.to_string(),
            timeout_ms,
            last_id: Mutex::new(None),
        }
    }
}

impl NotificationSinkInterface for DesktopNotifier {
    fn show(&self, event: &NotificationEvent) -> Result<()> {
        let mut notification = Notification::new();
        notification
            .appname(APP_NAME)
            .summary(&event.title)
            .icon(event.icon.as_str())
            .timeout(Timeout::Milliseconds(self.timeout_ms));

        if let Some(value) = event.value {
            notification.hint(Hint::CustomInt("value".to_string(), value as i32));
        }

        let mut last_id = self.last_id.lock().unwrap();
        if let Some(id) = *last_id {
            notification.id(id);
        }

        let handle = notification
            .show()
            .with_context(|| format!("failed to show notification for '{}'", self.label))?;
        *last_id = Some(handle.id());

        debug!(
            "{}: showed notification '{}' ({})",
            self.label,
            event.title,
            event.icon.as_str()
        );
        Ok(())
    }

    fn close(&self) -> Result<()> {
        // The server dismisses the popup by timeout; we only have to stop
        // referencing its id.
        if self.last_id.lock().unwrap().take().is_some() {
            debug!("{}: released notification handle", self.label);
        }
        Ok(())
    }
}
