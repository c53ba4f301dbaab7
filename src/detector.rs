use crate::config::NotificationConfig;

/// Freedesktop status icon for a volume level.
///
/// Names follow the icon naming spec, so any compliant notification
/// renderer picks a sensible glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconId {
    Muted,
    Low,
    Medium,
    High,
}

impl IconId {
    /// Map a 0-100 volume percentage onto an icon. Boundaries are
    /// inclusive on the upper end of each band.
    pub fn for_volume(percent: i64) -> Self {
        if percent <= 0 {
            IconId::Muted
        } else if percent <= 30 {
            IconId::Low
        } else if percent <= 70 {
            IconId::Medium
        } else {
            IconId::High
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IconId::Muted => "audio-volume-muted",
            IconId::Low => "audio-volume-low",
            IconId::Medium => "audio-volume-medium",
            IconId::High => "audio-volume-high",
        }
    }
}

/// A single detected mixer change, ready to hand to a notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub title: String,
    pub icon: IconId,
    /// 0-100 volume carried as the `"value"` hint for renderers that
    /// draw a slider. Absent for mute/unmute events.
    pub value: Option<i64>,
}

/// Pure change detection: compares the previously observed state with a
/// fresh reading and decides whether a notification is due.
///
/// With `notify_on_first_observation` unset (the default) the very first
/// reading only seeds the stored state and never produces a popup.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    notify_on_first: bool,
}

impl ChangeDetector {
    pub fn new(notify_on_first: bool) -> Self {
        Self { notify_on_first }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(config.notify_on_first_observation)
    }

    pub fn detect_volume(&self, old: Option<i64>, new: i64) -> Option<NotificationEvent> {
        match old {
            Some(prev) if prev == new => None,
            None if !self.notify_on_first => None,
            _ => Some(NotificationEvent {
                title: "Volume".to_string(),
                icon: IconId::for_volume(new),
                value: Some(new),
            }),
        }
    }

    pub fn detect_mute(&self, old: Option<bool>, new: bool) -> Option<NotificationEvent> {
        match old {
            Some(prev) if prev == new => None,
            None if !self.notify_on_first => None,
            _ => Some(NotificationEvent {
                title: if new { "Muted" } else { "Unmuted" }.to_string(),
                // Mute reuses the volume icon rule at the extremes.
                icon: IconId::for_volume(if new { 0 } else { 100 }),
                value: None,
            }),
        }
    }
}
