pub mod bridge;
pub mod config;
pub mod detector;
pub mod hotkeys;
pub mod logging;
pub mod mixer;
pub mod notifications;
pub mod service;
pub mod system;

pub use bridge::{Channel, PollBridge, ShutdownHandle};
pub use config::Config;
pub use detector::{ChangeDetector, IconId, NotificationEvent};
