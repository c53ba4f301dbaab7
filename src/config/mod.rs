use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub hotkeys: HotkeyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesConfig {
    /// ALSA card to open, e.g. "default" or "hw:0".
    pub card: String,

    /// Mixer control whose volume is monitored.
    pub volume_control: String,

    /// Optional second control whose mute switch is monitored
    /// independently (e.g. "IEC958" for a digital output).
    #[serde(default)]
    pub digital_control: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Auto-dismissal timeout for popups, in milliseconds.
    pub timeout_ms: u32,

    /// When set, the very first observed state already raises a popup;
    /// when unset (default) the first observation only seeds the state.
    pub notify_on_first_observation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotkeyConfig {
    /// Bind the XF86 media keys via X11. Losing the X connection only
    /// degrades hotkeys, never the monitor itself.
    pub enabled: bool,

    /// Volume change per key press, in percentage points.
    pub volume_step: i64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            card: "default".to_string(),
            volume_control: "PCM".to_string(),
            digital_control: None,
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 3000,
            notify_on_first_observation: false,
        }
    }
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            volume_step: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            devices: DevicesConfig::default(),
            notifications: NotificationConfig::default(),
            hotkeys: HotkeyConfig::default(),
        }
    }
}

/// How a loaded configuration came to be. Startup logs it once the
/// subscriber is installed; `Config::load` itself may run before that.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    /// Parsed from an existing file.
    File,
    /// No file existed; the defaults were written out.
    CreatedDefault,
    /// No file existed and writing the defaults failed.
    UnsavedDefault,
}

#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub origin: ConfigOrigin,
}

impl Config {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        Self::load_with_source(config_path).map(|(config, _)| config)
    }

    pub fn load_with_source(config_path: Option<&str>) -> Result<(Self, ConfigSource)> {
        let path = match config_path {
            Some(path) => PathBuf::from(path),
            None => Self::default_config_path()?,
        };

        debug!("Loading configuration from: {}", path.display());

        if !path.exists() {
            info!("Configuration file not found, creating default configuration");
            let (config, origin) = Self::create_default_config(&path);
            return Ok((config, ConfigSource { path, origin }));
        }

        let config_content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok((
            config,
            ConfigSource {
                path,
                origin: ConfigOrigin::File,
            },
        ))
    }

    pub fn validate(&self) -> Result<()> {
        if self.devices.card.is_empty() {
            bail!("devices.card must not be empty");
        }
        if self.devices.volume_control.is_empty() {
            bail!("devices.volume_control must not be empty");
        }
        if let Some(control) = &self.devices.digital_control {
            if control.is_empty() {
                bail!("devices.digital_control must not be empty when set");
            }
        }
        if self.notifications.timeout_ms == 0 {
            bail!("notifications.timeout_ms must be greater than zero");
        }
        if !(1..=100).contains(&self.hotkeys.volume_step) {
            bail!(
                "hotkeys.volume_step must be between 1 and 100, got {}",
                self.hotkeys.volume_step
            );
        }
        Ok(())
    }

    pub fn save(&self, config_path: Option<&str>) -> Result<()> {
        let path = match config_path {
            Some(path) => PathBuf::from(path),
            None => Self::default_config_path()?,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let config_content =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(&path, config_content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    fn default_config_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home_dir.join(".config/audio-volume-notifier/config.toml"))
    }

    fn create_default_config(path: &Path) -> (Self, ConfigOrigin) {
        let config = Config::default();

        // Best effort: a read-only home must not stop the daemon.
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!(
                    "Could not create config directory {}: {}. Using default config without saving.",
                    parent.display(),
                    e
                );
                return (config, ConfigOrigin::UnsavedDefault);
            }
        }

        if let Err(e) = config.save(path.to_str()) {
            warn!(
                "Could not save default config to {}: {}. Using default config.",
                path.display(),
                e
            );
            return (config, ConfigOrigin::UnsavedDefault);
        }

        info!("Created default configuration file: {}", path.display());
        (config, ConfigOrigin::CreatedDefault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.devices.volume_control, "PCM");
        assert_eq!(config.devices.card, "default");
        assert!(config.devices.digital_control.is_none());
        assert_eq!(config.notifications.timeout_ms, 3000);
        assert!(!config.notifications.notify_on_first_observation);
        assert_eq!(config.hotkeys.volume_step, 5);
        assert!(config.hotkeys.enabled);
    }

    #[test]
    fn parse_full_config() {
        let content = r#"
[general]
log_level = "debug"

[devices]
card = "hw:0"
volume_control = "Master"
digital_control = "IEC958"

[notifications]
timeout_ms = 1500
notify_on_first_observation = true

[hotkeys]
enabled = false
volume_step = 2
"#;
        let config: Config = toml::from_str(content).unwrap();
        config.validate().unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.devices.card, "hw:0");
        assert_eq!(config.devices.volume_control, "Master");
        assert_eq!(config.devices.digital_control.as_deref(), Some("IEC958"));
        assert_eq!(config.notifications.timeout_ms, 1500);
        assert!(config.notifications.notify_on_first_observation);
        assert!(!config.hotkeys.enabled);
        assert_eq!(config.hotkeys.volume_step, 2);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let config: Config = toml::from_str("[devices]\ncard = \"hw:1\"\nvolume_control = \"PCM\"\n").unwrap();
        assert_eq!(config.devices.card, "hw:1");
        assert_eq!(config.notifications.timeout_ms, 3000);
        assert_eq!(config.hotkeys.volume_step, 5);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.hotkeys.volume_step = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.notifications.timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.devices.volume_control.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.devices.digital_control = Some(String::new());
        assert!(config.validate().is_err());
    }
}
