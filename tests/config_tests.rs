use std::fs;

use audio_volume_notifier::config::{Config, ConfigOrigin};
use tempfile::TempDir;

#[test]
fn load_existing_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[general]
log_level = "debug"

[devices]
card = "hw:1"
volume_control = "Master"
digital_control = "IEC958"

[notifications]
timeout_ms = 2000
notify_on_first_observation = true

[hotkeys]
enabled = true
volume_step = 10
"#,
    )
    .unwrap();

    let config = Config::load(path.to_str()).unwrap();

    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.devices.card, "hw:1");
    assert_eq!(config.devices.volume_control, "Master");
    assert_eq!(config.devices.digital_control.as_deref(), Some("IEC958"));
    assert_eq!(config.notifications.timeout_ms, 2000);
    assert!(config.notifications.notify_on_first_observation);
    assert_eq!(config.hotkeys.volume_step, 10);
}

#[test]
fn missing_file_creates_default_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sub").join("config.toml");

    let config = Config::load(path.to_str()).unwrap();

    assert_eq!(config.devices.volume_control, "PCM");
    assert_eq!(config.notifications.timeout_ms, 3000);
    assert!(path.exists(), "default config should have been written");

    // And the written file must round-trip.
    let reloaded = Config::load(path.to_str()).unwrap();
    assert_eq!(reloaded.devices.card, config.devices.card);
    assert_eq!(reloaded.hotkeys.volume_step, config.hotkeys.volume_step);
}

#[test]
fn load_reports_where_the_config_came_from() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[devices]\ncard = \"hw:0\"\nvolume_control = \"PCM\"\n").unwrap();

    let (_, source) = Config::load_with_source(path.to_str()).unwrap();
    assert_eq!(source.origin, ConfigOrigin::File);
    assert_eq!(source.path, path);

    let missing = dir.path().join("fresh").join("config.toml");
    let (_, source) = Config::load_with_source(missing.to_str()).unwrap();
    assert_eq!(source.origin, ConfigOrigin::CreatedDefault);
    assert!(missing.exists());
}

#[test]
fn unwritable_location_falls_back_to_builtin_defaults() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "").unwrap();

    // The parent is a regular file, so the config can never be saved.
    let path = blocker.join("config.toml");
    let (config, source) = Config::load_with_source(path.to_str()).unwrap();

    assert_eq!(source.origin, ConfigOrigin::UnsavedDefault);
    assert_eq!(config.devices.volume_control, "PCM");
    assert!(!path.exists());
}

#[test]
fn invalid_toml_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "this is not toml [").unwrap();

    assert!(Config::load(path.to_str()).is_err());
}

#[test]
fn out_of_range_values_are_rejected_on_load() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[devices]
card = "default"
volume_control = "PCM"

[hotkeys]
enabled = true
volume_step = 500
"#,
    )
    .unwrap();

    assert!(Config::load(path.to_str()).is_err());
}

#[test]
fn save_then_load_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.devices.digital_control = Some("IEC958".to_string());
    config.hotkeys.volume_step = 2;
    config.save(path.to_str()).unwrap();

    let loaded = Config::load(path.to_str()).unwrap();
    assert_eq!(loaded.devices.digital_control.as_deref(), Some("IEC958"));
    assert_eq!(loaded.hotkeys.volume_step, 2);
}
