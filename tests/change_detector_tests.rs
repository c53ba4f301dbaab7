use audio_volume_notifier::detector::{ChangeDetector, IconId};

#[test]
fn icon_thresholds_match_at_boundaries() {
    assert_eq!(IconId::for_volume(0), IconId::Muted);
    assert_eq!(IconId::for_volume(1), IconId::Low);
    assert_eq!(IconId::for_volume(30), IconId::Low);
    assert_eq!(IconId::for_volume(31), IconId::Medium);
    assert_eq!(IconId::for_volume(70), IconId::Medium);
    assert_eq!(IconId::for_volume(71), IconId::High);
    assert_eq!(IconId::for_volume(100), IconId::High);
}

#[test]
fn icon_handles_out_of_range_values() {
    assert_eq!(IconId::for_volume(-5), IconId::Muted);
    assert_eq!(IconId::for_volume(150), IconId::High);
}

#[test]
fn icon_names_follow_the_freedesktop_spec() {
    assert_eq!(IconId::Muted.as_str(), "audio-volume-muted");
    assert_eq!(IconId::Low.as_str(), "audio-volume-low");
    assert_eq!(IconId::Medium.as_str(), "audio-volume-medium");
    assert_eq!(IconId::High.as_str(), "audio-volume-high");
}

#[test]
fn unchanged_volume_never_fires() {
    // Both first-observation policies agree on this.
    for notify_on_first in [false, true] {
        let detector = ChangeDetector::new(notify_on_first);
        for volume in 0..=100 {
            assert_eq!(detector.detect_volume(Some(volume), volume), None);
        }
    }
}

#[test]
fn suppress_first_policy_ignores_the_initial_reading() {
    let detector = ChangeDetector::new(false);
    for volume in [0, 30, 55, 100] {
        assert_eq!(detector.detect_volume(None, volume), None);
    }
    assert_eq!(detector.detect_mute(None, true), None);
}

#[test]
fn notify_on_first_policy_fires_on_the_initial_reading() {
    let detector = ChangeDetector::new(true);

    let event = detector.detect_volume(None, 45).unwrap();
    assert_eq!(event.icon, IconId::Medium);
    assert_eq!(event.value, Some(45));

    let event = detector.detect_mute(None, true).unwrap();
    assert_eq!(event.title, "Muted");
}

#[test]
fn volume_change_carries_icon_and_hint_of_the_new_value() {
    let detector = ChangeDetector::new(false);

    let event = detector.detect_volume(Some(45), 10).unwrap();
    assert_eq!(event.title, "Volume");
    assert_eq!(event.icon, IconId::Low);
    assert_eq!(event.value, Some(10));

    let event = detector.detect_volume(Some(10), 0).unwrap();
    assert_eq!(event.icon, IconId::Muted);
    assert_eq!(event.value, Some(0));
}

#[test]
fn mute_transitions_use_the_extreme_icons() {
    let detector = ChangeDetector::new(false);

    let event = detector.detect_mute(Some(false), true).unwrap();
    assert_eq!(event.title, "Muted");
    assert_eq!(event.icon, IconId::Muted);
    assert_eq!(event.value, None);

    let event = detector.detect_mute(Some(true), false).unwrap();
    assert_eq!(event.title, "Unmuted");
    assert_eq!(event.icon, IconId::High);
    assert_eq!(event.value, None);
}

#[test]
fn scenario_45_10_10_0() {
    // Suppress-first policy, prior state known as 45.
    let detector = ChangeDetector::new(false);
    let mut last = Some(45);
    let mut events = Vec::new();

    for volume in [10, 10, 0] {
        if let Some(event) = detector.detect_volume(last, volume) {
            events.push(event);
        }
        last = Some(volume);
    }

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].icon, IconId::Low);
    assert_eq!(events[0].value, Some(10));
    assert_eq!(events[1].icon, IconId::Muted);
    assert_eq!(events[1].value, Some(0));
}
