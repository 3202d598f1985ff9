use std::time::Duration;

use contactd::{ActiveLevel, AppConfig, DebounceConfig, DebounceError, Pull};

fn sample_config() -> AppConfig {
    AppConfig::from_json(
        r#"
        {
            "debounce": {
                "quiet_interval_ms": 30
            },
            "contacts": {
                "14": {
                    "name": "Alarm Contact 0",
                    "chip": "/dev/gpiochip0",
                    "line": 14,
                    "active_level": "high",
                    "pull": "pull-up"
                },
                "27": {
                    "name": "Alarm Contact 1",
                    "chip": "/dev/gpiochip0",
                    "line": 27,
                    "active_level": "low",
                    "pull": "floating"
                },
                "26": {
                    "name": "Alarm Contact 2",
                    "chip": "/dev/gpiochip1",
                    "line": 3
                }
            }
        }
        "#,
    )
    .expect("valid sample config")
}

#[test]
fn parses_contacts_keyed_by_pin() {
    let cfg = sample_config();
    assert_eq!(cfg.contacts.len(), 3);
    assert_eq!(cfg.debounce.quiet_interval(), Duration::from_millis(30));

    let first = cfg.contacts.get(&14).unwrap();
    assert_eq!(first.name, "Alarm Contact 0");
    assert_eq!(first.chip, "/dev/gpiochip0");
    assert_eq!(first.active_level, ActiveLevel::High);
    assert_eq!(first.pull, Pull::PullUp);

    let second = cfg.contacts.get(&27).unwrap();
    assert_eq!(second.active_level, ActiveLevel::Low);
    assert_eq!(second.pull, Pull::Floating);
}

#[test]
fn missing_fields_fall_back_to_defaults() {
    let cfg = sample_config();
    let third = cfg.contacts.get(&26).unwrap();
    assert_eq!(third.line, 3);
    assert_eq!(third.active_level, ActiveLevel::High);
    assert_eq!(third.pull, Pull::PullUp);

    let bare = AppConfig::from_json(r#"{ "contacts": {} }"#).unwrap();
    assert_eq!(bare.debounce, DebounceConfig::default());
    assert_eq!(bare.debounce.quiet_interval(), Duration::from_millis(50));
}

#[test]
fn invalid_json_is_a_config_error() {
    let err = AppConfig::from_json(r#"{ "contacts": { "1": { "name": 5 } } }"#).unwrap_err();
    assert!(matches!(err, DebounceError::Config(_)));

    let err = AppConfig::load_from_file("/nonexistent/contactd.json").unwrap_err();
    assert!(matches!(err, DebounceError::Config(_)));
}

#[test]
fn unknown_active_level_is_rejected() {
    let err = AppConfig::from_json(
        r#"{ "contacts": { "1": { "name": "x", "chip": "c", "line": 1, "active_level": "middle" } } }"#,
    )
    .unwrap_err();
    assert!(matches!(err, DebounceError::Config(_)));
}

#[test]
fn quiet_interval_saturates_instead_of_truncating() {
    let cfg = DebounceConfig::with_quiet_interval(Duration::from_millis(75));
    assert_eq!(cfg.quiet_interval_ms, 75);

    let cfg = DebounceConfig::with_quiet_interval(Duration::MAX);
    assert_eq!(cfg.quiet_interval_ms, u64::MAX);
}
