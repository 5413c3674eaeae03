use crate::config::{deep_merge, DetectSettings, DEFAULT_BUSY_SLACK, DEFAULT_POLL_INTERVAL};
use crate::{DetectionConfig, DialerConfig, DialerError};
use anyhow::{Context, Result};
use serde_json::json;
use std::time::Duration;

#[test]
fn test_detection_config_defaults_match_reference_values() {
    let config = DetectionConfig::default();
    assert_eq!(config.ring_timeout(), Duration::from_secs(15));
    assert_eq!(config.off_busy_threshold(), Duration::from_secs(3));
    assert_eq!(config.answered_grace(), Duration::from_millis(400));
    assert_eq!(config.poll_interval(), DEFAULT_POLL_INTERVAL);
    assert_eq!(config.busy_slack(), DEFAULT_BUSY_SLACK);
    assert_eq!(config.busy_boundary(), Duration::from_millis(3300));
    assert_eq!(config.answered_boundary(), Duration::from_millis(3400));

    assert_eq!(DetectionConfig::new(15.0, 3.0, 0.4).unwrap(), config);
}

#[test]
fn test_negative_thresholds_are_rejected() {
    for (ring, busy, grace) in [(-1.0, 3.0, 0.4), (15.0, -0.1, 0.4), (15.0, 3.0, -0.4)] {
        let err = DetectionConfig::new(ring, busy, grace).unwrap_err();
        assert!(
            matches!(err, DialerError::InvalidConfig(_)),
            "unexpected error for ({ring}, {busy}, {grace}): {err:?}"
        );
    }
}

#[test]
fn test_non_finite_thresholds_are_rejected() {
    assert!(DetectionConfig::new(f64::NAN, 3.0, 0.4).is_err());
    assert!(DetectionConfig::new(15.0, f64::INFINITY, 0.4).is_err());
}

#[test]
fn test_zero_thresholds_are_allowed_but_zero_poll_is_not() {
    let config = DetectionConfig::new(0.0, 0.0, 0.0).unwrap();
    assert_eq!(config.ring_timeout(), Duration::ZERO);
    assert!(config.with_poll_interval(Duration::ZERO).is_err());
}

#[test]
fn test_detect_settings_optional_keys() {
    let settings = DetectSettings {
        poll_interval: Some(0.1),
        busy_slack: Some(0.5),
        ..DetectSettings::default()
    };
    let config = DetectionConfig::try_from(&settings).unwrap();
    assert_eq!(config.poll_interval(), Duration::from_millis(100));
    assert_eq!(config.busy_slack(), Duration::from_millis(500));

    let zero_poll = DetectSettings {
        poll_interval: Some(0.0),
        ..DetectSettings::default()
    };
    assert!(DetectionConfig::try_from(&zero_poll).is_err());
}

#[test]
fn test_deep_merge_prefers_overlay_and_keeps_unknown_keys() {
    let base = json!({"a": 1, "nested": {"x": 1, "y": 2}, "list": [1, 2]});
    let overlay = json!({"nested": {"y": 20, "z": 30}, "list": [3], "extra": true});

    let merged = deep_merge(&base, &overlay);

    assert_eq!(
        merged,
        json!({"a": 1, "nested": {"x": 1, "y": 20, "z": 30}, "list": [3], "extra": true})
    );
}

#[test]
fn test_partial_document_is_merged_over_defaults() {
    let raw = r#"{
        "site_url": "https://pbx.example.com",
        "selectors": {"pause_indicator": "<i class=\"mdi mdi-pause\">"},
        "detect": {"ring_timeout": 25},
        "theme": "dark"
    }"#;

    let config = DialerConfig::from_json_str(raw).unwrap();

    assert_eq!(config.site_url, "https://pbx.example.com");
    assert_eq!(config.selectors.pause_indicator, r#"<i class="mdi mdi-pause">"#);
    assert_eq!(config.selectors.call_button, "button.call-now");
    assert_eq!(config.detect.ring_timeout, 25.0);
    assert_eq!(config.detect.off_busy_threshold, 3.0);
    assert_eq!(config.schedule.start, "09:00");
    assert_eq!(config.call.max_dial_attempts, 5);
    assert_eq!(config.extra.get("theme"), Some(&json!("dark")));

    let detection = config.detection().unwrap();
    assert_eq!(detection.ring_timeout(), Duration::from_secs(25));
}

#[test]
fn test_invalid_documents_fail_fast() {
    assert!(matches!(
        DialerConfig::from_json_str("[1, 2]"),
        Err(DialerError::InvalidConfig(_))
    ));
    assert!(matches!(
        DialerConfig::from_json_str("{not json"),
        Err(DialerError::Serialization(_))
    ));
    assert!(matches!(
        DialerConfig::from_json_str(r#"{"detect": {"answered_grace": -1}}"#),
        Err(DialerError::InvalidConfig(_))
    ));
    assert!(matches!(
        DialerConfig::from_json_str(r#"{"schedule": {"start": "9am"}}"#),
        Err(DialerError::InvalidSchedule(_))
    ));
    assert!(matches!(
        DialerConfig::from_json_str(r#"{"call": {"max_dial_attempts": 0}}"#),
        Err(DialerError::InvalidConfig(_))
    ));
}

#[test]
fn test_audio_playback_is_enabled_by_default() -> Result<()> {
    assert!(DialerConfig::default().audio.enabled);

    let config = DialerConfig::from_json_str(r#"{"audio": {"repeat": 2}}"#)?;
    assert!(config.audio.enabled);
    assert_eq!(config.audio.path, None);

    let config = DialerConfig::from_json_str(r#"{"audio": {"enabled": false}}"#)?;
    assert!(!config.audio.enabled);
    Ok(())
}

#[test]
fn test_load_or_init_writes_defaults_then_reads_them_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("config.json");

    let created = DialerConfig::load_or_init(&path).context("first load should create the file")?;
    assert!(path.exists());
    assert_eq!(created, DialerConfig::default());

    let mut edited = created.clone();
    edited.username = "operator".to_string();
    edited.audio.repeat = 3;
    edited.save(&path)?;

    let reloaded = DialerConfig::load_or_init(&path)?;
    assert_eq!(reloaded, edited);
    Ok(())
}

#[test]
fn test_load_missing_file_is_io_error() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let err = DialerConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, DialerError::Io(_)));
    Ok(())
}
