use super::{AppConfig, InterventionConfig, SessionConfig, SynthConfig};
use crate::error::PipelineError;
use crate::synth::SoundKind;
use clap::Parser;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

#[test]
fn accepts_valid_defaults() {
    let mut cfg = AppConfig::parse_from(["test-app"]);
    assert!(cfg.validate().is_ok());
    assert!(SessionConfig::default().validate().is_ok());
}

#[test]
fn rejects_thresholds_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--start-threshold", "101"]);
    assert!(cfg.validate().is_err());
    let mut cfg = AppConfig::parse_from(["test-app", "--calm-threshold=-1"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_calm_above_start() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--start-threshold",
        "40",
        "--calm-threshold",
        "45",
    ]);
    let err = cfg.validate().expect_err("calm above start must fail");
    assert!(format!("{err:#}").contains("calm_threshold"));
}

#[test]
fn rejects_volume_cap_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--volume-cap", "0"]);
    assert!(cfg.validate().is_err());
    let mut cfg = AppConfig::parse_from(["test-app", "--volume-cap", "1.5"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_baseline_above_cap() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--volume-cap",
        "0.5",
        "--baseline-volume",
        "0.6",
    ]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_level_out_of_bounds() {
    let mut cfg = AppConfig::parse_from(["test-app", "--level", "0"]);
    assert!(cfg.validate().is_err());
    let mut cfg = AppConfig::parse_from(["test-app", "--level", "4"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn trims_device_names_and_rejects_control_chars() {
    let mut cfg = AppConfig::parse_from(["test-app", "--input-device", "  USB Mic  "]);
    cfg.validate().expect("padded name should be accepted");
    assert_eq!(cfg.input_device.as_deref(), Some("USB Mic"));

    let mut cfg = AppConfig::parse_from(["test-app", "--output-device", "bad\nname"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_missing_config_file() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--config-file",
        "/definitely/not/here/hushwatch.json",
    ]);
    assert!(cfg.validate().is_err());
}

#[test]
fn flags_round_trip_into_session_config() {
    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--start-threshold",
        "65",
        "--cooldown-sec",
        "30",
        "--baseline-volume",
        "0.2",
        "--baseline-sound",
        "brown",
        "--predictive",
    ]);
    cfg.validate().expect("flags should be valid");
    let session = cfg.session_config().expect("session config");
    assert_eq!(session.intervention.start_threshold, 65.0);
    assert_eq!(session.intervention.cooldown_sec, 30);
    assert_eq!(session.intervention.baseline_volume, 0.2);
    assert_eq!(session.intervention.baseline_kind, SoundKind::Brown);
    assert!(session.intervention.predictive_enabled);
}

#[test]
fn loads_partial_json_config_with_defaults() {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!("hushwatch_cfg_{stamp}.json"));
    fs::write(
        &path,
        r#"{ "intervention": { "start_threshold": 60.0, "cooldown_sec": 45 } }"#,
    )
    .unwrap();

    let mut cfg = AppConfig::parse_from([
        "test-app",
        "--config-file",
        path.to_str().unwrap(),
    ]);
    cfg.validate().expect("config file should be accepted");
    let session = cfg.session_config().expect("session config");
    assert_eq!(session.intervention.start_threshold, 60.0);
    assert_eq!(session.intervention.cooldown_sec, 45);
    assert_eq!(
        session.intervention.calm_threshold,
        InterventionConfig::default().calm_threshold
    );
    let _ = fs::remove_file(path);
}

#[test]
fn json_with_negative_duration_is_invalid_config() {
    let err = SessionConfig::from_json_str(r#"{ "intervention": { "calm_confirm_sec": -3 } }"#)
        .expect_err("negative duration must be rejected");
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}

#[test]
fn json_with_threshold_out_of_range_is_not_clamped() {
    let err = SessionConfig::from_json_str(r#"{ "intervention": { "start_threshold": 150 } }"#)
        .expect_err("out of range threshold must be rejected");
    match err {
        PipelineError::InvalidConfig(msg) => assert!(msg.contains("start_threshold")),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn intervention_cap_cannot_exceed_synth_safety_cap() {
    let config = SessionConfig {
        intervention: InterventionConfig {
            volume_cap: 0.9,
            ..InterventionConfig::default()
        },
        synth: SynthConfig {
            safety_cap: 0.8,
            ..SynthConfig::default()
        },
        ..SessionConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn predictive_threshold_must_sit_below_start() {
    let config = InterventionConfig {
        predictive_escalation_threshold: 75.0,
        ..InterventionConfig::default()
    };
    assert!(config.validate().is_err());
}

#[test]
fn analysis_rejects_pitch_window_that_does_not_fit() {
    let mut analysis = super::AnalysisConfig::default();
    analysis.frame_samples = 1_024;
    analysis.hop_samples = 512;
    assert!(analysis.validate().is_err());
}

#[test]
fn analysis_lag_range_matches_pitch_range() {
    let analysis = super::AnalysisConfig::default();
    assert_eq!(analysis.min_lag(), 22);
    assert_eq!(analysis.max_lag(), 229);
    assert_eq!(analysis.hop_ms(), 128);
}
