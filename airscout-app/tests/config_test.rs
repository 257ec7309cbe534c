//! Integration tests for configuration loading and the batch driver

use airscout_app::{
    config::{load_config, AnalysisOverrides, ANALYSIS_FILE, AQI_FILE, CALIBRATION_FILE},
    workflow,
};
use airscout_core::pipeline::PipelineBuilder;
use airscout_schemas::settings::AnalysisSettings;
use std::{fs, path::Path};

#[test]
fn test_missing_directory_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(&dir.path().join("absent"), &AnalysisOverrides::default()).unwrap();

    assert_eq!(config.calibration.len(), 9);
    assert_eq!(config.aqi.pollutant_for("MQ135"), Some("NO2"));
    assert_eq!(config.settings.smoothing.span, 5);
}

#[test]
fn test_shipped_configuration_matches_defaults() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../config");
    let config = load_config(&dir, &AnalysisOverrides::default()).unwrap();

    assert_eq!(config.calibration.len(), 9);
    assert_eq!(config.settings, AnalysisSettings::default());
    assert_eq!(config.aqi.compute_for_sensor("MQ135", 206.95).unwrap().aqi, 155);
}

#[test]
fn test_load_config_from_directory() {
    let dir = tempfile::tempdir().unwrap();

    fs::write(
        dir.path().join(CALIBRATION_FILE),
        r#"
schema_version: "1.0"
sensors:
  - sensor_id: MQ135
    r0: 2800.0
    a: 40.0
    b: -1.1
    calibration_factor: 0.003
    molar_mass: 46.0
  - sensor_id: MQ131
    r0: 1500.0
    a: 25.0
    b: -1.2
    calibration_factor: 0.01
    molar_mass: 48.0
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join(AQI_FILE),
        r#"
schema_version: "1.0"
sensor_pollutants:
  - sensor_id: MQ131
    pollutant: O3
"#,
    )
    .unwrap();

    fs::write(
        dir.path().join(ANALYSIS_FILE),
        r#"
schema_version: "1.0"
smoothing:
  span: 10
events:
  window: 30
anomaly:
  contamination: 0.05
"#,
    )
    .unwrap();

    let config = load_config(dir.path(), &AnalysisOverrides::default()).unwrap();

    assert_eq!(config.calibration.len(), 10);
    assert_eq!(config.calibration.get("MQ135").unwrap().r0, 2800.0);
    assert_eq!(config.aqi.pollutant_for("MQ131"), Some("O3"));
    assert_eq!(config.aqi.pollutant_for("MQ7"), Some("CO"));
    assert_eq!(config.settings.smoothing.span, 10);
    assert_eq!(config.settings.events.window, 30);
    assert_eq!(config.settings.events.multiplier, 1.5);
    assert_eq!(config.settings.anomaly.contamination, 0.05);
    assert_eq!(config.settings.smoothing.excluded_channels.len(), 7);
    assert_eq!(config.settings.channels.excluded_suffixes.len(), 6);
}

#[test]
fn test_cli_overrides_win_over_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(ANALYSIS_FILE), "schema_version: \"1.0\"\nsmoothing:\n  span: 10\n").unwrap();

    let overrides = AnalysisOverrides {
        ema_span: Some(3),
        estimators: Some(50),
        ..Default::default()
    };
    let config = load_config(dir.path(), &overrides).unwrap();

    assert_eq!(config.settings.smoothing.span, 3);
    assert_eq!(config.settings.anomaly.estimators, 50);
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(CALIBRATION_FILE),
        "schema_version: \"1.0\"\nsensors:\n  - {sensor_id: MQ2, r0: -5.0, a: 1.0, b: -1.0, calibration_factor: 1.0, molar_mass: 44.0}\n",
    )
    .unwrap();
    assert!(load_config(dir.path(), &AnalysisOverrides::default()).is_err());

    let dir = tempfile::tempdir().unwrap();
    let overrides = AnalysisOverrides {
        contamination: Some(0.9),
        ..Default::default()
    };
    assert!(load_config(dir.path(), &overrides).is_err());
}

#[test]
fn test_malformed_yaml_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(ANALYSIS_FILE), "smoothing: [not, a, map").unwrap();
    let err = load_config(dir.path(), &AnalysisOverrides::default()).unwrap_err();
    assert!(format!("{:#}", err).contains(ANALYSIS_FILE));
}

#[test]
fn test_batch_run_skips_failing_files() {
    let data = tempfile::tempdir().unwrap();
    let mut good = String::from("DateTime,MQ135,Temperature\n");
    for i in 0..40 {
        good.push_str(&format!("2025-07-15 09:00:{:02},{},{}\n", i, 3300 + (i % 4) * 5, 20 + i % 3));
    }
    fs::write(data.path().join("good.csv"), good).unwrap();
    fs::write(data.path().join("empty.csv"), "DateTime,MQ135\n").unwrap();

    let out = tempfile::tempdir().unwrap();
    let engine = PipelineBuilder::new().build().unwrap();
    let inputs = workflow::discover_inputs(data.path()).unwrap();
    let run_dir = workflow::create_run_dir(out.path()).unwrap();

    let report = workflow::run_batch(&engine, &inputs, &run_dir, 2, true);
    assert_eq!(report.processed.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].0.ends_with("empty.csv"));
    assert!(run_dir.join("good_ema.csv").is_file());
    assert!(run_dir.join("good_summary.json").is_file());

    let report_path = workflow::write_markdown_report(&report).unwrap();
    let markdown = fs::read_to_string(report_path).unwrap();
    assert!(markdown.contains("| good | 40 |"));
    assert!(markdown.contains("## AQI per sensor"));
    assert!(markdown.contains("| good | MQ135 | NO2 |"));
    let stats = &report.processed[0].summary.aqi_stats["MQ135"];
    assert_eq!(stats.measurements, 40);
    assert!(markdown.contains("empty.csv"));
}
