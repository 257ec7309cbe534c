use airscout_core::{
    analysis::BatchSummary,
    batch::ColumnRole,
    logger::{read_batch, write_summary_json, BatchWriter},
    pipeline::PipelineBuilder,
    PipelineConfig,
};
use approx::assert_relative_eq;
use std::{fmt::Write as _, fs};

fn sensor_csv(rows: usize) -> String {
    let mut csv = String::from("# forest run, sensor board rev B\n");
    csv.push_str("DateTime,MQ135,MQ7,Temperature,Humidity,GPS_Lat,GPS_Lon\n");
    for i in 0..rows {
        let mq135 = if i == 50 { 1200.0 } else { 3300.0 + (i % 5) as f64 * 4.0 };
        let mq7 = if i == 33 { String::new() } else { format!("{}", 2400 + (i % 3) * 10) };
        let _ = writeln!(
            csv,
            "2025-07-15 08:{:02}:{:02},{},{},{:.1},{:.1},49.40{},8.69",
            i / 60,
            i % 60,
            mq135,
            mq7,
            21.0 + (i % 4) as f64 * 0.1,
            48.0 + (i % 6) as f64 * 0.5,
            i % 10,
        );
    }
    csv
}

#[test]
fn processes_a_csv_file_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("forest_walk.csv");
    fs::write(&input, sensor_csv(100)).unwrap();

    let config = PipelineConfig::default();
    let batch = read_batch(&input, &config.settings.channels).unwrap();
    assert_eq!(batch.name(), "forest_walk");
    assert_eq!(batch.rows(), 100);
    assert_eq!(batch.channels(ColumnRole::Gas), vec!["MQ135", "MQ7"]);
    assert_eq!(batch.column("GPS_Lat").unwrap().role, ColumnRole::Passthrough);

    let engine = PipelineBuilder::new().with_config(config).build().unwrap();
    let outcome = engine.process(batch).unwrap();
    let batch = &outcome.batch;

    // conversion is done on the raw reading of each row
    assert_relative_eq!(batch.numeric("MQ135_ppm").unwrap()[0].unwrap(), 0.11);
    assert_relative_eq!(batch.numeric("MQ135_ugm3").unwrap()[0].unwrap(), 206.95);
    assert_eq!(batch.numeric("MQ135_aqi").unwrap()[0], Some(155.0));
    assert_eq!(batch.numeric("MQ7_ppm").unwrap()[33], None);

    // the dip in resistance at row 50 is a concentration spike
    assert_eq!(batch.numeric("MQ135_outlier").unwrap()[50], Some(1.0));

    // GPS channels are neither smoothed nor scored
    assert!(!batch.contains("GPS_Lat_zscore"));
    assert_eq!(batch.numeric("GPS_Lat").unwrap()[3], Some(49.403));

    let summary = BatchSummary::from_outcome(&outcome, &engine.config().aqi);
    assert_eq!(summary.rows, 100);
    assert_eq!(summary.environmental_channels, 2);
    assert!(summary.anomalies >= 1 && summary.anomalies <= 15);

    let output = dir.path().join("forest_walk_ema.csv");
    let mut writer = BatchWriter::new(&output).unwrap();
    writer
        .write_batch(
            batch,
            &engine.config().settings.output,
            &engine.config().settings.smoothing.excluded_channels,
        )
        .unwrap();
    drop(writer);

    let reread = read_batch(&output, &engine.config().settings.channels).unwrap();
    assert_eq!(reread.rows(), 100);
    assert_eq!(reread.columns().len(), batch.columns().len());
    assert_eq!(reread.column("MQ135_aqi_category").unwrap().cell(0), "Unhealthy");
    assert_eq!(reread.numeric("MQ7_ppm").unwrap()[33], None);
    let flags = reread.numeric("ml_anomaly").unwrap();
    assert!(flags.iter().all(|f| matches!(f, Some(v) if *v == 0.0 || *v == 1.0)));

    let summary_path = dir.path().join("forest_walk_summary.json");
    write_summary_json(&summary_path, &summary).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(summary_path).unwrap()).unwrap();
    assert_eq!(json["batch"], "forest_walk");
    assert_eq!(json["worst_aqi"]["MQ135"]["row"], 50);
}

#[test]
fn same_input_gives_identical_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("repeat.csv");
    fs::write(&input, sensor_csv(80)).unwrap();

    let engine = PipelineBuilder::new().build().unwrap();
    let settings = &engine.config().settings;

    let mut written = Vec::new();
    for run in 0..2 {
        let batch = read_batch(&input, &settings.channels).unwrap();
        let outcome = engine.process(batch).unwrap();
        let path = dir.path().join(format!("run{}.csv", run));
        let mut writer = BatchWriter::new(&path).unwrap();
        writer
            .write_batch(&outcome.batch, &settings.output, &settings.smoothing.excluded_channels)
            .unwrap();
        drop(writer);
        written.push(fs::read_to_string(path).unwrap());
    }
    assert_eq!(written[0], written[1]);
}

#[test]
fn reprocessed_file_keeps_derived_columns_and_glitched_rows() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("walk_ema.csv");
    let mut csv = String::from("DateTime,MQ135,Temperature,Temperature_zscore,Humidity_outlier,Light_intensity\n");
    for i in 0..40 {
        let mq135 = if i == 7 { "ERR".to_string() } else { format!("{}", 3300 + (i % 4) * 5) };
        let _ = writeln!(
            csv,
            "2025-07-15 09:00:{:02},{},{},0.5,{},0.123456",
            i,
            mq135,
            20 + i % 3,
            u8::from(i % 9 == 0),
        );
    }
    fs::write(&input, csv).unwrap();

    let engine = PipelineBuilder::new().build().unwrap();
    let settings = &engine.config().settings;
    let batch = read_batch(&input, &settings.channels).unwrap();
    assert_eq!(batch.column("MQ135").unwrap().role, ColumnRole::Gas);
    assert_eq!(batch.column("Humidity_outlier").unwrap().role, ColumnRole::Score);
    assert_eq!(batch.sensor_channels(), vec!["MQ135", "Temperature"]);
    let flags_in: Vec<Option<f64>> = batch.numeric("Humidity_outlier").unwrap().to_vec();

    let outcome = engine.process(batch).unwrap();
    let batch = &outcome.batch;

    // the unparsable reading only invalidates its own row
    assert_eq!(batch.numeric("MQ135_ppm").unwrap()[7], None);
    assert_relative_eq!(batch.numeric("MQ135_ppm").unwrap()[8].unwrap(), 0.11);
    assert!(batch.contains("MQ135_zscore"));
    assert!(batch.contains("MQ135_event"));

    // derived input columns are neither smoothed nor scored again
    assert_eq!(batch.numeric("Humidity_outlier").unwrap(), flags_in.as_slice());
    assert!(!batch.contains("Humidity_outlier_zscore"));
    assert!(!batch.contains("Temperature_zscore_zscore"));
    assert!(!batch.contains("Light_intensity_zscore"));

    let output = dir.path().join("walk_ema_ema.csv");
    let mut writer = BatchWriter::new(&output).unwrap();
    writer
        .write_batch(batch, &settings.output, &settings.smoothing.excluded_channels)
        .unwrap();
    drop(writer);
    let reread = read_batch(&output, &settings.channels).unwrap();
    assert_eq!(reread.numeric("Light_intensity").unwrap()[0], Some(0.123456));
}
