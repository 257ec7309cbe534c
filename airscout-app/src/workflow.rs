use airscout_core::{
    analysis::BatchSummary,
    conversion::ConcentrationConverter,
    logger::{self, BatchWriter},
    pipeline::PipelineEngine,
    PipelineConfig,
};
use airscout_schemas::reading::RawSample;
use anyhow::{bail, Context, Result};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    thread,
};
use tracing::{error, info, warn};

pub const REPORT_FILE: &str = "analysis_report.md";

/// The result of one successfully processed input file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub summary: BatchSummary,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub run_dir: PathBuf,
    pub processed: Vec<FileReport>,
    pub failed: Vec<(PathBuf, String)>,
}

/// A single file, or every `*.csv` / `*.CSV` file of a directory, sorted.
///
/// Two inputs whose names differ only in the extension would write the same
/// output files, so they are rejected.
pub fn discover_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("Input path does not exist: {:?}", input);
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(input).with_context(|| format!("Failed to read directory: {:?}", input))? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |e| e == "csv" || e == "CSV") {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        bail!("No CSV files found in {:?}", input);
    }

    let mut stems: BTreeMap<String, &PathBuf> = BTreeMap::new();
    for file in &files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Some(previous) = stems.insert(stem, file) {
            bail!(
                "Inputs {:?} and {:?} would write the same output file; rename one of them",
                previous,
                file
            );
        }
    }
    Ok(files)
}

/// Creates `<root>/airscout_<YYYYmmdd_HHMMSS>`.
pub fn create_run_dir(root: &Path) -> Result<PathBuf> {
    let run_dir = root.join(format!("airscout_{}", chrono::Local::now().format("%Y%m%d_%H%M%S")));
    fs::create_dir_all(&run_dir).with_context(|| format!("Failed to create output directory: {:?}", run_dir))?;
    Ok(run_dir)
}

/// Reads, processes and writes one input file into `run_dir`.
pub fn process_file(
    engine: &PipelineEngine,
    input: &Path,
    run_dir: &Path,
    summary_json: bool,
) -> Result<FileReport> {
    let settings = &engine.config().settings;

    let batch = logger::read_batch(input, &settings.channels)?;
    let outcome = engine
        .process(batch)
        .with_context(|| format!("Failed to process {:?}", input))?;
    let summary = BatchSummary::from_outcome(&outcome, &engine.config().aqi);

    let stem = outcome.batch.name().to_string();
    let output = run_dir.join(format!("{}{}.csv", stem, settings.output.file_suffix));
    let mut writer = BatchWriter::new(&output)?;
    writer.write_batch(&outcome.batch, &settings.output, &settings.smoothing.excluded_channels)?;

    if summary_json {
        logger::write_summary_json(&run_dir.join(format!("{}_summary.json", stem)), &summary)?;
    }

    info!(
        file = %input.display(),
        rows = summary.rows,
        outliers = summary.total_outliers(),
        gas_events = summary.total_events(),
        anomalies = summary.anomalies,
        "file processed"
    );

    Ok(FileReport {
        input: input.to_path_buf(),
        output,
        summary,
    })
}

/// Processes every input on up to `jobs` worker threads. A failing file is
/// recorded and skipped; it never stops the run.
pub fn run_batch(
    engine: &PipelineEngine,
    inputs: &[PathBuf],
    run_dir: &Path,
    jobs: usize,
    summary_json: bool,
) -> RunReport {
    let jobs = jobs.clamp(1, inputs.len().max(1));
    let chunks: Vec<Vec<(usize, &PathBuf)>> = (0..jobs)
        .map(|worker| inputs.iter().enumerate().skip(worker).step_by(jobs).collect())
        .collect();

    let mut results: Vec<(usize, PathBuf, Result<FileReport>)> = thread::scope(|scope| {
        let handles: Vec<_> = chunks
            .iter()
            .map(|chunk| {
                let handle = scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|&(i, path)| (i, path.clone(), process_file(engine, path, run_dir, summary_json)))
                        .collect::<Vec<_>>()
                });
                (chunk, handle)
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|(chunk, handle)| match handle.join() {
                Ok(results) => results,
                Err(_) => {
                    error!(files = chunk.len(), "worker thread panicked");
                    chunk
                        .iter()
                        .map(|&(i, path)| (i, path.clone(), Err(anyhow::anyhow!("worker thread panicked"))))
                        .collect()
                }
            })
            .collect()
    });
    results.sort_by_key(|(i, _, _)| *i);

    let mut report = RunReport {
        run_dir: run_dir.to_path_buf(),
        ..Default::default()
    };
    for (_, path, result) in results {
        match result {
            Ok(file) => report.processed.push(file),
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{:#}", e), "skipping file");
                report.failed.push((path, format!("{:#}", e)));
            }
        }
    }
    report
}

/// Writes a Markdown table with one line per processed file.
pub fn write_markdown_report(report: &RunReport) -> Result<PathBuf> {
    let mut table = String::from("# AirScout Analysis Report\n\n");
    table.push_str("| File | Rows | Outliers | Gas events | ML anomalies | Worst AQI |\n");
    table.push_str("|------|------|----------|------------|--------------|-----------|\n");

    for file in &report.processed {
        let s = &file.summary;
        let worst = match s.overall_worst() {
            Some((sensor, peak)) => format!("{} {} ({})", sensor, peak.aqi, peak.category),
            None => "N/A".to_string(),
        };
        table.push_str(&format!(
            "| {} | {} | {} | {} | {} ({:.1}%) | {} |\n",
            s.batch,
            s.rows,
            s.total_outliers(),
            s.total_events(),
            s.anomalies,
            s.anomaly_percent,
            worst
        ));
    }

    let aqi_rows: Vec<_> = report
        .processed
        .iter()
        .flat_map(|file| {
            let batch = &file.summary.batch;
            file.summary.aqi_stats.iter().map(move |(sensor, stats)| (batch, sensor, stats))
        })
        .collect();
    if !aqi_rows.is_empty() {
        table.push_str("\n## AQI per sensor\n\n");
        table.push_str("| File | Sensor | Pollutant | Concentration µg/m³ | AQI | Prevailing category | Measurements | Rating |\n");
        table.push_str("|------|--------|-----------|---------------------|-----|---------------------|--------------|--------|\n");
        for (batch, sensor, stats) in aqi_rows {
            table.push_str(&format!(
                "| {} | {} | {} | {}-{} (mean {}) | {}-{} (mean {}) | {} | {} | {} |\n",
                batch,
                sensor,
                stats.pollutant,
                stats.concentration_min,
                stats.concentration_max,
                stats.concentration_mean,
                stats.aqi_min,
                stats.aqi_max,
                stats.aqi_mean,
                stats.prevailing_category,
                stats.measurements,
                stats.rating()
            ));
        }
    }

    if !report.failed.is_empty() {
        table.push_str("\n## Failed files\n\n");
        for (path, reason) in &report.failed {
            table.push_str(&format!("- `{}`: {}\n", path.display(), reason));
        }
    }

    let path = report.run_dir.join(REPORT_FILE);
    fs::write(&path, table).with_context(|| format!("Failed to write report: {:?}", path))?;
    Ok(path)
}

pub fn print_summary(report: &RunReport) {
    println!("\n--- [Final Summary Report] ---");
    println!("========================================");
    println!("Files processed: {}", report.processed.len());
    println!("Files failed:    {}", report.failed.len());
    for file in &report.processed {
        let s = &file.summary;
        println!("\n{} -> {}", file.input.display(), file.output.display());
        println!("  - Rows: {}, added columns: {}", s.rows, s.added_columns);
        println!("  - Z-score outliers: {}", s.total_outliers());
        println!("  - Gas events: {}", s.total_events());
        println!("  - ML anomalies: {} ({:.1}%)", s.anomalies, s.anomaly_percent);
        for (sensor, peak) in &s.worst_aqi {
            println!("  - Worst {} AQI: {} ({})", sensor, peak.aqi, peak.category);
        }
        for (sensor, stats) in &s.aqi_stats {
            println!("\n  {} ({}):", sensor, stats.pollutant);
            println!(
                "    Concentration: {}-{} µg/m³ (mean {})",
                stats.concentration_min, stats.concentration_max, stats.concentration_mean
            );
            println!("    AQI range:     {}-{} (mean {})", stats.aqi_min, stats.aqi_max, stats.aqi_mean);
            println!("    Prevailing category: {}", stats.prevailing_category);
            println!("    Measurements: {}", stats.measurements);
            println!("    Rating: {}", stats.rating());
        }
    }
    for (path, reason) in &report.failed {
        println!("\nFAILED {}: {}", path.display(), reason);
    }
    println!("========================================");
    println!("Results are in '{}'", report.run_dir.display());
}

/// Concentration of every calibrated sensor at the reference ratio 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    pub sensor_id: String,
    pub ppm: Option<f64>,
    pub ugm3: Option<f64>,
}

pub fn reference_values(config: &PipelineConfig) -> Vec<ReferenceRow> {
    let converter = ConcentrationConverter::new(config.settings.conversion.clone());
    config
        .calibration
        .sensor_ids()
        .into_iter()
        .filter_map(|id| {
            let profile = config.calibration.get(id)?;
            let sample = RawSample {
                sensor_id: id.to_string(),
                timestamp: "reference".to_string(),
                raw_value: profile.r0,
            };
            let result = converter.convert_sample(&sample, &config.calibration).ok()?;
            Some(ReferenceRow {
                sensor_id: sample.sensor_id,
                ppm: result.ppm,
                ugm3: result.ugm3,
            })
        })
        .collect()
}

pub fn print_reference(config: &PipelineConfig) {
    let fmt = |v: Option<f64>| v.map_or_else(|| "invalid".to_string(), |v| format!("{:.2}", v));

    println!("\n--- [Calibration Reference at Rs/R0 = 1.0] ---");
    println!("{:<8} {:>8} {:>8} {:>6} {:>8} {:>7} {:>10} {:>10}", "Sensor", "R0", "a", "b", "CF", "M", "ppm", "ug/m3");
    for row in reference_values(config) {
        if let Some(p) = config.calibration.get(&row.sensor_id) {
            println!(
                "{:<8} {:>8} {:>8} {:>6} {:>8} {:>7} {:>10} {:>10}",
                p.sensor_id,
                p.r0,
                p.a,
                p.b,
                p.calibration_factor,
                p.molar_mass,
                fmt(row.ppm),
                fmt(row.ugm3)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_uses_the_power_law_coefficient() {
        let rows = reference_values(&PipelineConfig::default());
        let mq135 = rows.iter().find(|r| r.sensor_id == "MQ135").unwrap();
        // 40 * 1^-1.1 * 0.003 = 0.12 ppm
        assert_eq!(mq135.ppm, Some(0.12));
        assert_eq!(mq135.ugm3, Some(225.77));
        assert_eq!(rows.len(), 9);
    }

    #[test]
    fn discovers_both_extension_cases() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.CSV", "a.csv", "notes.txt"] {
            fs::write(dir.path().join(name), "x\n1\n").unwrap();
        }
        let files = discover_inputs(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
        assert_eq!(names, vec!["a.csv", "b.CSV"]);
    }

    #[test]
    fn inputs_differing_only_in_extension_case_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
        fs::write(dir.path().join("a.CSV"), "x\n2\n").unwrap();
        // case-insensitive filesystems keep a single file
        if fs::read_dir(dir.path()).unwrap().count() < 2 {
            return;
        }
        let err = discover_inputs(dir.path()).unwrap_err();
        assert!(err.to_string().contains("same output file"));
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(discover_inputs(dir.path()).is_err());
    }
}
