use airscout_app::{
    config::{self, AnalysisOverrides},
    workflow,
};
use airscout_core::pipeline::PipelineBuilder;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "airscout", version, about = "Gas sensor calibration, AQI and anomaly analysis")]
struct Cli {
    /// Directory holding calibration.yaml, aqi.yaml and analysis.yaml
    #[arg(long, global = true, default_value = "./config")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Process a CSV file or every CSV file of a directory
    Process {
        /// Input CSV file or directory
        input: PathBuf,

        /// Root directory of the timestamped run directory
        #[arg(short, long, default_value = "./data/runs")]
        output: PathBuf,

        /// Number of files processed in parallel
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,

        /// Also write a JSON summary next to every output file
        #[arg(long)]
        summary_json: bool,

        #[command(flatten)]
        overrides: AnalysisOverrides,
    },
    /// Print the calibration profiles and their concentration at Rs/R0 = 1.0
    Reference,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "airscout starting");

    match cli.command {
        Command::Process {
            input,
            output,
            jobs,
            summary_json,
            overrides,
        } => {
            println!("--- AirScout Analytics ---");
            let config = config::load_config(&cli.config, &overrides)?;
            let engine = PipelineBuilder::new()
                .with_config(config)
                .build()
                .context("Failed to build the analysis pipeline")?;

            let inputs = workflow::discover_inputs(&input)?;
            let run_dir = workflow::create_run_dir(&output)?;
            println!("Processing {} file(s) into '{}'", inputs.len(), run_dir.display());

            let report = workflow::run_batch(&engine, &inputs, &run_dir, jobs, summary_json);
            workflow::write_markdown_report(&report)?;
            workflow::print_summary(&report);

            if report.processed.is_empty() {
                anyhow::bail!("No file could be processed");
            }
        }
        Command::Reference => {
            let config = config::load_config(&cli.config, &AnalysisOverrides::default())?;
            workflow::print_reference(&config);
        }
    }

    Ok(())
}
