//! CLI entry point for the vaccine-cutoff report.
//!
//! Provides subcommands for the full run (weekly tables, features, model and
//! ROC evaluation) and for exporting the intermediate tables on their own.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use vax_cutoff::{
    config::{CONFIRMED_US_URL, DEATHS_US_URL, PipelineConfig},
    features::engineer,
    fetch::BasicClient,
    output::{print_json, write_records},
    pipeline::{load_tables, run, write_outputs},
    tidy::tidy,
};

#[derive(Parser)]
#[command(name = "vax_cutoff")]
#[command(about = "Classify weekly US COVID-19 case trends as pre/post vaccine availability", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Sources {
    /// Confirmed-cases table (file or URL)
    #[arg(long, value_name = "FILE_OR_URL", default_value = CONFIRMED_US_URL)]
    cases: String,

    /// Deaths table with population (file or URL)
    #[arg(long, value_name = "FILE_OR_URL", default_value = DEATHS_US_URL)]
    deaths: String,

    /// JSON file with pipeline settings
    #[arg(long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline and write all tables and the report
    Run {
        #[command(flatten)]
        sources: Sources,

        /// Directory for CSV tables and JSON artifacts
        #[arg(short, long, default_value = "report")]
        output_dir: String,

        /// Weeks starting after this date are labelled post-vaccine
        #[arg(long)]
        cutoff: Option<NaiveDate>,

        /// Seed for the train/test draw
        #[arg(long)]
        seed: Option<u64>,

        /// Share of the smaller class used for training
        #[arg(long)]
        train_fraction: Option<f64>,
    },
    /// Write weekly state records to CSV
    Weekly {
        #[command(flatten)]
        sources: Sources,

        #[arg(short, long, default_value = "weekly.csv")]
        output: String,
    },
    /// Write complete feature records to CSV
    Features {
        #[command(flatten)]
        sources: Sources,

        #[arg(short, long, default_value = "features.csv")]
        output: String,

        /// Weeks starting after this date are labelled post-vaccine
        #[arg(long)]
        cutoff: Option<NaiveDate>,
    },
}

impl Sources {
    fn pipeline_config(&self, cutoff: Option<NaiveDate>) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("loading config from '{path}'"))?,
            None => PipelineConfig::default(),
        };
        if let Some(cutoff) = cutoff {
            config.cutoff = cutoff;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/vax_cutoff.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("vax_cutoff.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let client = BasicClient::new().context("building HTTP client")?;

    match cli.command {
        Commands::Run {
            sources,
            output_dir,
            cutoff,
            seed,
            train_fraction,
        } => {
            let mut config = sources.pipeline_config(cutoff)?;
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(fraction) = train_fraction {
                config.train_fraction = fraction;
            }

            let (cases, deaths) = load_tables(&client, &sources.cases, &sources.deaths).await?;
            let output = run(&cases, &deaths, &config)?;
            write_outputs(&output, &output_dir)
                .with_context(|| format!("writing outputs to '{output_dir}'"))?;
            print_json(&output.report)?;
        }
        Commands::Weekly { sources, output } => {
            // Only the week convention matters before feature engineering.
            let config = sources.pipeline_config(None)?;
            let (cases, deaths) = load_tables(&client, &sources.cases, &sources.deaths).await?;
            let weekly = tidy(&cases, &deaths, config.week_start)?;

            write_records(&output, &weekly).with_context(|| format!("writing '{output}'"))?;
            info!(rows = weekly.len(), output = %output, "Weekly records written");
        }
        Commands::Features {
            sources,
            output,
            cutoff,
        } => {
            let config = sources.pipeline_config(cutoff)?;
            let (cases, deaths) = load_tables(&client, &sources.cases, &sources.deaths).await?;
            let weekly = tidy(&cases, &deaths, config.week_start)?;
            let features = engineer(&weekly, &config);

            write_records(&output, &features).with_context(|| format!("writing '{output}'"))?;
            info!(rows = features.len(), output = %output, "Feature records written");
        }
    }

    Ok(())
}
