//! Order Enrichment Pipeline CLI
//!
//! Joins an order file against a product catalog and writes a cost/price report.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_enrich::{build_runtime, run_pipeline, Config, ExecutionMode, ParsePolicy};

#[derive(Parser)]
#[command(name = "order-enrich")]
#[command(about = "Enrich order records with catalog cost and price", long_about = None)]
struct Cli {
    /// Path to configuration file (defaults are used if it does not exist)
    #[arg(short, long, default_value = "config.yaml", global = true)]
    config: PathBuf,

    /// Override the order file
    #[arg(long, global = true)]
    orders: Option<PathBuf>,

    /// Override the catalog file
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Override the report file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Abort on the first malformed row instead of skipping it
    #[arg(long, global = true)]
    strict: bool,

    /// Run the serial baseline instead of the concurrent pipeline
    #[arg(long, global = true)]
    sequential: bool,

    /// Override the number of transform workers
    #[arg(long, global = true)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline (default if no command specified)
    Run,

    /// Validate configuration
    Validate,

    /// Generate a sample configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(long = "out-config", default_value = "config.yaml")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        None | Some(Commands::Run) => {
            let config = load_config(&cli)?;
            run_command(config)?;
        }

        Some(Commands::Validate) => {
            let config = load_config(&cli)?;
            config.validate()?;
            println!("Configuration is valid");
        }

        Some(Commands::GenerateConfig { path }) => {
            generate_config_command(path)?;
        }
    }

    Ok(())
}

/// Read the config file if present, then apply command-line overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        tracing::info!("No config at {}, using defaults", cli.config.display());
        Config::default()
    };

    if let Some(orders) = &cli.orders {
        config.input.orders_path = orders.clone();
    }
    if let Some(catalog) = &cli.catalog {
        config.input.catalog_path = catalog.clone();
    }
    if let Some(output) = &cli.output {
        config.output.path = output.clone();
    }
    if cli.strict {
        config.processing.parse_policy = ParsePolicy::Strict;
    }
    if cli.sequential {
        config.processing.mode = ExecutionMode::Sequential;
    }
    if let Some(workers) = cli.workers {
        config.processing.transform_workers = workers;
    }

    Ok(config)
}

fn run_command(config: Config) -> Result<()> {
    config.validate()?;

    let runtime = build_runtime(config.processing.worker_threads)?;
    let report = runtime.block_on(async { run_pipeline(config).await })?;

    println!("{:?}", report.elapsed);
    Ok(())
}

fn generate_config_command(output: &PathBuf) -> Result<()> {
    let yaml = r#"# Order Enrichment Pipeline Configuration

# === INPUT ===
input:
  # Orders: customer,part_number,quantity
  orders_path: "orders.txt"

  # Catalog: part_number,unit_cost,unit_price
  catalog_path: "productList.txt"

  # Skip the first row of both files
  has_headers: false

# === OUTPUT ===
output:
  # Fixed-width report, truncated at startup
  path: "dest.txt"

# === PROCESSING ===
processing:
  # skip: log and drop malformed rows; strict: stop at the first one
  parse_policy: skip

  # concurrent: three stages over handoff channels; sequential: serial baseline
  mode: concurrent

  # Enrichment workers pulling from the order channel
  transform_workers: 16

  # Maximum in-flight report writes
  load_concurrency: 16

  # Handoff channel capacity
  channel_buffer: 1

  # Tokio async worker threads (null = num CPUs)
  # worker_threads: 8

  # Abort if the run has not completed after this many seconds
  # completion_timeout_secs: 600

  # Artificial per-record delays, for comparing the two modes
  simulated_transform_latency_ms: 0
  simulated_load_latency_ms: 0

  # Periodic progress logging
  enable_metrics: true
  metrics_interval_secs: 10

  # Save final metrics as JSON
  # metrics_output_path: "metrics.json"
"#;

    std::fs::write(output, yaml)?;
    println!("Generated sample configuration at: {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_default() {
        // No subcommand - should default to Run
        let cli = Cli::try_parse_from(["order-enrich"]);
        assert!(cli.is_ok());
        assert!(cli.unwrap().command.is_none());
    }

    #[test]
    fn test_cli_overrides_apply() {
        let cli = Cli::try_parse_from([
            "order-enrich",
            "--config",
            "/nonexistent/config.yaml",
            "--orders",
            "in.csv",
            "--output",
            "out.txt",
            "--strict",
            "--sequential",
            "--workers",
            "3",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.input.orders_path, PathBuf::from("in.csv"));
        assert_eq!(config.output.path, PathBuf::from("out.txt"));
        assert_eq!(config.processing.parse_policy, ParsePolicy::Strict);
        assert_eq!(config.processing.mode, ExecutionMode::Sequential);
        assert_eq!(config.processing.transform_workers, 3);
    }

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::try_parse_from(["order-enrich", "validate", "-c", "test.json"]);
        assert!(cli.is_ok());
    }

    #[test]
    fn test_generate_config_flag_is_distinct_from_report_output() {
        let cli = Cli::try_parse_from([
            "order-enrich",
            "generate-config",
            "--out-config",
            "sample.yaml",
            "--output",
            "report.txt",
        ])
        .unwrap();

        match &cli.command {
            Some(Commands::GenerateConfig { path }) => assert_eq!(path, &PathBuf::from("sample.yaml")),
            _ => panic!("expected generate-config"),
        }
        assert_eq!(cli.output, Some(PathBuf::from("report.txt")));
    }

    #[test]
    fn test_generated_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        generate_config_command(&path).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.processing.transform_workers, 16);
    }
}
