//! Order Enrichment Pipeline
//!
//! Streams transactional order records through three concurrent stages,
//! joins each one against a reference product catalog, and writes a
//! fixed-width cost/price report.
//!
//! # Architecture
//!
//! - **Catalog**: immutable part-number lookup table, loaded once before any stage starts
//! - **I/O**: order/catalog sources and the report sink behind small traits
//! - **Pipeline**: extract → transform → load over bounded handoff channels,
//!   with bounded fan-out inside transform and load, join-before-close at every
//!   stage boundary, and a single completion signal
//!
//! # Usage
//!
//! ```no_run
//! use order_enrich::{Config, run_pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file(&"config.yaml".into())?;
//!     let report = run_pipeline(config).await?;
//!     println!("{}", report.elapsed.as_secs_f64());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod pipeline;

pub use catalog::{load_catalog, Catalog};
pub use config::{Config, ExecutionMode, ParsePolicy};
pub use error::{EnrichError, LookupMiss, ParseError, PipelineError, StartupError, WriteError};
pub use model::{CatalogEntry, EnrichedOrder, Money, OrderRecord};
pub use pipeline::{Metrics, Pipeline, PipelineConfig, PipelineReport, PipelineState};

use anyhow::Result;
use io::{CsvCatalogSource, CsvOrderSource, FixedWidthReport, ReportSink};
use pipeline::MetricsReporter;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Run the full pipeline with the given configuration.
///
/// Startup failures (unreadable catalog, missing orders file, report that
/// cannot be created) abort before any stage runs.
pub async fn run_pipeline(config: Config) -> Result<PipelineReport, PipelineError> {
    tracing::info!("Starting order enrichment pipeline");

    let metrics = Metrics::new();

    // Catalog must be fully loaded before anything is enriched
    tracing::info!("Loading catalog from {}", config.input.catalog_path.display());
    let mut catalog_source = CsvCatalogSource::open(&config.input.catalog_path, config.input.has_headers)?;
    let catalog = load_catalog(&mut catalog_source, config.processing.parse_policy, &metrics)?;
    drop(catalog_source);

    tracing::info!("Reading orders from {}", config.input.orders_path.display());
    let orders = CsvOrderSource::open(&config.input.orders_path, config.input.has_headers)?;

    tracing::info!("Writing report to {}", config.output.path.display());
    let sink: Arc<dyn ReportSink> = Arc::new(FixedWidthReport::create(&config.output.path)?);

    // Start metrics reporter if enabled
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    let reporter_handle = if config.processing.enable_metrics {
        let reporter = MetricsReporter::new(metrics.clone(), config.processing.metrics_interval_secs);
        Some(tokio::spawn(reporter.run(shutdown_rx)))
    } else {
        drop(shutdown_rx);
        None
    };

    let pipeline = Pipeline::new(catalog, sink, metrics.clone(), PipelineConfig::from(&config.processing));
    let result = pipeline.run(orders).await;

    // Shutdown metrics reporter
    let _ = shutdown_tx.send(()).await;
    if let Some(handle) = reporter_handle {
        let _ = handle.await;
    }

    if config.processing.enable_metrics {
        MetricsReporter::new(metrics.clone(), config.processing.metrics_interval_secs).print_summary();

        if let Some(ref path) = config.processing.metrics_output_path {
            if let Err(e) = metrics.snapshot().save_to_file(path) {
                tracing::warn!("Failed to save metrics to {}: {}", path, e);
            }
        }
    }

    match &result {
        Ok(report) => tracing::info!("{}", report),
        Err(e) => tracing::error!("Pipeline failed: {}", e),
    }
    result
}

/// Build a Tokio runtime with the specified configuration.
pub fn build_runtime(worker_threads: Option<usize>) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();

    if let Some(threads) = worker_threads {
        builder.worker_threads(threads);
    }

    builder.enable_all();

    Ok(builder.build()?)
}
