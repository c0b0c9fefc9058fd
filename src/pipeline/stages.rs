//! Concurrent extract / transform / load stages.
//!
//! The pipeline is split into three stages connected by bounded handoff channels:
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Extract    │────▶│  Transform  │────▶│    Load     │──▶ done
//! │ (blocking)  │     │ N workers   │     │ ≤M writers  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                   │                   │
//!     order_rx           enriched_rx          done_rx
//! ```
//!
//! Each stage closes its output only after all of its own work has finished:
//! extraction closes the order channel once the source is exhausted, the
//! transform stage joins every worker before dropping the last enriched
//! sender, and the load stage joins every write unit and closes the sink
//! before sending the completion signal.
//!
//! Enrichment and writes run concurrently, so the report's row order is not
//! the input order.

use crate::catalog::Catalog;
use crate::config::{ExecutionMode, ParsePolicy, ProcessingConfig};
use crate::error::{EnrichError, LookupMiss, ParseError, PipelineError, WriteError};
use crate::io::{OrderSource, ReportSink};
use crate::model::{EnrichedOrder, OrderRecord};
use crate::pipeline::{Metrics, MetricsSnapshot, PipelineState, StateTracker};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrent stages or the serial baseline
    pub mode: ExecutionMode,
    /// Malformed order row handling
    pub parse_policy: ParsePolicy,
    /// Number of enrichment workers pulling from the order channel
    pub transform_workers: usize,
    /// Maximum in-flight write units
    pub load_concurrency: usize,
    /// Capacity of each handoff channel
    pub channel_buffer: usize,
    /// Give up if the completion signal has not fired by then
    pub completion_timeout: Option<Duration>,
    /// Artificial per-record delay before enrichment
    pub transform_latency: Duration,
    /// Artificial per-record delay before each write
    pub load_latency: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Concurrent,
            parse_policy: ParsePolicy::Skip,
            transform_workers: 16,
            load_concurrency: 16,
            channel_buffer: 1,
            completion_timeout: None,
            transform_latency: Duration::ZERO,
            load_latency: Duration::ZERO,
        }
    }
}

impl From<&ProcessingConfig> for PipelineConfig {
    fn from(processing: &ProcessingConfig) -> Self {
        Self {
            mode: processing.mode,
            parse_policy: processing.parse_policy,
            transform_workers: processing.transform_workers.max(1),
            load_concurrency: processing.load_concurrency.max(1),
            channel_buffer: processing.channel_buffer.max(1),
            completion_timeout: processing.completion_timeout_secs.map(Duration::from_secs),
            transform_latency: Duration::from_millis(processing.simulated_transform_latency_ms),
            load_latency: Duration::from_millis(processing.simulated_load_latency_ms),
        }
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub mode: ExecutionMode,
    /// Wall-clock time from start to the completion signal
    pub elapsed: Duration,
    pub metrics: MetricsSnapshot,
}

impl std::fmt::Display for PipelineReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} run completed in {:.3?}: {} written, {} parse errors, {} lookup misses, {} write failures",
            self.mode,
            self.elapsed,
            self.metrics.orders_written,
            self.metrics.parse_errors,
            self.metrics.lookup_misses,
            self.metrics.write_failures,
        )
    }
}

/// Join an order against the catalog.
pub fn enrich(catalog: &Catalog, order: OrderRecord) -> Result<EnrichedOrder, EnrichError> {
    let Some(entry) = catalog.get(&order.part_number) else {
        return Err(LookupMiss {
            customer_id: order.customer_id,
            part_number: order.part_number,
        }
        .into());
    };

    let part_number = order.part_number.clone();
    let quantity = order.quantity;
    EnrichedOrder::from_lookup(order, entry).ok_or(EnrichError::Overflow { part_number, quantity })
}

/// Apply the parse policy to a bad row. `Err` means stop extracting.
pub(crate) fn handle_parse_error(policy: ParsePolicy, metrics: &Metrics, err: ParseError) -> Result<(), ParseError> {
    metrics.add_parse_error();
    match policy {
        ParsePolicy::Skip => {
            tracing::warn!("Skipping malformed order row: {}", err);
            Ok(())
        }
        ParsePolicy::Strict => {
            tracing::error!("Aborting extraction on malformed order row: {}", err);
            Err(err)
        }
    }
}

/// Count and log an enrichment failure.
pub(crate) fn record_enrich_error(metrics: &Metrics, err: &EnrichError) {
    match err {
        EnrichError::LookupMiss(miss) => {
            tracing::warn!("Dropping order: {}", miss);
            metrics.add_lookup_miss();
        }
        EnrichError::Overflow { .. } => {
            tracing::warn!("Dropping order: {}", err);
            metrics.add_enrich_failure();
        }
    }
}

/// Append one order to the sink, counting the outcome.
pub(crate) fn write_one(sink: &dyn ReportSink, metrics: &Metrics, order: &EnrichedOrder) {
    let start = Instant::now();
    match sink.append(order) {
        Ok(()) => {
            metrics.add_write_time(start.elapsed());
            metrics.add_order_written();
        }
        Err(e) => {
            tracing::warn!(
                "Report write failed for customer {} part {}: {}",
                order.order.customer_id,
                order.part_number(),
                e
            );
            metrics.add_write_failure();
        }
    }
}

/// Decoupled pipeline executor.
pub struct Pipeline {
    pub(crate) catalog: Arc<Catalog>,
    pub(crate) sink: Arc<dyn ReportSink>,
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) config: PipelineConfig,
    pub(crate) state: StateTracker,
}

impl Pipeline {
    /// Create a new pipeline.
    pub fn new(
        catalog: Arc<Catalog>,
        sink: Arc<dyn ReportSink>,
        metrics: Arc<Metrics>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            catalog,
            sink,
            metrics,
            config,
            state: StateTracker::new(),
        }
    }

    /// Watch the lifecycle state of this pipeline.
    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> PipelineState {
        self.state.current()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Run the pipeline over `source` to completion.
    pub async fn run<S>(self, source: S) -> Result<PipelineReport, PipelineError>
    where
        S: OrderSource + 'static,
    {
        match self.config.mode {
            ExecutionMode::Concurrent => self.run_concurrent(source).await,
            ExecutionMode::Sequential => self.run_sequential(source).await,
        }
    }

    async fn run_concurrent<S>(self, source: S) -> Result<PipelineReport, PipelineError>
    where
        S: OrderSource + 'static,
    {
        let start = Instant::now();

        // Create channels between stages
        let buffer = self.config.channel_buffer.max(1);
        let (order_tx, order_rx) = async_channel::bounded::<OrderRecord>(buffer);
        let (enriched_tx, enriched_rx) = mpsc::channel::<EnrichedOrder>(buffer);
        let (done_tx, done_rx) = oneshot::channel::<Result<(), WriteError>>();

        // Held only to close the order channel if the run times out
        let cancel_handle = order_rx.clone();

        self.state.advance(PipelineState::Running);
        tracing::info!(
            "Starting pipeline ({} transform workers, {} load concurrency, buffer {})",
            self.config.transform_workers,
            self.config.load_concurrency,
            buffer
        );

        let load_handle = self.spawn_load_stage(enriched_rx, done_tx);
        let transform_handle = self.spawn_transform_stage(order_rx, enriched_tx);
        let extract_handle = self.spawn_extract_stage(source, order_tx);

        let completion = match self.config.completion_timeout {
            Some(limit) => match tokio::time::timeout(limit, done_rx).await {
                Ok(signal) => signal,
                Err(_) => {
                    tracing::error!("Pipeline did not complete within {:?}, closing order channel", limit);
                    cancel_handle.close();
                    return Err(PipelineError::Timeout(limit));
                }
            },
            None => done_rx.await,
        };
        drop(cancel_handle);

        let close_result = completion.map_err(|_| PipelineError::stage("load", "completion signal dropped"))?;

        let extracted = extract_handle.await.map_err(|e| PipelineError::stage("extract", e))?;
        let panicked_workers = transform_handle.await.map_err(|e| PipelineError::stage("transform", e))?;
        load_handle.await.map_err(|e| PipelineError::stage("load", e))?;

        let elapsed = start.elapsed();
        self.state.advance(PipelineState::Completed);

        if panicked_workers > 0 {
            return Err(PipelineError::stage(
                "transform",
                format!("{} worker(s) panicked", panicked_workers),
            ));
        }
        close_result.map_err(PipelineError::SinkClose)?;
        let extracted = extracted.map_err(PipelineError::ExtractionAborted)?;

        tracing::info!("Pipeline complete: {} orders extracted in {:.3?}", extracted, elapsed);

        Ok(PipelineReport {
            mode: ExecutionMode::Concurrent,
            elapsed,
            metrics: self.metrics.snapshot(),
        })
    }

    /// Spawn the extraction stage on the blocking pool.
    ///
    /// The source is owned by the task and dropped when it ends, releasing the
    /// input handle on every exit path. The order channel is closed exactly
    /// once, after the last send.
    fn spawn_extract_stage<S>(
        &self,
        mut source: S,
        order_tx: async_channel::Sender<OrderRecord>,
    ) -> JoinHandle<Result<u64, ParseError>>
    where
        S: OrderSource + 'static,
    {
        let metrics = self.metrics.clone();
        let policy = self.config.parse_policy;
        let state = self.state.clone();

        tokio::task::spawn_blocking(move || {
            let mut sent = 0u64;
            let mut outcome = Ok(());

            while let Some(row) = source.next_order() {
                match row {
                    Ok(order) => {
                        if order_tx.send_blocking(order).is_err() {
                            tracing::debug!("Order channel closed, stopping extraction");
                            break;
                        }
                        metrics.add_order_extracted();
                        sent += 1;
                    }
                    Err(e) => {
                        if let Err(e) = handle_parse_error(policy, &metrics, e) {
                            outcome = Err(e);
                            break;
                        }
                    }
                }
            }

            order_tx.close();
            drop(source);
            state.advance(PipelineState::Draining);
            tracing::info!("Extraction finished: {} orders sent", sent);

            outcome.map(|()| sent)
        })
    }

    /// Spawn the transform stage: a fixed pool of workers pulling from the
    /// shared order channel. Returns the number of workers that panicked.
    fn spawn_transform_stage(
        &self,
        order_rx: async_channel::Receiver<OrderRecord>,
        enriched_tx: mpsc::Sender<EnrichedOrder>,
    ) -> JoinHandle<usize> {
        let catalog = self.catalog.clone();
        let metrics = self.metrics.clone();
        let workers = self.config.transform_workers.max(1);
        let latency = self.config.transform_latency;

        tokio::spawn(async move {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                let catalog = catalog.clone();
                let metrics = metrics.clone();
                let order_rx = order_rx.clone();
                let enriched_tx = enriched_tx.clone();

                handles.push(tokio::spawn(async move {
                    while let Ok(order) = order_rx.recv().await {
                        if !latency.is_zero() {
                            tokio::time::sleep(latency).await;
                        }

                        let start = Instant::now();
                        let result = enrich(&catalog, order);
                        metrics.add_transform_time(start.elapsed());

                        match result {
                            Ok(enriched) => {
                                metrics.add_order_enriched();
                                if enriched_tx.send(enriched).await.is_err() {
                                    tracing::debug!("Load receiver dropped, stopping transform worker");
                                    break;
                                }
                            }
                            Err(e) => record_enrich_error(&metrics, &e),
                        }
                    }
                }));
            }
            drop(order_rx);

            // Join before close: the enriched channel closes when the last
            // sender clone goes away, which is only after every worker is done
            let mut panicked = 0;
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::warn!("Transform worker panicked: {}", e);
                    panicked += 1;
                }
            }
            drop(enriched_tx);

            tracing::info!("Transform stage finished");
            panicked
        })
    }

    /// Spawn the load stage: one write unit per enriched order, at most
    /// `load_concurrency` in flight. Sends the completion signal after every
    /// unit has finished and the sink is closed.
    fn spawn_load_stage(
        &self,
        mut enriched_rx: mpsc::Receiver<EnrichedOrder>,
        done_tx: oneshot::Sender<Result<(), WriteError>>,
    ) -> JoinHandle<()> {
        let sink = self.sink.clone();
        let metrics = self.metrics.clone();
        let load_concurrency = self.config.load_concurrency.max(1);
        let latency = self.config.load_latency;

        tokio::spawn(async move {
            let mut pending_futures: Vec<JoinHandle<()>> = Vec::new();

            while let Some(order) = enriched_rx.recv().await {
                let sink = sink.clone();
                let metrics = metrics.clone();

                let future = async move {
                    if !latency.is_zero() {
                        tokio::time::sleep(latency).await;
                    }
                    let metrics_clone = metrics.clone();
                    // Sink appends take a lock and may do blocking I/O
                    let result = tokio::task::spawn_blocking(move || {
                        write_one(sink.as_ref(), &metrics_clone, &order);
                    })
                    .await;
                    if let Err(e) = result {
                        tracing::warn!("Write unit panicked: {}", e);
                        metrics.add_write_failure();
                    }
                };

                pending_futures.push(tokio::spawn(future));

                // Limit concurrency
                while pending_futures.len() >= load_concurrency {
                    let (result, _idx, remaining) = futures::future::select_all(pending_futures).await;
                    if let Err(e) = result {
                        tracing::warn!("Write unit failed to join: {}", e);
                    }
                    pending_futures = remaining;
                }
            }

            // Input channel closed, wait for remaining work
            for handle in pending_futures {
                if let Err(e) = handle.await {
                    tracing::warn!("Write unit failed to join: {}", e);
                }
            }

            let close_sink = sink.clone();
            let close_result = match tokio::task::spawn_blocking(move || close_sink.close()).await {
                Ok(result) => result,
                Err(e) => Err(WriteError::Io(std::io::Error::other(e.to_string()))),
            };
            if let Err(e) = &close_result {
                tracing::error!("Failed to close report: {}", e);
            }

            tracing::info!("Load stage finished");
            if done_tx.send(close_result).is_err() {
                tracing::debug!("Driver stopped waiting for completion");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CatalogEntry, Money};

    fn catalog() -> Catalog {
        Catalog::from_entries(vec![CatalogEntry {
            part_number: "P1".to_string(),
            unit_cost: Money::from_cents(200),
            unit_price: Money::from_cents(300),
        }])
    }

    fn order(part: &str, quantity: u64) -> OrderRecord {
        OrderRecord {
            customer_id: 9,
            part_number: part.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.mode, ExecutionMode::Concurrent);
        assert_eq!(config.transform_workers, 16);
        assert_eq!(config.load_concurrency, 16);
        assert_eq!(config.channel_buffer, 1);
        assert!(config.completion_timeout.is_none());
    }

    #[test]
    fn test_pipeline_config_from_processing() {
        let processing = ProcessingConfig {
            transform_workers: 3,
            completion_timeout_secs: Some(5),
            simulated_load_latency_ms: 2,
            parse_policy: ParsePolicy::Strict,
            ..Default::default()
        };
        let config = PipelineConfig::from(&processing);
        assert_eq!(config.transform_workers, 3);
        assert_eq!(config.completion_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.load_latency, Duration::from_millis(2));
        assert_eq!(config.parse_policy, ParsePolicy::Strict);
    }

    #[test]
    fn test_enrich_hit() {
        let enriched = enrich(&catalog(), order("P1", 10)).unwrap();
        assert_eq!(enriched.unit_cost, Money::from_cents(200));
        assert_eq!(enriched.total_cost, Money::from_cents(2000));
        assert_eq!(enriched.total_price, Money::from_cents(3000));
    }

    #[test]
    fn test_enrich_miss() {
        let err = enrich(&catalog(), order("P3", 1)).unwrap_err();
        assert_eq!(
            err,
            EnrichError::LookupMiss(LookupMiss {
                customer_id: 9,
                part_number: "P3".to_string()
            })
        );
    }

    #[test]
    fn test_enrich_overflow() {
        let err = enrich(&catalog(), order("P1", u64::MAX / 2)).unwrap_err();
        assert!(matches!(err, EnrichError::Overflow { .. }));
    }

    #[test]
    fn test_parse_policy_handling() {
        let metrics = Metrics::new();
        assert!(handle_parse_error(ParsePolicy::Skip, &metrics, ParseError::new(1, "bad")).is_ok());
        assert!(handle_parse_error(ParsePolicy::Strict, &metrics, ParseError::new(2, "bad")).is_err());
        assert_eq!(metrics.snapshot().parse_errors, 2);
    }
}
