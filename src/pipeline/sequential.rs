//! Serial baseline: extract everything, then transform, then load.
//!
//! Same collaborators, error policy and report as the concurrent pipeline, on
//! a single blocking task. Useful as a timing reference; the report keeps the
//! input order.

use super::stages::{enrich, handle_parse_error, record_enrich_error, write_one, Pipeline, PipelineReport};
use crate::config::ExecutionMode;
use crate::error::{ParseError, PipelineError, WriteError};
use crate::io::OrderSource;
use crate::pipeline::PipelineState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

enum SequentialOutcome {
    Finished {
        aborted: Option<ParseError>,
        close_result: Result<(), WriteError>,
    },
    Cancelled,
}

impl Pipeline {
    pub(crate) async fn run_sequential<S>(self, mut source: S) -> Result<PipelineReport, PipelineError>
    where
        S: OrderSource + 'static,
    {
        let start = Instant::now();
        let cancelled = Arc::new(AtomicBool::new(false));

        self.state.advance(PipelineState::Running);
        tracing::info!("Starting sequential run");

        let catalog = self.catalog.clone();
        let sink = self.sink.clone();
        let metrics = self.metrics.clone();
        let state = self.state.clone();
        let policy = self.config.parse_policy;
        let transform_latency = self.config.transform_latency;
        let load_latency = self.config.load_latency;
        let stop = cancelled.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let mut orders = Vec::new();
            let mut aborted = None;
            while let Some(row) = source.next_order() {
                if stop.load(Ordering::Relaxed) {
                    return SequentialOutcome::Cancelled;
                }
                match row {
                    Ok(order) => {
                        metrics.add_order_extracted();
                        orders.push(order);
                    }
                    Err(e) => {
                        if let Err(e) = handle_parse_error(policy, &metrics, e) {
                            aborted = Some(e);
                            break;
                        }
                    }
                }
            }
            drop(source);
            state.advance(PipelineState::Draining);

            let mut enriched = Vec::with_capacity(orders.len());
            for order in orders {
                if stop.load(Ordering::Relaxed) {
                    return SequentialOutcome::Cancelled;
                }
                if !transform_latency.is_zero() {
                    std::thread::sleep(transform_latency);
                }
                let start = Instant::now();
                let result = enrich(&catalog, order);
                metrics.add_transform_time(start.elapsed());
                match result {
                    Ok(e) => {
                        metrics.add_order_enriched();
                        enriched.push(e);
                    }
                    Err(e) => record_enrich_error(&metrics, &e),
                }
            }

            for order in &enriched {
                if stop.load(Ordering::Relaxed) {
                    return SequentialOutcome::Cancelled;
                }
                if !load_latency.is_zero() {
                    std::thread::sleep(load_latency);
                }
                write_one(sink.as_ref(), &metrics, order);
            }

            SequentialOutcome::Finished {
                aborted,
                close_result: sink.close(),
            }
        });

        let joined = match self.config.completion_timeout {
            Some(limit) => match tokio::time::timeout(limit, handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::error!("Sequential run did not complete within {:?}", limit);
                    cancelled.store(true, Ordering::Relaxed);
                    return Err(PipelineError::Timeout(limit));
                }
            },
            None => handle.await,
        };

        let (aborted, close_result) = match joined.map_err(|e| PipelineError::stage("sequential", e))? {
            SequentialOutcome::Finished { aborted, close_result } => (aborted, close_result),
            SequentialOutcome::Cancelled => {
                return Err(PipelineError::stage("sequential", "cancelled"));
            }
        };

        let elapsed = start.elapsed();
        self.state.advance(PipelineState::Completed);

        close_result.map_err(PipelineError::SinkClose)?;
        if let Some(e) = aborted {
            return Err(PipelineError::ExtractionAborted(e));
        }

        Ok(PipelineReport {
            mode: ExecutionMode::Sequential,
            elapsed,
            metrics: self.metrics.snapshot(),
        })
    }
}
