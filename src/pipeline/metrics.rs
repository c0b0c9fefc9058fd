//! Throughput monitoring and metrics collection.

use serde::{Serialize, Serializer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::interval;

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Orders parsed and sent by the extraction stage
    pub orders_extracted: AtomicU64,

    /// Malformed order or catalog rows
    pub parse_errors: AtomicU64,

    /// Orders joined against the catalog
    pub orders_enriched: AtomicU64,

    /// Orders whose part number was not in the catalog
    pub lookup_misses: AtomicU64,

    /// Orders dropped because a derived total overflowed
    pub enrich_failures: AtomicU64,

    /// Rows appended to the report
    pub orders_written: AtomicU64,

    /// Failed report appends
    pub write_failures: AtomicU64,

    /// Start time
    start_time: Option<Instant>,

    /// Time spent enriching (microseconds, summed across workers)
    pub transform_us: AtomicU64,

    /// Time spent appending to the report (microseconds, summed across units)
    pub write_us: AtomicU64,
}

impl Metrics {
    /// Create new metrics.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        })
    }

    pub fn add_order_extracted(&self) {
        self.orders_extracted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_order_enriched(&self) {
        self.orders_enriched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_lookup_miss(&self) {
        self.lookup_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_enrich_failure(&self) {
        self.enrich_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_order_written(&self) {
        self.orders_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record time spent enriching (in microseconds).
    pub fn add_transform_time(&self, duration: Duration) {
        self.transform_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record time spent writing (in microseconds).
    pub fn add_write_time(&self, duration: Duration) {
        self.write_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start_time.map_or(Duration::ZERO, |t| t.elapsed())
    }

    /// Get written orders per second.
    pub fn orders_per_second(&self) -> f64 {
        let written = self.orders_written.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            written as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            orders_extracted: self.orders_extracted.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            orders_enriched: self.orders_enriched.load(Ordering::Relaxed),
            lookup_misses: self.lookup_misses.load(Ordering::Relaxed),
            enrich_failures: self.enrich_failures.load(Ordering::Relaxed),
            orders_written: self.orders_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            orders_per_second: self.orders_per_second(),
            transform_secs: self.transform_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
            write_secs: self.write_us.load(Ordering::Relaxed) as f64 / 1_000_000.0,
        }
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub orders_extracted: u64,
    pub parse_errors: u64,
    pub orders_enriched: u64,
    pub lookup_misses: u64,
    pub enrich_failures: u64,
    pub orders_written: u64,
    pub write_failures: u64,
    #[serde(serialize_with = "serialize_duration")]
    pub elapsed: Duration,
    pub orders_per_second: f64,
    /// Total time spent enriching (seconds, summed across workers)
    pub transform_secs: f64,
    /// Total time spent writing (seconds, summed across units)
    pub write_secs: f64,
}

impl MetricsSnapshot {
    /// Save metrics to a JSON file.
    pub fn save_to_file(&self, path: &str) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!("Metrics saved to {}", path);
        Ok(())
    }

    /// Orders that entered the pipeline but did not reach the report.
    pub fn dropped(&self) -> u64 {
        self.lookup_misses + self.enrich_failures + self.write_failures
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Orders: {} extracted, {} enriched, {} written | \
             Errors: {} parse, {} lookup miss, {} enrich, {} write | \
             Rate: {:.1} orders/s | Elapsed: {:.1}s",
            self.orders_extracted,
            self.orders_enriched,
            self.orders_written,
            self.parse_errors,
            self.lookup_misses,
            self.enrich_failures,
            self.write_failures,
            self.orders_per_second,
            self.elapsed.as_secs_f64(),
        )
    }
}

/// Periodic metrics reporter.
pub struct MetricsReporter {
    metrics: Arc<Metrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    /// Create a new metrics reporter.
    pub fn new(metrics: Arc<Metrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporter.
    pub async fn run(self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick fires immediately; nothing to report yet
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let snapshot = self.metrics.snapshot();
                    let in_flight = snapshot
                        .orders_extracted
                        .saturating_sub(snapshot.orders_written + snapshot.dropped());
                    tracing::info!("[{} in flight] {}", in_flight, snapshot);
                }
                _ = shutdown.recv() => {
                    let snapshot = self.metrics.snapshot();
                    tracing::info!("Final: {}", snapshot);
                    break;
                }
            }
        }
    }

    /// Print a final summary.
    pub fn print_summary(&self) {
        let snapshot = self.metrics.snapshot();

        println!("\n=== Pipeline Summary ===");
        println!("Total time: {:.3}s", snapshot.elapsed.as_secs_f64());
        println!("Orders extracted: {}", snapshot.orders_extracted);
        println!("Orders enriched: {}", snapshot.orders_enriched);
        println!("Orders written: {}", snapshot.orders_written);
        println!("Parse errors: {}", snapshot.parse_errors);
        println!("Lookup misses: {}", snapshot.lookup_misses);
        println!("Enrich failures: {}", snapshot.enrich_failures);
        println!("Write failures: {}", snapshot.write_failures);
        println!("Processing rate: {:.1} orders/s", snapshot.orders_per_second);

        let total_component = snapshot.transform_secs + snapshot.write_secs;
        if total_component > 0.0 {
            println!("\n--- Stage Time Breakdown ---");
            println!("Transform: {:>7.3}s ({:>5.1}%)", snapshot.transform_secs, snapshot.transform_secs / total_component * 100.0);
            println!("Write:     {:>7.3}s ({:>5.1}%)", snapshot.write_secs, snapshot.write_secs / total_component * 100.0);
        }
        println!("========================\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_snapshot() {
        let metrics = Metrics::new();

        metrics.add_order_extracted();
        metrics.add_order_extracted();
        metrics.add_order_extracted();
        metrics.add_order_enriched();
        metrics.add_order_enriched();
        metrics.add_lookup_miss();
        metrics.add_order_written();
        metrics.add_write_failure();
        metrics.add_parse_error();

        let snapshot = metrics.snapshot();

        assert_eq!(snapshot.orders_extracted, 3);
        assert_eq!(snapshot.orders_enriched, 2);
        assert_eq!(snapshot.lookup_misses, 1);
        assert_eq!(snapshot.orders_written, 1);
        assert_eq!(snapshot.write_failures, 1);
        assert_eq!(snapshot.parse_errors, 1);
        assert_eq!(snapshot.dropped(), 2);
    }

    #[test]
    fn test_timing_metrics() {
        let metrics = Metrics::new();

        metrics.add_transform_time(Duration::from_millis(100));
        metrics.add_write_time(Duration::from_millis(50));

        let snapshot = metrics.snapshot();

        assert!((snapshot.transform_secs - 0.1).abs() < 0.001);
        assert!((snapshot.write_secs - 0.05).abs() < 0.001);
    }

    #[test]
    fn test_snapshot_display() {
        let metrics = Metrics::new();
        metrics.add_order_extracted();
        metrics.add_lookup_miss();

        let display = format!("{}", metrics.snapshot());

        assert!(display.contains("1 extracted"));
        assert!(display.contains("1 lookup miss"));
    }

    #[test]
    fn test_snapshot_serializes_elapsed_as_seconds() {
        let metrics = Metrics {
            start_time: None,
            ..Default::default()
        };
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["elapsed"], serde_json::json!(0.0));
        assert_eq!(json["orders_written"], serde_json::json!(0));
    }

    #[test]
    fn test_zero_elapsed_no_panic() {
        let metrics = Metrics {
            start_time: None,
            ..Default::default()
        };
        metrics.add_order_written();
        assert_eq!(metrics.orders_per_second(), 0.0);
    }

    #[tokio::test]
    async fn test_reporter_stops_on_shutdown() {
        let reporter = MetricsReporter::new(Metrics::new(), 60);
        let (tx, rx) = mpsc::channel(1);
        let handle = tokio::spawn(reporter.run(rx));
        tx.send(()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
