//! Configuration for the order enrichment pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Input configuration
    #[serde(default)]
    pub input: InputConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,
}

/// Input data configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Delimited order file: customer,part_number,quantity
    #[serde(default = "default_orders_path")]
    pub orders_path: PathBuf,

    /// Delimited catalog file: part_number,unit_cost,unit_price
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Skip the first row of both input files
    #[serde(default)]
    pub has_headers: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            orders_path: default_orders_path(),
            catalog_path: default_catalog_path(),
            has_headers: false,
        }
    }
}

/// Report output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Fixed-width report file, created or truncated at startup
    #[serde(default = "default_output_path")]
    pub path: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
        }
    }
}

/// What to do with a row that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsePolicy {
    /// Log the row, count it, and continue with the next one
    #[default]
    Skip,
    /// Stop at the first malformed row
    Strict,
}

/// How the three stages are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Three concurrent stages joined by handoff channels
    #[default]
    Concurrent,
    /// Extract everything, then transform everything, then load everything
    Sequential,
}

/// Processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Malformed row handling for orders and catalog
    #[serde(default)]
    pub parse_policy: ParsePolicy,

    /// Concurrent or sequential execution
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Number of enrichment workers pulling from the order channel
    #[serde(default = "default_transform_workers")]
    pub transform_workers: usize,

    /// Maximum in-flight write units in the load stage
    #[serde(default = "default_load_concurrency")]
    pub load_concurrency: usize,

    /// Capacity of each handoff channel
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer: usize,

    /// Number of Tokio worker threads (None = num CPUs)
    #[serde(default)]
    pub worker_threads: Option<usize>,

    /// Abort the run if the completion signal has not fired by then
    #[serde(default)]
    pub completion_timeout_secs: Option<u64>,

    /// Artificial per-record delay in the transform stage
    #[serde(default)]
    pub simulated_transform_latency_ms: u64,

    /// Artificial per-record delay in the load stage
    #[serde(default)]
    pub simulated_load_latency_ms: u64,

    /// Enable periodic progress reporting
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Metrics reporting interval in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,

    /// Optional path to save metrics JSON after run completes
    #[serde(default)]
    pub metrics_output_path: Option<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parse_policy: ParsePolicy::Skip,
            mode: ExecutionMode::Concurrent,
            transform_workers: default_transform_workers(),
            load_concurrency: default_load_concurrency(),
            channel_buffer: default_channel_buffer(),
            worker_threads: None,
            completion_timeout_secs: None,
            simulated_transform_latency_ms: 0,
            simulated_load_latency_ms: 0,
            enable_metrics: true,
            metrics_interval_secs: default_metrics_interval(),
            metrics_output_path: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json);
    /// any other extension is an error.
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)?,
            _ => anyhow::bail!(
                "Unsupported config format for {} (expected .yaml, .yml or .json)",
                path.display()
            ),
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input.orders_path.as_os_str().is_empty() {
            anyhow::bail!("input.orders_path must not be empty");
        }
        if self.input.catalog_path.as_os_str().is_empty() {
            anyhow::bail!("input.catalog_path must not be empty");
        }
        if self.output.path.as_os_str().is_empty() {
            anyhow::bail!("output.path must not be empty");
        }
        if self.output.path == self.input.orders_path || self.output.path == self.input.catalog_path {
            anyhow::bail!("output.path must differ from the input paths");
        }
        if self.processing.transform_workers == 0 {
            anyhow::bail!("transform_workers must be > 0");
        }
        if self.processing.load_concurrency == 0 {
            anyhow::bail!("load_concurrency must be > 0");
        }
        if self.processing.channel_buffer == 0 {
            anyhow::bail!("channel_buffer must be > 0");
        }
        if self.processing.completion_timeout_secs == Some(0) {
            anyhow::bail!("completion_timeout_secs must be > 0 when set");
        }
        if self.processing.enable_metrics && self.processing.metrics_interval_secs == 0 {
            anyhow::bail!("metrics_interval_secs must be > 0");
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_orders_path() -> PathBuf { PathBuf::from("orders.txt") }
fn default_catalog_path() -> PathBuf { PathBuf::from("productList.txt") }
fn default_output_path() -> PathBuf { PathBuf::from("dest.txt") }
fn default_transform_workers() -> usize { 16 }
fn default_load_concurrency() -> usize { 16 }
fn default_channel_buffer() -> usize { 1 }
fn default_true() -> bool { true }
fn default_metrics_interval() -> u64 { 10 }
