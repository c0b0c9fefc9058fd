//! Pipeline orchestration: stages, lifecycle state and metrics.

mod metrics;
mod sequential;
mod stages;
mod state;


pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use stages::{enrich, Pipeline, PipelineConfig, PipelineReport};
pub use state::{PipelineState, StateTracker};
