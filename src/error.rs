//! Error taxonomy for the enrichment pipeline.
//!
//! Startup errors are fatal and abort before any stage runs. Parse, lookup and
//! write errors are per-record: the stage that detects them logs and counts
//! them, and sibling units keep going.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A row from an order or catalog source that could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {reason}")]
pub struct ParseError {
    /// 1-based line number in the source, 0 when unknown
    pub line: u64,
    pub reason: String,
}

impl ParseError {
    pub fn new(line: u64, reason: impl Into<String>) -> Self {
        Self {
            line,
            reason: reason.into(),
        }
    }
}

/// An order whose part number is absent from the catalog.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("part number '{part_number}' not in catalog (customer {customer_id})")]
pub struct LookupMiss {
    pub customer_id: i64,
    pub part_number: String,
}

/// Why an order could not be enriched. The order is dropped either way.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichError {
    #[error(transparent)]
    LookupMiss(#[from] LookupMiss),

    #[error("total for {quantity} x '{part_number}' overflows")]
    Overflow { part_number: String, quantity: u64 },
}

/// Failure to append a record to, or close, the report sink.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("report I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("report sink is already closed")]
    Closed,
}

/// Failures that prevent the pipeline from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("cannot read catalog {path}: {source}")]
    CatalogUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed catalog row: {0}")]
    CatalogRow(#[source] ParseError),

    #[error("cannot open orders {path}: {source}")]
    OrdersUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot create report {path}: {source}")]
    OutputUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level pipeline failure returned by the driver.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("startup failed: {0}")]
    Startup(#[from] StartupError),

    /// Strict parsing stopped extraction. Records sent before the bad row
    /// were still enriched and written.
    #[error("extraction aborted on malformed order row: {0}")]
    ExtractionAborted(#[source] ParseError),

    #[error("pipeline did not complete within {0:?}")]
    Timeout(Duration),

    #[error("{stage} stage failed: {reason}")]
    StageFailed { stage: &'static str, reason: String },

    #[error("closing report failed: {0}")]
    SinkClose(#[source] WriteError),
}

impl PipelineError {
    /// Wrap a task join failure (panic or cancellation) for a named stage.
    pub fn stage(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::StageFailed {
            stage,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new(7, "quantity 'x' is not an integer");
        assert_eq!(err.to_string(), "line 7: quantity 'x' is not an integer");
    }

    #[test]
    fn test_lookup_miss_display() {
        let err = LookupMiss {
            customer_id: 3,
            part_number: "P3".to_string(),
        };
        assert!(err.to_string().contains("'P3'"));
        assert!(err.to_string().contains("customer 3"));
    }

    #[test]
    fn test_startup_error_wraps_into_pipeline_error() {
        let startup = StartupError::CatalogRow(ParseError::new(1, "bad"));
        let err: PipelineError = startup.into();
        assert!(matches!(err, PipelineError::Startup(StartupError::CatalogRow(_))));
        assert!(err.to_string().starts_with("startup failed"));
    }
}
