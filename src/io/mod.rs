//! Format-specific collaborators behind the pipeline's source and sink seams.
//!
//! The pipeline only sees the three traits below. The delimited-text readers
//! and the fixed-width report writer are one backing format; the in-memory
//! implementations back tests and embedding.

mod catalog_reader;
mod memory;
mod order_reader;
mod report_writer;

pub use catalog_reader::CsvCatalogSource;
pub use memory::{MemoryReportSink, VecCatalogSource, VecOrderSource};
pub use order_reader::CsvOrderSource;
pub use report_writer::{format_header, format_row, FixedWidthReport};

use crate::error::{ParseError, StartupError, WriteError};
use crate::model::{CatalogEntry, EnrichedOrder, OrderRecord};

/// Lazy, finite, non-restartable stream of orders in source order.
pub trait OrderSource: Send {
    /// Next order, a per-row parse failure, or `None` once exhausted.
    fn next_order(&mut self) -> Option<Result<OrderRecord, ParseError>>;
}

/// Reference data for the catalog.
pub trait CatalogSource {
    /// Read every row. The outer error means the source itself is unusable;
    /// inner errors are individual malformed rows.
    fn load_all(&mut self) -> Result<Vec<Result<CatalogEntry, ParseError>>, StartupError>;
}

/// Destination for enriched orders.
///
/// Implementations must serialize concurrent `append` calls so that each
/// record lands whole.
pub trait ReportSink: Send + Sync {
    fn append(&self, order: &EnrichedOrder) -> Result<(), WriteError>;

    /// Flush and release the sink. Later appends fail with [`WriteError::Closed`].
    fn close(&self) -> Result<(), WriteError>;
}
