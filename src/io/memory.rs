//! In-memory sources and sink.

use crate::error::{ParseError, StartupError, WriteError};
use crate::io::{CatalogSource, OrderSource, ReportSink};
use crate::model::{CatalogEntry, EnrichedOrder, OrderRecord};
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Order source over a prepared list of rows.
#[derive(Debug, Default)]
pub struct VecOrderSource {
    rows: VecDeque<Result<OrderRecord, ParseError>>,
}

impl VecOrderSource {
    pub fn new(orders: Vec<OrderRecord>) -> Self {
        Self {
            rows: orders.into_iter().map(Ok).collect(),
        }
    }

    /// Rows including parse failures, yielded in order.
    pub fn from_rows(rows: Vec<Result<OrderRecord, ParseError>>) -> Self {
        Self { rows: rows.into() }
    }
}

impl OrderSource for VecOrderSource {
    fn next_order(&mut self) -> Option<Result<OrderRecord, ParseError>> {
        self.rows.pop_front()
    }
}

/// Catalog source over a prepared list of rows.
#[derive(Debug, Default)]
pub struct VecCatalogSource {
    rows: Vec<Result<CatalogEntry, ParseError>>,
}

impl VecCatalogSource {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self {
            rows: entries.into_iter().map(Ok).collect(),
        }
    }

    pub fn from_rows(rows: Vec<Result<CatalogEntry, ParseError>>) -> Self {
        Self { rows }
    }
}

impl CatalogSource for VecCatalogSource {
    fn load_all(&mut self) -> Result<Vec<Result<CatalogEntry, ParseError>>, StartupError> {
        Ok(std::mem::take(&mut self.rows))
    }
}

/// Sink collecting enriched orders in arrival order.
#[derive(Debug, Default)]
pub struct MemoryReportSink {
    records: Mutex<Vec<EnrichedOrder>>,
    closed: AtomicBool,
    /// Appends for these part numbers fail with an I/O error
    failing_parts: HashSet<String>,
    /// Delay applied to every append, inside the critical section
    append_delay: Option<Duration>,
}

impl MemoryReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make appends for the given part numbers fail.
    pub fn failing_for<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing_parts = parts.into_iter().map(Into::into).collect();
        self
    }

    /// Hold the lock for `delay` on every append.
    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    pub fn records(&self) -> Vec<EnrichedOrder> {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl ReportSink for MemoryReportSink {
    fn append(&self, order: &EnrichedOrder) -> Result<(), WriteError> {
        if self.failing_parts.contains(order.part_number()) {
            return Err(WriteError::Io(std::io::Error::other(format!(
                "injected failure for {}",
                order.part_number()
            ))));
        }

        let mut records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        if self.is_closed() {
            return Err(WriteError::Closed);
        }
        if let Some(delay) = self.append_delay {
            std::thread::sleep(delay);
        }
        records.push(order.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), WriteError> {
        let _records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(WriteError::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Money;

    fn order(part: &str) -> OrderRecord {
        OrderRecord {
            customer_id: 1,
            part_number: part.to_string(),
            quantity: 1,
        }
    }

    fn enriched(part: &str) -> EnrichedOrder {
        let entry = CatalogEntry {
            part_number: part.to_string(),
            unit_cost: Money::from_cents(100),
            unit_price: Money::from_cents(200),
        };
        EnrichedOrder::from_lookup(order(part), &entry).unwrap()
    }

    #[test]
    fn test_vec_order_source_preserves_order() {
        let mut source = VecOrderSource::new(vec![order("A"), order("B")]);
        assert_eq!(source.next_order().unwrap().unwrap().part_number, "A");
        assert_eq!(source.next_order().unwrap().unwrap().part_number, "B");
        assert!(source.next_order().is_none());
    }

    #[test]
    fn test_memory_sink_rejects_after_close() {
        let sink = MemoryReportSink::new();
        sink.append(&enriched("A")).unwrap();
        sink.close().unwrap();

        assert!(sink.is_closed());
        assert!(matches!(sink.append(&enriched("B")), Err(WriteError::Closed)));
        assert!(matches!(sink.close(), Err(WriteError::Closed)));
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_memory_sink_injected_failure() {
        let sink = MemoryReportSink::new().failing_for(["BAD"]);
        assert!(matches!(sink.append(&enriched("BAD")), Err(WriteError::Io(_))));
        assert!(sink.append(&enriched("OK")).is_ok());
        assert_eq!(sink.records().len(), 1);
    }
}
