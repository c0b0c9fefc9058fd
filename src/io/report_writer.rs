//! Fixed-width text report sink.
//!
//! Rows are formatted by the calling write unit, outside any lock. Only the
//! append of the finished line happens inside the mutex, so each row lands
//! whole even with many concurrent writers.

use crate::error::{StartupError, WriteError};
use crate::io::ReportSink;
use crate::model::EnrichedOrder;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// Column header line, newline-terminated.
pub fn format_header() -> String {
    format!(
        "{:>20} {:>15} {:>12} {:>12} {:>15} {:>15}\n",
        "Part Number", "Quantity", "Unit Cost", "Unit Price", "Total Cost", "Total Price"
    )
}

/// One report row, newline-terminated.
pub fn format_row(order: &EnrichedOrder) -> String {
    format!(
        "{:>20} {:>15} {:>12} {:>12} {:>15} {:>15}\n",
        order.part_number(),
        order.quantity(),
        order.unit_cost,
        order.unit_price,
        order.total_cost,
        order.total_price,
    )
}

/// Report writer over any `Write`, normally a file.
pub struct FixedWidthReport<W: Write + Send> {
    /// `None` once closed
    writer: Mutex<Option<BufWriter<W>>>,
}

impl FixedWidthReport<File> {
    /// Create or truncate the report file and write the header.
    pub fn create(path: &Path) -> Result<Self, StartupError> {
        let unavailable = |source| StartupError::OutputUnavailable {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(unavailable)?;
        Self::from_writer(file).map_err(|e| match e {
            WriteError::Io(source) => unavailable(source),
            WriteError::Closed => unavailable(std::io::Error::other("closed")),
        })
    }
}

impl<W: Write + Send> FixedWidthReport<W> {
    /// Wrap a writer and emit the header.
    pub fn from_writer(writer: W) -> Result<Self, WriteError> {
        let mut writer = BufWriter::new(writer);
        writer.write_all(format_header().as_bytes())?;
        Ok(Self {
            writer: Mutex::new(Some(writer)),
        })
    }

    /// Consume the sink and return the underlying writer, flushing first.
    pub fn into_inner(self) -> Result<Option<W>, WriteError> {
        let writer = self
            .writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match writer {
            Some(w) => Ok(Some(w.into_inner().map_err(|e| e.into_error())?)),
            None => Ok(None),
        }
    }

    fn append_line(&self, line: &str) -> Result<(), WriteError> {
        let mut guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let writer = guard.as_mut().ok_or(WriteError::Closed)?;
        writer.write_all(line.as_bytes())?;
        Ok(())
    }
}

impl<W: Write + Send> ReportSink for FixedWidthReport<W> {
    fn append(&self, order: &EnrichedOrder) -> Result<(), WriteError> {
        let line = format_row(order);
        self.append_line(&line)
    }

    fn close(&self) -> Result<(), WriteError> {
        let mut guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut writer = guard.take().ok_or(WriteError::Closed)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CatalogEntry, Money, OrderRecord};
    use std::sync::Arc;

    fn enriched(part: &str, qty: u64, cost_cents: i64, price_cents: i64) -> EnrichedOrder {
        let entry = CatalogEntry {
            part_number: part.to_string(),
            unit_cost: Money::from_cents(cost_cents),
            unit_price: Money::from_cents(price_cents),
        };
        let order = OrderRecord {
            customer_id: 1,
            part_number: part.to_string(),
            quantity: qty,
        };
        EnrichedOrder::from_lookup(order, &entry).unwrap()
    }

    #[test]
    fn test_row_layout() {
        let row = format_row(&enriched("P1", 10, 200, 300));
        let expected = format!(
            "{:>20} {:>15} {:>12} {:>12} {:>15} {:>15}\n",
            "P1", 10, "2.00", "3.00", "20.00", "30.00"
        );
        assert_eq!(row, expected);
        assert_eq!(row.len(), format_header().len());
    }

    #[test]
    fn test_header_then_rows_then_close() {
        let report = FixedWidthReport::from_writer(Vec::new()).unwrap();
        report.append(&enriched("P1", 10, 200, 300)).unwrap();
        report.append(&enriched("P2", 4, 500, 750)).unwrap();
        report.close().unwrap();

        assert!(matches!(report.append(&enriched("P1", 1, 1, 1)), Err(WriteError::Closed)));
        assert!(matches!(report.close(), Err(WriteError::Closed)));

        // Closing took the writer; nothing is left to hand back
        assert!(report.into_inner().unwrap().is_none());
    }

    #[test]
    fn test_into_inner_returns_written_bytes() {
        let report = FixedWidthReport::from_writer(Vec::new()).unwrap();
        report.append(&enriched("P2", 4, 500, 750)).unwrap();

        let bytes = report.into_inner().unwrap().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Part Number"));
        assert!(lines[1].trim_start().starts_with("P2"));
        assert!(lines[1].ends_with("30.00"));
    }

    #[test]
    fn test_concurrent_appends_do_not_interleave() {
        let report = Arc::new(FixedWidthReport::from_writer(Vec::new()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let report = report.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        report.append(&enriched(&format!("T{}-{}", t, i), i, 125, 250)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let report = Arc::try_unwrap(report).ok().unwrap();
        let text = String::from_utf8(report.into_inner().unwrap().unwrap()).unwrap();
        let rows: Vec<_> = text.lines().skip(1).collect();

        assert_eq!(rows.len(), 8 * 200);
        let width = format_header().len() - 1;
        assert!(rows.iter().all(|r| r.len() == width));
    }
}
