//! Delimited-text order source.

use crate::error::{ParseError, StartupError};
use crate::io::OrderSource;
use crate::model::OrderRecord;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Reads `customer,part_number,quantity` rows one at a time.
///
/// The underlying reader is held for the lifetime of the source and released
/// when it is dropped.
pub struct CsvOrderSource<R: Read> {
    reader: csv::Reader<R>,
    record: csv::StringRecord,
    exhausted: bool,
}

impl CsvOrderSource<File> {
    /// Open an order file.
    pub fn open(path: &Path, has_headers: bool) -> Result<Self, StartupError> {
        let file = File::open(path).map_err(|source| StartupError::OrdersUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(file, has_headers))
    }
}

impl<R: Read> CsvOrderSource<R> {
    pub fn from_reader(reader: R, has_headers: bool) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        Self {
            reader,
            record: csv::StringRecord::new(),
            exhausted: false,
        }
    }
}

impl<R: Read + Send> OrderSource for CsvOrderSource<R> {
    fn next_order(&mut self) -> Option<Result<OrderRecord, ParseError>> {
        if self.exhausted {
            return None;
        }

        match self.reader.read_record(&mut self.record) {
            Ok(true) => {
                let line = self.record.position().map_or(0, |p| p.line());
                Some(parse_order(&self.record, line))
            }
            Ok(false) => {
                self.exhausted = true;
                None
            }
            Err(e) => {
                let line = e.position().map_or(0, |p| p.line());
                // I/O failures leave the reader in an unknown state; stop there
                if !matches!(e.kind(), csv::ErrorKind::Utf8 { .. }) {
                    self.exhausted = true;
                }
                Some(Err(ParseError::new(line, e.to_string())))
            }
        }
    }
}

fn parse_order(record: &csv::StringRecord, line: u64) -> Result<OrderRecord, ParseError> {
    if record.len() != 3 {
        return Err(ParseError::new(
            line,
            format!("expected 3 fields (customer,part,quantity), found {}", record.len()),
        ));
    }

    let customer_id = record[0]
        .parse::<i64>()
        .map_err(|_| ParseError::new(line, format!("customer '{}' is not an integer", &record[0])))?;

    let part_number = record[1].to_string();
    if part_number.is_empty() {
        return Err(ParseError::new(line, "part number is empty"));
    }

    let quantity = record[2]
        .parse::<u64>()
        .map_err(|_| ParseError::new(line, format!("quantity '{}' is not a non-negative integer", &record[2])))?;

    Ok(OrderRecord {
        customer_id,
        part_number,
        quantity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(input: &str, has_headers: bool) -> Vec<Result<OrderRecord, ParseError>> {
        let mut source = CsvOrderSource::from_reader(input.as_bytes(), has_headers);
        std::iter::from_fn(|| source.next_order()).collect()
    }

    #[test]
    fn test_reads_orders_in_source_order() {
        let rows = drain("1,P1,10\n2,P2,4\n3, P3 ,1\n", false);
        let orders: Vec<_> = rows.into_iter().map(Result::unwrap).collect();

        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].customer_id, 1);
        assert_eq!(orders[0].part_number, "P1");
        assert_eq!(orders[0].quantity, 10);
        assert_eq!(orders[1].part_number, "P2");
        assert_eq!(orders[2].part_number, "P3");
    }

    #[test]
    fn test_skips_header_row() {
        let rows = drain("customer,part,qty\n7,A,1\n", true);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].as_ref().unwrap().customer_id, 7);
    }

    #[test]
    fn test_malformed_rows_are_reported_with_line() {
        let rows = drain("1,P1,10\nx,P1,1\n2,P2,-4\n3,P3\n4,,1\n5,P5,2\n", false);

        assert_eq!(rows.len(), 6);
        assert!(rows[0].is_ok());
        assert_eq!(rows[1].as_ref().unwrap_err().line, 2);
        assert!(rows[2].as_ref().unwrap_err().reason.contains("quantity"));
        assert!(rows[3].as_ref().unwrap_err().reason.contains("expected 3 fields"));
        assert!(rows[4].as_ref().unwrap_err().reason.contains("part number"));
        assert_eq!(rows[5].as_ref().unwrap().customer_id, 5);
    }

    #[test]
    fn test_exhausted_source_stays_exhausted() {
        let mut source = CsvOrderSource::from_reader("1,P1,1\n".as_bytes(), false);
        assert!(source.next_order().is_some());
        assert!(source.next_order().is_none());
        assert!(source.next_order().is_none());
    }

    #[test]
    fn test_open_missing_file() {
        let err = CsvOrderSource::open(Path::new("/nonexistent/orders.txt"), false).err().unwrap();
        assert!(matches!(err, StartupError::OrdersUnreadable { .. }));
    }
}
