//! Delimited-text catalog source.

use crate::error::{ParseError, StartupError};
use crate::io::CatalogSource;
use crate::model::{CatalogEntry, Money};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Reads `part_number,unit_cost,unit_price` rows.
pub struct CsvCatalogSource<R: Read> {
    reader: csv::Reader<R>,
    path: PathBuf,
}

impl CsvCatalogSource<File> {
    /// Open a catalog file.
    pub fn open(path: &Path, has_headers: bool) -> Result<Self, StartupError> {
        let file = File::open(path).map_err(|source| StartupError::CatalogUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let mut source = Self::from_reader(file, has_headers);
        source.path = path.to_path_buf();
        Ok(source)
    }
}

impl<R: Read> CsvCatalogSource<R> {
    pub fn from_reader(reader: R, has_headers: bool) -> Self {
        let reader = csv::ReaderBuilder::new()
            .has_headers(has_headers)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        Self {
            reader,
            path: PathBuf::from("<reader>"),
        }
    }
}

impl<R: Read> CatalogSource for CsvCatalogSource<R> {
    fn load_all(&mut self) -> Result<Vec<Result<CatalogEntry, ParseError>>, StartupError> {
        let mut rows = Vec::new();

        for result in self.reader.records() {
            match result {
                Ok(record) => {
                    let line = record.position().map_or(0, |p| p.line());
                    rows.push(parse_entry(&record, line));
                }
                Err(e) if e.is_io_error() => {
                    let message = e.to_string();
                    return Err(StartupError::CatalogUnreadable {
                        path: self.path.clone(),
                        source: match e.into_kind() {
                            csv::ErrorKind::Io(io) => io,
                            _ => std::io::Error::other(message),
                        },
                    });
                }
                Err(e) => {
                    let line = e.position().map_or(0, |p| p.line());
                    rows.push(Err(ParseError::new(line, e.to_string())));
                }
            }
        }

        Ok(rows)
    }
}

fn parse_entry(record: &csv::StringRecord, line: u64) -> Result<CatalogEntry, ParseError> {
    if record.len() != 3 {
        return Err(ParseError::new(
            line,
            format!("expected 3 fields (part,cost,price), found {}", record.len()),
        ));
    }

    let part_number = record[0].to_string();
    if part_number.is_empty() {
        return Err(ParseError::new(line, "part number is empty"));
    }

    let unit_cost: Money = record[1]
        .parse()
        .map_err(|e| ParseError::new(line, format!("unit cost: {}", e)))?;
    let unit_price: Money = record[2]
        .parse()
        .map_err(|e| ParseError::new(line, format!("unit price: {}", e)))?;

    Ok(CatalogEntry {
        part_number,
        unit_cost,
        unit_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_all_rows() {
        let mut source = CsvCatalogSource::from_reader("P1,2.00,3.00\nP2,5.00,7.50\n".as_bytes(), false);
        let rows = source.load_all().unwrap();

        assert_eq!(rows.len(), 2);
        let p2 = rows[1].as_ref().unwrap();
        assert_eq!(p2.part_number, "P2");
        assert_eq!(p2.unit_cost, Money::from_cents(500));
        assert_eq!(p2.unit_price, Money::from_cents(750));
    }

    #[test]
    fn test_bad_rows_are_row_errors() {
        let mut source = CsvCatalogSource::from_reader("P1,abc,3.00\nP2,5.00\nP3,1,1\n".as_bytes(), false);
        let rows = source.load_all().unwrap();

        assert_eq!(rows.len(), 3);
        let first = rows[0].as_ref().unwrap_err();
        assert_eq!(first.line, 1);
        assert!(first.reason.contains("unit cost"));
        assert!(rows[1].is_err());
        assert!(rows[2].is_ok());
    }

    #[test]
    fn test_open_missing_catalog() {
        let err = CsvCatalogSource::open(Path::new("/nonexistent/catalog.txt"), false).err().unwrap();
        assert!(matches!(err, StartupError::CatalogUnreadable { .. }));
    }
}
