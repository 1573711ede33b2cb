//! Raw delimited tables backed by the `csv` crate.

use super::format::sniff_format;
use crate::error::{AlignError, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// A header row plus string records, with no interpretation of values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DelimitedTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl DelimitedTable {
    /// Number of data rows.
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    /// Number of header columns.
    pub fn n_columns(&self) -> usize {
        self.header.len()
    }
}

/// Open a table file for reading, decoding gzip when the name ends in `.gz`.
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn Read>> {
    let format = sniff_format(&path)?;
    let file = File::open(path.as_ref())?;
    if format.compressed {
        Ok(Box::new(GzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read a delimited table, choosing the delimiter from the file extension.
///
/// Short records are padded with empty strings so every row has as many
/// cells as the header; blank lines are skipped.
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<DelimitedTable> {
    let format = sniff_format(&path)?;
    let reader = open_reader(&path)?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter.as_byte())
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let header: Vec<String> = csv_reader.headers()?.iter().map(String::from).collect();
    if header.is_empty() {
        return Err(AlignError::EmptyData(format!(
            "{} has no header",
            path.as_ref().display()
        )));
    }

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        if record.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let mut row: Vec<String> = record.iter().map(String::from).collect();
        if row.len() < header.len() {
            row.resize(header.len(), String::new());
        }
        rows.push(row);
    }

    Ok(DelimitedTable { header, rows })
}

/// Write a comma separated table.
pub fn write_table<P: AsRef<Path>>(path: P, header: &[String], rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_read_tsv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.tsv");
        std::fs::write(&path, "id\ta\tb\nS1\t1\tx\n\nS2\t2\n").unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.header, vec!["id", "a", "b"]);
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.rows[1], vec!["S2", "2", ""]);
    }

    #[test]
    fn test_read_gzipped_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("table.csv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"id,group\nS1,case\nS2,control\n").unwrap();
        encoder.finish().unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.header, vec!["id", "group"]);
        assert_eq!(table.rows, vec![vec!["S1", "case"], vec!["S2", "control"]]);
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let header = vec!["id".to_string(), "note".to_string()];
        let rows = vec![vec!["S1".to_string(), "has, comma".to_string()]];
        write_table(&path, &header, &rows).unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.rows[0][1], "has, comma");
    }
}
