// src/decode/mod.rs
//! Header-keyed CSV decoding of export bodies.
//!
//! Decoding never fails. Blank lines are skipped; a data row shorter than the
//! header yields a record without the trailing fields, a longer one has its
//! surplus cells dropped.

pub mod record;
pub mod tokenize;

pub use record::Record;
pub use tokenize::{split_row, RowSplitter};

use tracing::{debug, warn};

pub const DELIMITER: u8 = b',';

/// Header row plus data rows, all cells already cleaned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CsvTable {
    /// First non-blank row is the header.
    pub fn parse(text: &str) -> Self {
        let mut rows = parse_rows(text).into_iter();
        let header = rows.next().unwrap_or_default();
        Self {
            header,
            rows: rows.collect(),
        }
    }

    /// Zip every data row against the header by position.
    pub fn into_records(self) -> Vec<Record> {
        let width = self.header.len();
        let mut ragged = 0usize;
        let records: Vec<Record> = self
            .rows
            .into_iter()
            .map(|row| {
                if row.len() != width {
                    ragged += 1;
                }
                let mut rec = Record::with_capacity(width);
                for (name, value) in self.header.iter().zip(row) {
                    rec.insert(name.as_str(), value);
                }
                rec
            })
            .collect();
        if ragged > 0 {
            warn!(
                ragged,
                header_width = width,
                "rows with a cell count different from the header"
            );
        }
        records
    }
}

/// Split `text` into rows of cells on `\n`, skipping blank lines.
pub fn parse_rows(text: &str) -> Vec<Vec<String>> {
    let splitter = RowSplitter::new(DELIMITER);
    text.split('\n')
        .filter(|line| !line.trim().is_empty())
        .map(|line| splitter.split(line))
        .collect()
}

/// Decode a CSV body into header-keyed records.
pub fn decode_records(text: &str) -> Vec<Record> {
    let table = CsvTable::parse(text);
    debug!(
        columns = table.header.len(),
        rows = table.rows.len(),
        "decoded csv"
    );
    table.into_records()
}
