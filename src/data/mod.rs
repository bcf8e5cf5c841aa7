//! Tabular dataset reader.
//!
//! The datasets are small delimited files: first line is the column
//! headers, every other line one record, UTF-8, values are plain text.
//! Column names are case-sensitive and may carry accents (`endereço`,
//! `APRESENTAÇÃO`), so lookups use the exact header string.
//!
//! Rows are yielded lazily; each call to [`read_rows`] re-opens the file so
//! every query sees the source fresh (no caching). A record whose field
//! count differs from the header aborts the read with
//! [`BotError::Format`] - the datasets are hand-maintained and silently
//! padding a short line would mis-render replies.

pub mod query;

use crate::error::{BotError, Result};
use csv::{Reader, ReaderBuilder, StringRecord};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One record of a dataset: column-name to value, in header order.
#[derive(Debug, Clone)]
pub struct Row {
    headers: Arc<StringRecord>,
    values: StringRecord,
}

impl Row {
    /// Look up a value by exact column name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.headers
            .iter()
            .position(|h| h == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Value by column name, falling back to the standard placeholder when
    /// the column is missing or empty.
    pub fn get_or_unspecified(&self, column: &str) -> &str {
        match self.get(column) {
            Some(v) if !v.is_empty() => v,
            _ => "Não especificado",
        }
    }
}

/// Lazy iterator over the rows of one dataset file.
pub struct RowIter {
    path: PathBuf,
    headers: Arc<StringRecord>,
    records: csv::StringRecordsIntoIter<File>,
}

impl std::fmt::Debug for RowIter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowIter")
            .field("path", &self.path)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl Iterator for RowIter {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e.into())),
        };

        if record.len() != self.headers.len() {
            let line = record.position().map_or(0, |p| p.line());
            return Some(Err(BotError::Format {
                path: self.path.display().to_string(),
                line,
                expected: self.headers.len(),
                got: record.len(),
            }));
        }

        Some(Ok(Row {
            headers: Arc::clone(&self.headers),
            values: record,
        }))
    }
}

/// Open a dataset and stream its rows.
///
/// Fails with [`BotError::Io`] when the path does not exist or cannot be
/// opened. Parse failures surface per row through the iterator.
pub fn read_rows(path: &Path) -> Result<RowIter> {
    let file = File::open(path)?;
    let mut reader: Reader<File> = ReaderBuilder::new()
        .flexible(true) // field-count mismatches are reported by us, with the line number
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = Arc::new(reader.headers()?.clone());

    Ok(RowIter {
        path: path.to_path_buf(),
        headers,
        records: reader.into_records(),
    })
}
