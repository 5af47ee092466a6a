//! Streaming CSV source: peek the header, flag datetime candidates by name,
//! then stream fixed-size row chunks with per-chunk datetime coercion.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::config::{CHUNK_ROWS, SCHEMA_PEEK_ROWS};
use crate::db::schema::{format_datetime, parse_datetime};
use crate::db::{Column, SqlType, TableSchema};
use crate::error::LoadError;
use crate::formats::{BatchSource, Record, SourceMetadata};

/// Name-based datetime detection, used by the CSV path only: a column is a
/// candidate when its name contains `date` or `time`, case-insensitive.
/// Values are never inspected, so this can flag columns the Parquet path's
/// type-based detection would not, and miss ones it would.
pub(crate) fn is_datetime_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("date") || lower.contains("time")
}

/// CSV batch source. Holds at most one chunk of rows in memory.
pub struct CsvBatchSource {
    reader: csv::Reader<Box<dyn Read>>,
    schema: TableSchema,
    datetime_columns: Vec<usize>,
    chunk_rows: usize,
    exhausted: bool,
}

// Manual impl: the boxed reader has no Debug.
impl fmt::Debug for CsvBatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsvBatchSource")
            .field("schema", &self.schema)
            .field("datetime_columns", &self.datetime_columns)
            .field("chunk_rows", &self.chunk_rows)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}

impl CsvBatchSource {
    /// Open a CSV file with the standard chunk size. `gzipped` comes from
    /// the suffix dispatch and selects transparent decompression.
    pub fn open(path: &Path, gzipped: bool) -> Result<Self, LoadError> {
        Self::with_chunk_rows(path, gzipped, CHUNK_ROWS)
    }

    pub(crate) fn with_chunk_rows(
        path: &Path,
        gzipped: bool,
        chunk_rows: usize,
    ) -> Result<Self, LoadError> {
        let columns = peek_columns(path, gzipped)?;
        let datetime_columns: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, name)| is_datetime_name(name))
            .map(|(idx, _)| idx)
            .collect();

        let schema = TableSchema {
            columns: columns
                .into_iter()
                .enumerate()
                .map(|(idx, name)| Column {
                    sql_type: if datetime_columns.contains(&idx) {
                        SqlType::Timestamp
                    } else {
                        SqlType::Text
                    },
                    name,
                })
                .collect(),
        };

        // Second open: the streaming cursor the chunks are read from.
        let reader = csv_reader(path, gzipped)?;

        Ok(Self {
            reader,
            schema,
            datetime_columns,
            chunk_rows,
            exhausted: false,
        })
    }
}

impl BatchSource for CsvBatchSource {
    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn metadata(&self) -> SourceMetadata {
        // Streaming: neither the row count nor the batch count is known.
        SourceMetadata {
            total_rows: None,
            batch_count: None,
        }
    }

    fn next_batch(&mut self) -> Result<Option<Vec<Record>>, LoadError> {
        if self.exhausted {
            return Ok(None);
        }

        let mut rows = Vec::new();
        let mut record = csv::StringRecord::new();

        while rows.len() < self.chunk_rows {
            if !self.reader.read_record(&mut record)? {
                self.exhausted = true;
                break;
            }

            let mut fields: Vec<String> = record.iter().map(|f| f.to_string()).collect();
            for &idx in &self.datetime_columns {
                if let Some(field) = fields.get_mut(idx) {
                    *field = coerce_datetime(&self.schema.columns[idx].name, field)?;
                }
            }
            rows.push(Record { fields });
        }

        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }
}

/// Rewrite a datetime-candidate value into the canonical representation.
/// Empty values pass through (NULL); anything unparseable is fatal.
fn coerce_datetime(column_name: &str, value: &str) -> Result<String, LoadError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }

    match parse_datetime(trimmed) {
        Some(dt) => Ok(format_datetime(dt)),
        None => Err(LoadError::SourceRead(format!(
            "column '{}': cannot parse '{}' as a date-time value",
            column_name, trimmed
        ))),
    }
}

/// First open: read the header and up to the peek limit of rows, so the
/// column list is known and structural errors near the top of the file
/// surface before any database work.
fn peek_columns(path: &Path, gzipped: bool) -> Result<Vec<String>, LoadError> {
    let mut reader = csv_reader(path, gzipped)?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    if headers.is_empty() {
        return Err(LoadError::SourceRead(format!(
            "no columns found in '{}'",
            path.display()
        )));
    }

    let mut record = csv::StringRecord::new();
    for _ in 0..SCHEMA_PEEK_ROWS {
        if !reader.read_record(&mut record)? {
            break;
        }
    }

    Ok(headers)
}

fn csv_reader(path: &Path, gzipped: bool) -> Result<csv::Reader<Box<dyn Read>>, LoadError> {
    let file = File::open(path)?;
    let raw: Box<dyn Read> = if gzipped {
        // A gzip file may be a sequence of members; decode them all.
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(csv::ReaderBuilder::new().has_headers(true).from_reader(raw))
}
