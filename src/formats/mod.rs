//! Source formats: suffix dispatch, the row model, and the batch sources.

pub mod delimited;
pub mod parquet;

use std::fmt;
use std::path::Path;

use crate::db::TableSchema;
use crate::error::LoadError;

pub use delimited::CsvBatchSource;
pub use parquet::ParquetBatchSource;

/// A single row. Values travel as strings; the empty string marks SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub fields: Vec<String>,
}

/// What a source knows about its input up front. A streaming source knows
/// neither count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceMetadata {
    pub total_rows: Option<u64>,
    pub batch_count: Option<usize>,
}

/// One capability, two implementations: produce an ordered sequence of row
/// batches sharing a stable schema. The caller drives the loop; reading the
/// next batch and writing the previous one never overlap.
pub trait BatchSource {
    /// Column schema shared by every batch.
    fn schema(&self) -> &TableSchema;

    /// Row and batch counts when the source knows them up front.
    fn metadata(&self) -> SourceMetadata;

    /// Next batch in order, `None` once the source is exhausted. A returned
    /// batch may be empty; the caller treats that as a no-op.
    fn next_batch(&mut self) -> Result<Option<Vec<Record>>, LoadError>;
}

/// Supported source formats, decided by path suffix alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Parquet,
    Csv { gzipped: bool },
}

impl SourceFormat {
    /// Suffix dispatch. The match is exact and case-sensitive, checked in
    /// this order: `.parquet`, `.csv.gz`, `.csv`.
    pub fn detect(path: &Path) -> Option<SourceFormat> {
        let name = path.to_string_lossy();
        if name.ends_with(".parquet") {
            Some(SourceFormat::Parquet)
        } else if name.ends_with(".csv.gz") {
            Some(SourceFormat::Csv { gzipped: true })
        } else if name.ends_with(".csv") {
            Some(SourceFormat::Csv { gzipped: false })
        } else {
            None
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Parquet => write!(f, "parquet"),
            SourceFormat::Csv { .. } => write!(f, "CSV"),
        }
    }
}
