//! Error taxonomy for a load run.
//!
//! Every variant is fatal: the loader never retries, and durability is per
//! completed batch only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    /// The file path's suffix is not `.parquet`, `.csv`, or `.csv.gz`.
    ///
    /// Reported before any database contact; the process still exits cleanly.
    #[error("unsupported file format: '{path}' (expected .parquet, .csv, or .csv.gz)")]
    UnsupportedFormat { path: String },

    /// The database could not be reached or refused authentication.
    #[error("failed to connect to database at {endpoint}")]
    Connection {
        endpoint: String,
        #[source]
        source: sqlx::Error,
    },

    /// The input file is malformed, truncated, or holds a value the loader
    /// cannot represent: bad CSV/Parquet structure, a row whose arity
    /// disagrees with the header, an unparseable datetime value, or an
    /// unsupported Parquet column type.
    #[error("failed to read source data: {0}")]
    SourceRead(String),

    /// The database rejected a statement against the destination table.
    ///
    /// Schema disagreements (the table changed externally mid-run) surface
    /// here through the driver error; the loader performs no remediation.
    #[error("database rejected write to table \"{table}\"")]
    Write {
        table: String,
        #[source]
        source: sqlx::Error,
    },
}

impl From<csv::Error> for LoadError {
    fn from(err: csv::Error) -> Self {
        LoadError::SourceRead(err.to_string())
    }
}

impl From<std::io::Error> for LoadError {
    fn from(err: std::io::Error) -> Self {
        LoadError::SourceRead(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for LoadError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        LoadError::SourceRead(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for LoadError {
    fn from(err: arrow::error::ArrowError) -> Self {
        LoadError::SourceRead(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_names_the_path() {
        let err = LoadError::UnsupportedFormat {
            path: "data.json".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("data.json"));
        assert!(text.contains(".parquet"));
    }

    #[test]
    fn io_errors_map_to_source_read() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        assert!(matches!(LoadError::from(io), LoadError::SourceRead(_)));
    }
}
