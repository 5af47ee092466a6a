//! High-level runner API for the ingestion tool.
//!
//! This is the primary entry point for the CLI and for embedding: dispatch on
//! the file suffix, open the source, connect, then drive batches through the
//! table sink while reporting per-batch timing on standard output.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::db::{DbClient, TableSink};
use crate::error::LoadError;
use crate::formats::{BatchSource, CsvBatchSource, ParquetBatchSource, SourceFormat};

/// Arguments for running a load operation.
pub struct LoadArgs {
    pub connection: ConnectionConfig,
    pub table_name: String,
    pub file_path: PathBuf,

    // Test-only: inject a pre-connected database handle (for SQLite testing)
    #[cfg(test)]
    pub test_db: Option<DbClient>,
}

/// Result of a completed load operation.
#[derive(Debug)]
pub struct LoadSummary {
    /// Rows written across all batches.
    pub rows_loaded: u64,
    /// Batches that performed a database write. The trailing empty batch of
    /// an exact-multiple source is iterated but never written, so it is not
    /// counted here.
    pub batches_written: usize,
    /// Row count of each written batch, in order.
    pub batch_rows: Vec<u64>,
    pub duration: Duration,
}

/// Run a load operation with the specified arguments.
///
/// The source file is opened before the database is contacted, so an
/// unsupported suffix or an unreadable file never results in a connection
/// attempt.
///
/// # Example
///
/// ```no_run
/// use pg_ingest::config::ConnectionConfig;
/// use pg_ingest::runner::{run_load, LoadArgs};
///
/// # async fn example() -> Result<(), pg_ingest::error::LoadError> {
/// let args = LoadArgs {
///     connection: ConnectionConfig::default(),
///     table_name: "yellow_tripdata".to_string(),
///     file_path: "yellow_tripdata_2021-01.csv.gz".into(),
/// };
///
/// let summary = run_load(args).await?;
/// println!("Loaded {} rows in {:?}", summary.rows_loaded, summary.duration);
/// # Ok(())
/// # }
/// ```
pub async fn run_load(args: LoadArgs) -> Result<LoadSummary, LoadError> {
    let started = Instant::now();

    let format =
        SourceFormat::detect(&args.file_path).ok_or_else(|| LoadError::UnsupportedFormat {
            path: args.file_path.display().to_string(),
        })?;
    println!("Detected {} file", format);

    let mut source: Box<dyn BatchSource> = match format {
        SourceFormat::Parquet => {
            println!("Reading parquet file: {}", args.file_path.display());
            let source = ParquetBatchSource::load(&args.file_path)?;
            println!("Loaded {} rows", source.metadata().total_rows.unwrap_or(0));
            println!("Columns: {:?}", source.schema().column_names());
            Box::new(source)
        }
        SourceFormat::Csv { gzipped } => {
            println!("Reading CSV file: {}", args.file_path.display());
            let source = CsvBatchSource::open(&args.file_path, gzipped)?;
            println!("Columns: {:?}", source.schema().column_names());
            println!(
                "Detected datetime columns: {:?}",
                source.schema().datetime_column_names()
            );
            Box::new(source)
        }
    };

    // The source is open and well-formed; only now touch the database.
    #[cfg(test)]
    let mut db = match args.test_db {
        Some(db) => db,
        None => DbClient::connect(&args.connection).await?,
    };

    #[cfg(not(test))]
    let mut db = DbClient::connect(&args.connection).await?;

    info!(
        table = %args.table_name,
        file = %args.file_path.display(),
        %format,
        "starting load"
    );
    println!("Inserting data into table '{}'...", args.table_name);

    let metadata = source.metadata();
    let mut sink = TableSink::new(args.table_name.clone(), source.schema().clone());
    let mut summary = LoadSummary {
        rows_loaded: 0,
        batches_written: 0,
        batch_rows: Vec::new(),
        duration: Duration::ZERO,
    };

    let mut batch_index = 0usize;
    while let Some(batch) = source.next_batch()? {
        let batch_started = Instant::now();

        if batch.is_empty() {
            // Exact-multiple boundary: the trailing range holds no rows.
            debug!(batch = batch_index + 1, "empty batch, nothing to write");
        } else {
            let appended = sink.write_batch(&mut db, &batch).await?;
            summary.rows_loaded += appended;
            summary.batch_rows.push(appended);
            summary.batches_written += 1;
        }

        let batch_elapsed = batch_started.elapsed().as_secs_f64();
        match (metadata.batch_count, metadata.total_rows) {
            (Some(batch_count), Some(total_rows)) => println!(
                "Inserted chunk {}/{} ({}/{} rows), took {:.3} seconds",
                batch_index + 1,
                batch_count,
                summary.rows_loaded,
                total_rows,
                batch_elapsed
            ),
            _ => println!(
                "Inserted chunk {} ({} rows), took {:.3} seconds",
                batch_index + 1,
                batch.len(),
                batch_elapsed
            ),
        }
        batch_index += 1;
    }

    println!("Data ingestion completed successfully!");
    summary.duration = started.elapsed();

    info!(
        rows = summary.rows_loaded,
        batches = summary.batches_written,
        "load complete"
    );
    Ok(summary)
}
