use clap::Parser;
use std::path::PathBuf;

use pg_ingest::config::ConnectionConfig;
use pg_ingest::error::LoadError;
use pg_ingest::runner::{run_load, LoadArgs};

/// Ingest CSV or Parquet data to PostgreSQL
#[derive(Parser, Clone)]
struct Args {
    /// PostgreSQL user name
    #[arg(long, default_value = "postgres")]
    user: String,

    /// PostgreSQL password
    #[arg(long, default_value = "postgres")]
    password: String,

    /// PostgreSQL host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// PostgreSQL port
    #[arg(long, default_value_t = 5433)]
    port: u16,

    /// PostgreSQL database name
    #[arg(long, default_value = "ny_taxi")]
    db: String,

    /// Table name to write to
    #[arg(long = "table_name")]
    table_name: String,

    /// Local path to the CSV or parquet file
    #[arg(long = "file_path")]
    file_path: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing();

    let load_args = LoadArgs {
        connection: ConnectionConfig {
            user: args.user,
            password: args.password,
            host: args.host,
            port: args.port,
            database: args.db,
        },
        table_name: args.table_name,
        file_path: args.file_path,
    };

    let summary = match run_load(load_args).await {
        Ok(summary) => summary,
        Err(LoadError::UnsupportedFormat { .. }) => {
            // Reported and done; nothing was touched, so this is not a
            // process failure.
            eprintln!("Error: Unsupported file format. Please provide a .parquet or .csv file");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    println!();
    println!("Load Summary");
    println!("============");
    println!("Rows loaded: {}", summary.rows_loaded);
    println!("Batches written: {}", summary.batches_written);
    println!("Duration: {:.2}s", summary.duration.as_secs_f64());
    if summary.duration.as_secs_f64() > 0.0 {
        println!(
            "Throughput: {:.2} rows/sec",
            summary.rows_loaded as f64 / summary.duration.as_secs_f64()
        );
    }

    Ok(())
}

/// Logging goes to stderr so progress output on stdout stays clean.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("pg_ingest=info,sqlx=off"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
