//! Configuration for a load run: tuning constants and the connection record.

// ============================================================================
// Batch sizing
// ============================================================================

/// Rows per write batch. Fixed; the batch is the unit of progress reporting
/// and of durability.
pub const CHUNK_ROWS: usize = 100_000;

/// Rows sampled from the head of a CSV file to establish the column list
/// before streaming begins.
pub const SCHEMA_PEEK_ROWS: usize = 100;

/// Upper bound on rows per INSERT statement when a batch is split into
/// statements.
pub const INSERT_BATCH_ROWS: usize = 1_000;

/// Bind parameters per statement are a u16 in the Postgres wire protocol.
pub const MAX_BIND_PARAMS: usize = 65_535;

// ============================================================================
// Connection parameters
// ============================================================================

/// Database endpoint parameters, passed explicitly into the loader.
///
/// Defaults mirror the CLI defaults in `main`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl ConnectionConfig {
    /// `host:port/database`, safe to log and embed in error text.
    pub fn endpoint(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            host: "localhost".to_string(),
            port: 5433,
            database: "ny_taxi".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_omits_credentials() {
        let config = ConnectionConfig::default();
        assert_eq!(config.endpoint(), "localhost:5433/ny_taxi");
        assert!(!config.endpoint().contains("postgres"));
    }
}
