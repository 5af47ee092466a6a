//! Destination table schema: SQL types, DDL rendering, and the canonical
//! date-time representation shared by both ingestion paths.

use chrono::{NaiveDate, NaiveDateTime};

/// SQL data type of a destination column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Text,
    Timestamp,
}

impl SqlType {
    /// Returns the Postgres type name.
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Numeric => "NUMERIC",
            SqlType::Text => "TEXT",
            SqlType::Timestamp => "TIMESTAMP",
        }
    }
}

/// A column in the destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

/// Ordered destination columns. Order always matches the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Names of the columns that will land as TIMESTAMP.
    pub fn datetime_column_names(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.sql_type == SqlType::Timestamp)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// DDL for creating the table fresh. Every column is nullable.
    pub fn create_table_sql(&self, table_name: &str) -> String {
        let column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("  {} {}", quote_ident(&col.name), col.sql_type.to_postgres()))
            .collect();

        format!(
            "CREATE TABLE {} (\n{}\n)",
            quote_ident(table_name),
            column_defs.join(",\n")
        )
    }

    pub fn drop_table_sql(table_name: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_ident(table_name))
    }
}

/// Double-quote an identifier, doubling any embedded quotes, so mixed-case
/// and reserved names survive.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Canonical rendering for date-time values. `%.f` prints fractional seconds
/// only when present, so whole-second values round-trip unchanged.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse a date-time value in any of the accepted input formats.
///
/// Bare dates parse to midnight. Returns `None` when no format matches;
/// callers decide whether that is fatal.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S%.f", // SQL format, optional fractional seconds
        "%Y-%m-%dT%H:%M:%S%.f", // ISO 8601, optional fractional seconds
        "%Y-%m-%d %H:%M",       // Without seconds
        "%Y-%m-%dT%H:%M",       // ISO 8601 without seconds
        "%m/%d/%Y %H:%M:%S",    // US format with time
        "%d-%m-%Y %H:%M:%S",    // European format with time
        "%d/%m/%Y %H:%M:%S",    // European format with time
    ];

    for format in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }

    let date_formats = [
        "%Y-%m-%d", // ISO 8601
        "%m/%d/%Y", // US format
        "%d-%m-%Y", // European format with dashes
        "%d/%m/%Y", // European format with slashes
    ];

    for format in &date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Render a date-time value in the canonical representation.
pub fn format_datetime(value: NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}
