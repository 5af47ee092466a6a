//! Database access for a load run: one connection, multi-row INSERTs with
//! typed binds.

use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection};
use sqlx::query::Query;
use sqlx::{ConnectOptions, Postgres};
use tracing::debug;

use crate::config::{ConnectionConfig, INSERT_BATCH_ROWS, MAX_BIND_PARAMS};
use crate::db::schema::{parse_datetime, quote_ident, Column, SqlType, TableSchema};
use crate::error::LoadError;
use crate::formats::Record;

/// Handle to the destination database. Production runs hold exactly one
/// Postgres connection; tests swap in an in-memory SQLite database.
pub enum DbClient {
    Postgres(Box<PgConnection>),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

impl DbClient {
    /// Open the single connection for the run.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, LoadError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        debug!(endpoint = %config.endpoint(), "connecting to database");
        let conn = options
            .connect()
            .await
            .map_err(|source| LoadError::Connection {
                endpoint: config.endpoint(),
                source,
            })?;

        Ok(DbClient::Postgres(Box::new(conn)))
    }

    /// Open an in-memory SQLite database. The pool is capped at one
    /// connection and never recycles it: the database lives exactly as long
    /// as the pool, and a cloned handle lets tests inspect the result after
    /// the run.
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<(Self, sqlx::SqlitePool), sqlx::Error> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok((DbClient::Sqlite(pool.clone()), pool))
    }

    async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        match self {
            DbClient::Postgres(conn) => {
                sqlx::query(sql).execute(&mut **conn).await?;
            }
            #[cfg(test)]
            DbClient::Sqlite(pool) => {
                sqlx::query(sql).execute(&*pool).await?;
            }
        }
        Ok(())
    }

    /// Drop any existing table with this name and create it fresh from the
    /// schema, with zero rows.
    pub async fn replace_table(
        &mut self,
        table_name: &str,
        schema: &TableSchema,
    ) -> Result<(), LoadError> {
        let drop_sql = TableSchema::drop_table_sql(table_name);
        let create_sql = schema.create_table_sql(table_name);

        debug!(table = table_name, "dropping and recreating table");
        for sql in [drop_sql.as_str(), create_sql.as_str()] {
            self.execute(sql).await.map_err(|source| LoadError::Write {
                table: table_name.to_string(),
                source,
            })?;
        }
        Ok(())
    }

    /// Append a batch of rows. The batch is issued as consecutive multi-row
    /// INSERT statements kept under the bind-parameter ceiling; each
    /// statement autocommits, so durability is per completed statement and
    /// never spans batches.
    pub async fn append_rows(
        &mut self,
        table_name: &str,
        schema: &TableSchema,
        rows: &[Record],
    ) -> Result<u64, LoadError> {
        let num_columns = schema.columns.len();
        let rows_per_statement = rows_per_statement(num_columns);
        let mut appended = 0u64;

        for statement_rows in rows.chunks(rows_per_statement) {
            for record in statement_rows {
                if record.fields.len() != num_columns {
                    return Err(LoadError::SourceRead(format!(
                        "row has {} values but the schema has {} columns",
                        record.fields.len(),
                        num_columns
                    )));
                }
            }

            let sql = insert_statement(table_name, schema, statement_rows.len());
            match self {
                DbClient::Postgres(conn) => {
                    let mut query = sqlx::query(&sql);
                    for record in statement_rows {
                        for (column, field) in schema.columns.iter().zip(&record.fields) {
                            query = bind_value(query, column, field)?;
                        }
                    }
                    query
                        .execute(&mut **conn)
                        .await
                        .map_err(|source| LoadError::Write {
                            table: table_name.to_string(),
                            source,
                        })?;
                }
                #[cfg(test)]
                DbClient::Sqlite(pool) => {
                    let sqlite_sql = to_sqlite_placeholders(&sql);
                    let mut query = sqlx::query(&sqlite_sql);
                    for record in statement_rows {
                        for field in &record.fields {
                            // Same NULL convention as the typed path.
                            query = if field.trim().is_empty() {
                                query.bind(None::<String>)
                            } else {
                                query.bind(field)
                            };
                        }
                    }
                    query
                        .execute(&*pool)
                        .await
                        .map_err(|source| LoadError::Write {
                            table: table_name.to_string(),
                            source,
                        })?;
                }
            }
            appended += statement_rows.len() as u64;
        }

        Ok(appended)
    }
}

/// Rows per INSERT statement: capped both by the configured batch size and
/// by the wire protocol's parameter ceiling.
fn rows_per_statement(num_columns: usize) -> usize {
    (MAX_BIND_PARAMS / num_columns.max(1)).clamp(1, INSERT_BATCH_ROWS)
}

/// `INSERT INTO "t" ("a", "b") VALUES ($1, $2), ($3, $4), ...`
fn insert_statement(table_name: &str, schema: &TableSchema, row_count: usize) -> String {
    let column_list: Vec<String> = schema
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect();

    let mut value_groups = Vec::with_capacity(row_count);
    let mut param_idx = 1;
    for _ in 0..row_count {
        let placeholders: Vec<String> = (0..schema.columns.len())
            .map(|_| {
                let placeholder = format!("${}", param_idx);
                param_idx += 1;
                placeholder
            })
            .collect();
        value_groups.push(format!("({})", placeholders.join(", ")));
    }

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(table_name),
        column_list.join(", "),
        value_groups.join(", ")
    )
}

/// Bind a single value with the parameter type implied by the column.
fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    column: &Column,
    value: &'q str,
) -> Result<Query<'q, Postgres, PgArguments>, LoadError> {
    let trimmed = value.trim();

    if trimmed.is_empty() {
        return Ok(bind_null(query, &column.sql_type));
    }

    Ok(match column.sql_type {
        SqlType::Boolean => query.bind(parse_bool(trimmed)),
        SqlType::SmallInt => query.bind(parse_field::<i16>(column, trimmed)?),
        SqlType::Integer => query.bind(parse_field::<i32>(column, trimmed)?),
        SqlType::BigInt => query.bind(parse_field::<i64>(column, trimmed)?),
        SqlType::Real => query.bind(parse_field::<f32>(column, trimmed)?),
        SqlType::DoublePrecision | SqlType::Numeric => {
            query.bind(parse_field::<f64>(column, trimmed)?)
        }
        SqlType::Timestamp => {
            let timestamp = parse_datetime(trimmed).ok_or_else(|| {
                LoadError::SourceRead(format!(
                    "column '{}': cannot parse '{}' as a date-time value",
                    column.name, trimmed
                ))
            })?;
            query.bind(timestamp)
        }
        SqlType::Text => query.bind(value),
    })
}

/// Typed NULL for the column, so the parameter type still matches.
fn bind_null<'q>(
    query: Query<'q, Postgres, PgArguments>,
    sql_type: &SqlType,
) -> Query<'q, Postgres, PgArguments> {
    match sql_type {
        SqlType::Boolean => query.bind(None::<bool>),
        SqlType::SmallInt => query.bind(None::<i16>),
        SqlType::Integer => query.bind(None::<i32>),
        SqlType::BigInt => query.bind(None::<i64>),
        SqlType::Real => query.bind(None::<f32>),
        SqlType::DoublePrecision | SqlType::Numeric => query.bind(None::<f64>),
        SqlType::Timestamp => query.bind(None::<chrono::NaiveDateTime>),
        SqlType::Text => query.bind(None::<String>),
    }
}

fn parse_field<T: std::str::FromStr>(column: &Column, value: &str) -> Result<T, LoadError>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    value.parse().map_err(|e| {
        LoadError::SourceRead(format!(
            "column '{}': cannot parse '{}' as {}: {}",
            column.name,
            value,
            column.sql_type.to_postgres(),
            e
        ))
    })
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("t") || value == "1"
}

/// Convert Postgres-style placeholders ($1, $2, ...) to SQLite-style (?, ?, ...).
#[cfg(test)]
fn to_sqlite_placeholders(sql: &str) -> String {
    let mut result = String::new();
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' {
            while chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                chars.next();
            }
            result.push('?');
        } else {
            result.push(ch);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_column_schema() -> TableSchema {
        TableSchema {
            columns: vec![
                Column {
                    name: "id".to_string(),
                    sql_type: SqlType::Text,
                },
                Column {
                    name: "name".to_string(),
                    sql_type: SqlType::Text,
                },
            ],
        }
    }

    #[test]
    fn test_insert_statement_placeholders() {
        let sql = insert_statement("people", &two_column_schema(), 2);
        assert_eq!(
            sql,
            "INSERT INTO \"people\" (\"id\", \"name\") VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_to_sqlite_placeholders() {
        assert_eq!(
            to_sqlite_placeholders("INSERT INTO t (a, b) VALUES ($1, $2), ($3, $4)"),
            "INSERT INTO t (a, b) VALUES (?, ?), (?, ?)"
        );
        assert_eq!(to_sqlite_placeholders("SELECT 1"), "SELECT 1");
    }

    #[test]
    fn test_rows_per_statement_caps() {
        // Narrow tables use the configured batch size.
        assert_eq!(rows_per_statement(3), INSERT_BATCH_ROWS);
        // Wide tables are capped by the parameter ceiling.
        assert_eq!(rows_per_statement(200), MAX_BIND_PARAMS / 200);
        assert!(rows_per_statement(MAX_BIND_PARAMS * 2) >= 1);
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("T"));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }

    #[tokio::test]
    async fn test_append_rows_splits_into_statements() {
        let (mut db, pool) = DbClient::sqlite_in_memory().await.unwrap();
        let schema = two_column_schema();
        db.replace_table("people", &schema).await.unwrap();

        // More rows than fit in one statement.
        let rows: Vec<Record> = (0..INSERT_BATCH_ROWS + 500)
            .map(|i| Record {
                fields: vec![i.to_string(), format!("name_{}", i)],
            })
            .collect();

        let appended = db.append_rows("people", &schema, &rows).await.unwrap();
        assert_eq!(appended, rows.len() as u64);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM \"people\"")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, rows.len() as i64);
    }

    #[tokio::test]
    async fn test_append_rows_rejects_short_rows() {
        let (mut db, _pool) = DbClient::sqlite_in_memory().await.unwrap();
        let schema = two_column_schema();
        db.replace_table("people", &schema).await.unwrap();

        let rows = vec![Record {
            fields: vec!["only one".to_string()],
        }];
        let err = db.append_rows("people", &schema, &rows).await.unwrap_err();
        assert!(matches!(err, LoadError::SourceRead(_)));
    }

    #[tokio::test]
    async fn test_empty_fields_land_as_null() {
        let (mut db, pool) = DbClient::sqlite_in_memory().await.unwrap();
        let schema = two_column_schema();
        db.replace_table("people", &schema).await.unwrap();

        let rows = vec![Record {
            fields: vec!["1".to_string(), "".to_string()],
        }];
        db.append_rows("people", &schema, &rows).await.unwrap();

        let (nulls,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM \"people\" WHERE \"name\" IS NULL")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(nulls, 1);
    }

    #[tokio::test]
    async fn test_replace_table_drops_previous_shape() {
        let (mut db, pool) = DbClient::sqlite_in_memory().await.unwrap();

        sqlx::query("CREATE TABLE \"people\" (\"legacy\" TEXT)")
            .execute(&pool)
            .await
            .unwrap();

        db.replace_table("people", &two_column_schema())
            .await
            .unwrap();

        let columns: Vec<(i32, String, String, i32, Option<String>, i32)> =
            sqlx::query_as("PRAGMA table_info(\"people\")")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.1.as_str()).collect();
        assert_eq!(names, vec!["id", "name"]);
    }
}
