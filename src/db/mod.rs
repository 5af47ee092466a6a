//! Database layer - connection handle, table schema/DDL, and the write path

pub mod client;
pub mod schema;
pub mod sink;

pub use client::DbClient;
pub use schema::{Column, SqlType, TableSchema};
pub use sink::TableSink;
