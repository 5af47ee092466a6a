//! The destination-table write path as an explicit state machine.

use tracing::info;

use crate::db::client::DbClient;
use crate::db::schema::TableSchema;
use crate::error::LoadError;
use crate::formats::Record;

/// Progression of the destination table within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Nothing written yet: the next write drops any existing table and
    /// recreates it from the batch schema before appending.
    ReplaceOnFirstWrite,
    /// The table shape is established for this run; writes append only.
    Established,
}

/// Writes batches to one destination table. The first write is destructive
/// (drop + create from the schema, then append); every later write appends.
/// The destructive first step is what makes consecutive runs over the same
/// file land in identical final state.
///
/// A run is not atomic across batches: every completed batch stays written
/// even if a later one fails.
pub struct TableSink {
    table_name: String,
    schema: TableSchema,
    state: SinkState,
}

impl TableSink {
    pub fn new(table_name: String, schema: TableSchema) -> Self {
        Self {
            table_name,
            schema,
            state: SinkState::ReplaceOnFirstWrite,
        }
    }

    /// Write one batch, appending its rows. Returns the number of rows
    /// written.
    pub async fn write_batch(
        &mut self,
        db: &mut DbClient,
        rows: &[Record],
    ) -> Result<u64, LoadError> {
        match self.state {
            SinkState::ReplaceOnFirstWrite => {
                info!(table = %self.table_name, "creating table from batch schema");
                db.replace_table(&self.table_name, &self.schema).await?;
                let written = db.append_rows(&self.table_name, &self.schema, rows).await?;
                self.state = SinkState::Established;
                Ok(written)
            }
            SinkState::Established => db.append_rows(&self.table_name, &self.schema, rows).await,
        }
    }
}
