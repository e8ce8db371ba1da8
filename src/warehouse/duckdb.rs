//! DuckDB warehouse backend
//!
//! Local stand-in for the analytical warehouse. Each load is a single
//! `CREATE OR REPLACE TABLE ... AS SELECT * FROM read_csv(...)` statement,
//! so a failed load leaves the previous table in place.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Destination, LoadOptions, LoadReport, Warehouse};
use crate::error::{EtlError, EtlResult};
use crate::staging::StagedTable;

/// DuckDB warehouse backend
pub struct DuckDbWarehouse {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl DuckDbWarehouse {
    /// Open (or create) a file-based warehouse
    pub fn open(db_path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            EtlError::Config(format!("Failed to open DuckDB {}: {}", path.display(), e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory warehouse
    pub fn in_memory() -> EtlResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            EtlError::Config(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Replace-table statement for a staged file
    fn load_sql(
        staged: &StagedTable,
        destination: &Destination,
        options: &LoadOptions,
    ) -> String {
        let columns: Vec<String> = destination
            .columns
            .iter()
            .map(|c| {
                format!(
                    "{}: {}",
                    quote_literal(&c.name),
                    quote_literal(c.data_type.duckdb_type())
                )
            })
            .collect();

        format!(
            "CREATE OR REPLACE TABLE {} AS SELECT * FROM read_csv({}, header = {}, \
             delim = ',', quote = '\"', escape = '\"', columns = {{{}}})",
            quote_identifier(&destination.table),
            quote_literal(&staged.path.to_string_lossy()),
            options.skip_leading_rows > 0,
            columns.join(", ")
        )
    }

    /// Count rows of a published table
    pub fn row_count(&self, table: &str) -> EtlResult<u64> {
        let conn = self
            .connection
            .lock()
            .map_err(|e| EtlError::load_rejected(table, format!("Lock error: {}", e)))?;

        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
                [],
                |row| row.get(0),
            )
            .map_err(|e| EtlError::load_rejected(table, format!("Count failed: {}", e)))?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait(?Send)]
impl Warehouse for DuckDbWarehouse {
    async fn load_table(
        &self,
        staged: &StagedTable,
        destination: &Destination,
        options: &LoadOptions,
    ) -> EtlResult<LoadReport> {
        let table = destination.table.as_str();
        let sql = Self::load_sql(staged, destination, options);
        {
            let conn = self
                .connection
                .lock()
                .map_err(|e| EtlError::load_rejected(table, format!("Lock error: {}", e)))?;
            conn.execute_batch(&sql)
                .map_err(|e| EtlError::load_rejected(table, e.to_string()))?;
        }

        Ok(LoadReport {
            table: table.to_string(),
            rows_loaded: self.row_count(table)?,
            job_id: None,
        })
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }
}
