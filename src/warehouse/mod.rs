//! Analytical warehouse backends
//!
//! Every load replaces the destination table wholesale. A backend either
//! makes the complete new contents visible or fails and leaves the previous
//! contents untouched; partial appends are never observable.
//!
//! Backends:
//! - BigQuery: multipart load job with `WRITE_TRUNCATE`
//! - DuckDB: `CREATE OR REPLACE TABLE ... AS SELECT * FROM read_csv(...)`
//! - Memory: in-process tables for tests

use async_trait::async_trait;
use serde::Serialize;

#[cfg(feature = "bigquery")]
pub mod bigquery;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

pub mod memory;

#[cfg(feature = "bigquery")]
pub use self::bigquery::BigQueryWarehouse;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbWarehouse;

pub use memory::MemoryWarehouse;

use crate::error::{EtlError, EtlResult};
use crate::models::OutputColumn;
use crate::staging::StagedTable;

/// How the destination's existing rows are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    /// Discard existing rows and replace them with the load
    WriteTruncate,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteDisposition::WriteTruncate => "WRITE_TRUNCATE",
        }
    }
}

/// Format options of a bulk load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOptions {
    pub source_format: &'static str,
    pub skip_leading_rows: u32,
    pub write_disposition: WriteDisposition,
    pub allow_quoted_newlines: bool,
    pub encoding: &'static str,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            source_format: "CSV",
            skip_leading_rows: 1,
            write_disposition: WriteDisposition::WriteTruncate,
            allow_quoted_newlines: true,
            encoding: "UTF-8",
        }
    }
}

/// Target table of a load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    /// Table name (the entity name)
    pub table: String,
    /// Declared schema of the table
    pub columns: Vec<OutputColumn>,
}

impl Destination {
    pub fn new(table: impl Into<String>, columns: Vec<OutputColumn>) -> Self {
        Self {
            table: table.into(),
            columns,
        }
    }
}

/// Outcome of a completed load
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Destination table
    pub table: String,
    /// Rows in the table after the load, as reported by the warehouse
    pub rows_loaded: u64,
    /// Warehouse job identifier, when the backend has one
    pub job_id: Option<String>,
}

/// Warehouse backend trait
#[async_trait(?Send)]
pub trait Warehouse {
    /// Replace `destination` with the staged file, blocking until the job
    /// completes or fails
    async fn load_table(
        &self,
        staged: &StagedTable,
        destination: &Destination,
        options: &LoadOptions,
    ) -> EtlResult<LoadReport>;

    /// Backend type name, used in logs
    fn backend_type(&self) -> &'static str;
}

/// Publishes staged tables through a warehouse backend
pub struct Loader {
    warehouse: Box<dyn Warehouse>,
    options: LoadOptions,
}

impl Loader {
    pub fn new(warehouse: Box<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            options: LoadOptions::default(),
        }
    }

    pub fn backend_type(&self) -> &'static str {
        self.warehouse.backend_type()
    }

    /// Load a staged table with truncate-and-replace semantics
    pub async fn load(
        &self,
        staged: &StagedTable,
        destination: &Destination,
    ) -> EtlResult<LoadReport> {
        if destination.columns.is_empty() {
            return Err(EtlError::load_rejected(
                &destination.table,
                "destination has no declared columns",
            ));
        }

        tracing::info!(
            table = %destination.table,
            backend = self.warehouse.backend_type(),
            rows = staged.row_count,
            "Submitting load job"
        );
        let report = self
            .warehouse
            .load_table(staged, destination, &self.options)
            .await?;

        if report.rows_loaded != staged.row_count as u64 {
            tracing::warn!(
                table = %destination.table,
                staged = staged.row_count,
                loaded = report.rows_loaded,
                "Warehouse row count differs from staged row count"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = LoadOptions::default();
        assert_eq!(options.source_format, "CSV");
        assert_eq!(options.skip_leading_rows, 1);
        assert_eq!(options.write_disposition.as_str(), "WRITE_TRUNCATE");
        assert!(options.allow_quoted_newlines);
        assert_eq!(options.encoding, "UTF-8");
    }
}
