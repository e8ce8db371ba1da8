//! In-memory warehouse
//!
//! Holds published tables as decoded text records. Clones share state, so a
//! test can keep a handle while the loader owns another.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{Destination, LoadOptions, LoadReport, Warehouse};
use crate::error::{EtlError, EtlResult};
use crate::staging::{StagedTable, csv};

/// Contents of one published table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoredTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl StoredTable {
    /// Values of a column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, StoredTable>,
    rejections: HashMap<String, String>,
    jobs: usize,
}

/// Warehouse kept in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    state: Arc<Mutex<State>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> EtlResult<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| EtlError::load_rejected("*", format!("Lock error: {}", e)))?;
        Ok(f(&mut state))
    }

    /// Pre-populate a table, as left by an earlier run
    pub fn seed(&self, table: &str, contents: StoredTable) {
        let _ = self.with_state(|s| s.tables.insert(table.to_string(), contents));
    }

    /// Reject every load into `table` with `message`
    pub fn reject(&self, table: &str, message: &str) {
        let _ = self.with_state(|s| s.rejections.insert(table.to_string(), message.to_string()));
    }

    /// Current contents of a table
    pub fn table(&self, table: &str) -> Option<StoredTable> {
        self.with_state(|s| s.tables.get(table).cloned())
            .ok()
            .flatten()
    }

    /// Number of load jobs submitted, rejected ones included
    pub fn job_count(&self) -> usize {
        self.with_state(|s| s.jobs).unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl Warehouse for MemoryWarehouse {
    async fn load_table(
        &self,
        staged: &StagedTable,
        destination: &Destination,
        options: &LoadOptions,
    ) -> EtlResult<LoadReport> {
        let table = destination.table.as_str();
        let job = self.with_state(|s| {
            s.jobs += 1;
            s.jobs
        })?;

        if let Some(message) = self.with_state(|s| s.rejections.get(table).cloned())? {
            return Err(EtlError::load_rejected(table, message));
        }

        let content = tokio::fs::read_to_string(&staged.path)
            .await
            .map_err(|e| EtlError::load_rejected(table, format!("Unreadable file: {}", e)))?;
        let mut records = csv::decode(&content)
            .ok_or_else(|| EtlError::load_rejected(table, "Unterminated quoted field"))?
            .into_iter();

        let skip = options.skip_leading_rows as usize;
        let header: Vec<String> = records.next().unwrap_or_default();
        let rows: Vec<Vec<String>> = records.skip(skip.saturating_sub(1)).collect();

        let expected: Vec<&str> = destination.columns.iter().map(|c| c.name.as_str()).collect();
        if header != expected {
            return Err(EtlError::load_rejected(
                table,
                format!("Header {:?} does not match schema {:?}", header, expected),
            ));
        }
        if let Some(bad) = rows.iter().position(|r| r.len() != expected.len()) {
            return Err(EtlError::load_rejected(
                table,
                format!("Row {} has the wrong number of fields", bad + 1),
            ));
        }

        let rows_loaded = rows.len() as u64;
        self.with_state(|s| {
            s.tables.insert(
                table.to_string(),
                StoredTable {
                    columns: header,
                    rows,
                },
            )
        })?;

        Ok(LoadReport {
            table: table.to_string(),
            rows_loaded,
            job_id: Some(format!("memory-{}", job)),
        })
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
