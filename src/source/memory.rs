//! In-memory source backend
//!
//! Answers queries from canned result sets keyed by query text. Whitespace
//! in the key and in the executed query is collapsed before matching.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::SourceBackend;
use crate::error::{EtlError, EtlResult};
use crate::models::ResultSet;

fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canned source for tests and dry runs
#[derive(Default)]
pub struct MemorySource {
    responses: HashMap<String, EtlResult<ResultSet>>,
    executed: Mutex<Vec<String>>,
    offline: bool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` with `result`
    pub fn with_result(mut self, sql: &str, result: ResultSet) -> Self {
        self.responses.insert(normalize_sql(sql), Ok(result));
        self
    }

    /// Fail `sql` with `error`
    pub fn with_error(mut self, sql: &str, error: EtlError) -> Self {
        self.responses.insert(normalize_sql(sql), Err(error));
        self
    }

    /// Make every call fail as if the source were unreachable
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Queries executed so far, in order
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl SourceBackend for MemorySource {
    async fn query(&self, sql: &str) -> EtlResult<ResultSet> {
        if self.offline {
            return Err(EtlError::SourceUnavailable(
                "memory source is offline".to_string(),
            ));
        }

        let key = normalize_sql(sql);
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(key.clone());
        }

        match self.responses.get(&key) {
            Some(response) => response.clone(),
            None => Err(EtlError::QueryError(format!(
                "no canned result for query: {}",
                key
            ))),
        }
    }

    async fn health_check(&self) -> EtlResult<()> {
        if self.offline {
            return Err(EtlError::SourceUnavailable(
                "memory source is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
