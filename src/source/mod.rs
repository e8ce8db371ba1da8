//! Operational source backends
//!
//! The source is consumed as a query-execution capability: a read-only SQL
//! string goes in, a materialized [`ResultSet`] comes out. Backends:
//! - PostgreSQL: the production operational database
//! - DuckDB: embedded database for local runs and fixtures
//! - Memory: canned result sets keyed by query text, for tests
//!
//! Connection failures surface as [`EtlError::SourceUnavailable`]; failures
//! of an individual query surface as [`EtlError::QueryError`]. Both are
//! per-entity errors.

use async_trait::async_trait;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod memory;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbSource;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresSource;

pub use memory::MemorySource;

use crate::catalog::{TransformContext, TransformationDefinition};
use crate::error::{EtlError, EtlResult};
use crate::models::ResultSet;

/// Operational source backend trait
#[async_trait(?Send)]
pub trait SourceBackend: Send + Sync {
    /// Execute a read-only query and materialize every row
    async fn query(&self, sql: &str) -> EtlResult<ResultSet>;

    /// Check that the source answers
    async fn health_check(&self) -> EtlResult<()>;

    /// Backend type name, used in logs
    fn backend_type(&self) -> &'static str;
}

/// Stand-in for a source that could not be opened at startup
///
/// Every query fails with the original [`EtlError::SourceUnavailable`]
/// message, so each entity is reported as failed instead of the run aborting.
pub struct UnreachableSource {
    backend: &'static str,
    message: String,
}

impl UnreachableSource {
    pub fn new(backend: &'static str, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
        }
    }

    /// Keep an opened backend, or replace an unreachable one
    ///
    /// Any error other than `SourceUnavailable` is returned unchanged.
    pub fn or_unreachable(
        backend: &'static str,
        opened: EtlResult<Box<dyn SourceBackend>>,
    ) -> EtlResult<Box<dyn SourceBackend>> {
        match opened {
            Err(EtlError::SourceUnavailable(message)) => {
                tracing::error!(
                    backend,
                    error = %message,
                    "Source unreachable; every entity will be reported as failed"
                );
                Ok(Box::new(Self::new(backend, message)))
            }
            other => other,
        }
    }
}

#[async_trait(?Send)]
impl SourceBackend for UnreachableSource {
    async fn query(&self, _sql: &str) -> EtlResult<ResultSet> {
        Err(EtlError::SourceUnavailable(self.message.clone()))
    }

    async fn health_check(&self) -> EtlResult<()> {
        Err(EtlError::SourceUnavailable(self.message.clone()))
    }

    fn backend_type(&self) -> &'static str {
        self.backend
    }
}

/// Produces the published rows of one catalog entity
#[async_trait(?Send)]
pub trait Extractor {
    async fn extract(
        &self,
        definition: &TransformationDefinition,
        ctx: &TransformContext,
    ) -> EtlResult<ResultSet>;
}

/// Extractor that renders a definition's query, runs it against a source
/// backend and applies the definition's transforms
pub struct SourceExtractor {
    backend: Box<dyn SourceBackend>,
    schema: Option<String>,
}

impl SourceExtractor {
    pub fn new(backend: Box<dyn SourceBackend>, schema: Option<String>) -> Self {
        Self { backend, schema }
    }

    pub fn backend(&self) -> &dyn SourceBackend {
        self.backend.as_ref()
    }
}

#[async_trait(?Send)]
impl Extractor for SourceExtractor {
    async fn extract(
        &self,
        definition: &TransformationDefinition,
        ctx: &TransformContext,
    ) -> EtlResult<ResultSet> {
        let sql = definition.render_query(self.schema.as_deref());
        tracing::debug!(entity = definition.name(), sql = %sql, "Running extraction query");

        let raw = self.backend.query(&sql).await?;
        tracing::debug!(
            entity = definition.name(),
            rows = raw.row_count(),
            elapsed_ms = raw.execution_time_ms,
            "Extracted raw rows"
        );

        if raw.is_empty() {
            let columns = definition
                .output_columns()
                .iter()
                .map(|c| c.name.clone())
                .collect();
            return Ok(ResultSet {
                columns,
                rows: Vec::new(),
                execution_time_ms: raw.execution_time_ms,
            });
        }
        definition.apply(raw, ctx)
    }
}
