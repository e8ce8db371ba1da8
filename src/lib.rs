//! Warehouse ETL - star-schema rebuild from an operational database
//!
//! Provides:
//! - A catalog of dimension and fact transformations
//! - A shared time key rule used by the time dimension and every fact
//! - Extraction over pluggable operational sources (PostgreSQL, DuckDB)
//! - Delimited-text staging in a per-run scratch area
//! - Truncate-and-replace loads into a warehouse (BigQuery, DuckDB)
//! - A per-entity orchestrator that isolates failures

pub mod catalog;
pub mod config;
pub mod error;
pub mod keys;
pub mod models;
pub mod pipeline;
pub mod source;
pub mod staging;
pub mod warehouse;

// Re-export commonly used types
pub use catalog::{EntityKind, QueryCatalog, Transform, TransformContext, TransformationDefinition};
pub use config::EtlConfig;
pub use error::{EtlError, EtlResult};
pub use keys::{KeyRef, Label, TimeKey, normalize_time};
pub use models::{OutputColumn, ResultSet, Scalar};
pub use pipeline::{EntityOutcome, EntityReport, Orchestrator, RunSummary};
pub use source::{Extractor, MemorySource, SourceBackend, SourceExtractor, UnreachableSource};
pub use staging::{CsvStager, ScratchArea, StagedTable};
pub use warehouse::{Loader, MemoryWarehouse, Warehouse};

#[cfg(feature = "duckdb-backend")]
pub use source::DuckDbSource;
#[cfg(feature = "postgres-backend")]
pub use source::PostgresSource;
#[cfg(feature = "bigquery")]
pub use warehouse::BigQueryWarehouse;
#[cfg(feature = "duckdb-backend")]
pub use warehouse::DuckDbWarehouse;
