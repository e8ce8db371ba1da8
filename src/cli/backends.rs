//! Source and warehouse construction from configuration

use warehouse_etl::config::{EtlConfig, SourceBackendType, WarehouseBackendType};
use warehouse_etl::source::{SourceBackend, SourceExtractor, UnreachableSource};
use warehouse_etl::warehouse::{Loader, Warehouse};
use warehouse_etl::{EtlError, EtlResult};

#[allow(dead_code)]
fn not_compiled(what: &str, feature: &str) -> EtlError {
    EtlError::Config(format!(
        "{} support is not compiled in; rebuild with --features {}",
        what, feature
    ))
}

/// Open the configured operational source
///
/// Only configuration errors are returned. An unreachable source still
/// yields an extractor; its entities fail one by one during the run.
pub async fn connect_source(config: &EtlConfig) -> EtlResult<SourceExtractor> {
    let backend = match config.source.backend {
        SourceBackendType::Postgres => {
            UnreachableSource::or_unreachable("postgres", postgres_source(config))?
        }
        SourceBackendType::DuckDB => {
            UnreachableSource::or_unreachable("duckdb", duckdb_source(config))?
        }
    };

    if let Err(e) = backend.health_check().await {
        tracing::warn!(
            backend = backend.backend_type(),
            error = %e,
            "Operational source is not answering"
        );
    } else {
        tracing::info!(
            backend = backend.backend_type(),
            schema = config.source.schema.as_deref().unwrap_or(""),
            "Connected to operational source"
        );
    }
    Ok(SourceExtractor::new(backend, config.source.schema.clone()))
}

#[cfg(feature = "postgres-backend")]
fn postgres_source(config: &EtlConfig) -> EtlResult<Box<dyn SourceBackend>> {
    let connection_string = config
        .source
        .connection_string
        .as_deref()
        .ok_or_else(|| EtlError::Config("source.connection_string is not set".to_string()))?;
    Ok(Box::new(warehouse_etl::source::PostgresSource::new(
        connection_string,
    )))
}

#[cfg(not(feature = "postgres-backend"))]
fn postgres_source(_config: &EtlConfig) -> EtlResult<Box<dyn SourceBackend>> {
    Err(not_compiled("PostgreSQL source", "postgres-backend"))
}

#[cfg(feature = "duckdb-backend")]
fn duckdb_source(config: &EtlConfig) -> EtlResult<Box<dyn SourceBackend>> {
    let path = config
        .source
        .path
        .as_deref()
        .ok_or_else(|| EtlError::Config("source.path is not set".to_string()))?;
    Ok(Box::new(warehouse_etl::source::DuckDbSource::open(path)?))
}

#[cfg(not(feature = "duckdb-backend"))]
fn duckdb_source(_config: &EtlConfig) -> EtlResult<Box<dyn SourceBackend>> {
    Err(not_compiled("DuckDB source", "duckdb-backend"))
}

/// Build the loader for the configured warehouse
pub fn open_warehouse(config: &EtlConfig) -> EtlResult<Loader> {
    let warehouse: Box<dyn Warehouse> = match config.warehouse.backend {
        WarehouseBackendType::BigQuery => bigquery_warehouse(config)?,
        WarehouseBackendType::DuckDB => duckdb_warehouse(config)?,
    };
    Ok(Loader::new(warehouse))
}

#[cfg(feature = "bigquery")]
fn bigquery_warehouse(config: &EtlConfig) -> EtlResult<Box<dyn Warehouse>> {
    use warehouse_etl::warehouse::bigquery::{BigQueryConfig, BigQueryWarehouse};

    let section = &config.warehouse;
    let required = |value: &Option<String>, name: &str| {
        value
            .clone()
            .ok_or_else(|| EtlError::Config(format!("warehouse.{} is not set", name)))
    };

    let warehouse = BigQueryWarehouse::new(BigQueryConfig {
        project_id: required(&section.project_id, "project_id")?,
        dataset_id: required(&section.dataset_id, "dataset_id")?,
        location: section.location.clone(),
        api_base: section.api_base.clone(),
        access_token: required(&section.access_token, "access_token")?,
        poll_interval: std::time::Duration::from_millis(section.poll_interval_ms),
    })?;
    Ok(Box::new(warehouse))
}

#[cfg(not(feature = "bigquery"))]
fn bigquery_warehouse(_config: &EtlConfig) -> EtlResult<Box<dyn Warehouse>> {
    Err(not_compiled("BigQuery warehouse", "bigquery"))
}

#[cfg(feature = "duckdb-backend")]
fn duckdb_warehouse(config: &EtlConfig) -> EtlResult<Box<dyn Warehouse>> {
    let path = config
        .warehouse
        .path
        .as_deref()
        .ok_or_else(|| EtlError::Config("warehouse.path is not set".to_string()))?;
    Ok(Box::new(warehouse_etl::warehouse::DuckDbWarehouse::open(
        path,
    )?))
}

#[cfg(not(feature = "duckdb-backend"))]
fn duckdb_warehouse(_config: &EtlConfig) -> EtlResult<Box<dyn Warehouse>> {
    Err(not_compiled("DuckDB warehouse", "duckdb-backend"))
}
