//! DuckDB source backend
//!
//! Embedded source for local runs: point it at a DuckDB file holding a copy
//! of the operational tables, or use it in-memory for fixtures.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::SourceBackend;
use crate::error::{EtlError, EtlResult};
use crate::models::{ResultSet, Scalar};

/// DuckDB source backend
pub struct DuckDbSource {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDbSource {
    /// Open a file-based source database
    pub fn open(db_path: impl AsRef<Path>) -> EtlResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            EtlError::SourceUnavailable(format!("Failed to open DuckDB {}: {}", path.display(), e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory source
    pub fn in_memory() -> EtlResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            EtlError::SourceUnavailable(format!("Failed to create in-memory DuckDB: {}", e))
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

    /// Execute statements that return no rows (fixture setup)
    pub fn execute_batch(&self, sql: &str) -> EtlResult<()> {
        let conn = self
            .connection
            .lock()
            .map_err(|e| EtlError::SourceUnavailable(format!("Lock error: {}", e)))?;

        conn.execute_batch(sql)
            .map_err(|e| EtlError::QueryError(format!("Batch execute failed: {}", e)))
    }

    fn micros(unit: duckdb::types::TimeUnit, value: i64) -> i64 {
        use duckdb::types::TimeUnit;

        match unit {
            TimeUnit::Second => value * 1_000_000,
            TimeUnit::Millisecond => value * 1_000,
            TimeUnit::Microsecond => value,
            TimeUnit::Nanosecond => value / 1_000,
        }
    }

    /// Convert a DuckDB ValueRef to a scalar
    ///
    /// Types with no scalar counterpart (lists, structs, intervals, ...) are
    /// rejected; cast them in the query.
    fn value_ref_to_scalar(column: &str, value: duckdb::types::ValueRef) -> EtlResult<Scalar> {
        use duckdb::types::ValueRef;

        let unsupported = |what: String| {
            EtlError::QueryError(format!(
                "column '{}' has unsupported value {}; cast it in the query",
                column, what
            ))
        };

        let scalar = match value {
            ValueRef::Null => Scalar::Null,
            ValueRef::Boolean(b) => Scalar::Bool(b),
            ValueRef::TinyInt(i) => Scalar::Int(i64::from(i)),
            ValueRef::SmallInt(i) => Scalar::Int(i64::from(i)),
            ValueRef::Int(i) => Scalar::Int(i64::from(i)),
            ValueRef::BigInt(i) => Scalar::Int(i),
            ValueRef::HugeInt(i) => i64::try_from(i)
                .map(Scalar::Int)
                .unwrap_or(Scalar::Float(i as f64)),
            ValueRef::UTinyInt(i) => Scalar::Int(i64::from(i)),
            ValueRef::USmallInt(i) => Scalar::Int(i64::from(i)),
            ValueRef::UInt(i) => Scalar::Int(i64::from(i)),
            ValueRef::UBigInt(i) => i64::try_from(i)
                .map(Scalar::Int)
                .unwrap_or(Scalar::Float(i as f64)),
            ValueRef::Float(f) => Scalar::Float(f64::from(f)),
            ValueRef::Double(f) => Scalar::Float(f),
            ValueRef::Decimal(d) => d
                .to_string()
                .parse::<f64>()
                .map(Scalar::Float)
                .map_err(|_| unsupported(format!("decimal {}", d)))?,
            ValueRef::Text(bytes) => Scalar::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => {
                // Encode blob as base64
                use base64::Engine;
                Scalar::Text(base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            ValueRef::Timestamp(unit, v) => DateTime::from_timestamp_micros(Self::micros(unit, v))
                .map(|t| Scalar::Timestamp(t.naive_utc()))
                .ok_or_else(|| unsupported(format!("timestamp {}", v)))?,
            ValueRef::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
                .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(days))))
                .map(Scalar::Date)
                .ok_or_else(|| unsupported(format!("date {}", days)))?,
            ValueRef::Time64(unit, v) => {
                let micros = Self::micros(unit, v);
                NaiveTime::from_num_seconds_from_midnight_opt(
                    (micros / 1_000_000) as u32,
                    ((micros % 1_000_000) * 1_000) as u32,
                )
                .map(Scalar::Time)
                .ok_or_else(|| unsupported(format!("time {}", v)))?
            }
            other => return Err(unsupported(format!("of type {:?}", other.data_type()))),
        };
        Ok(scalar)
    }
}

#[async_trait(?Send)]
impl SourceBackend for DuckDbSource {
    async fn query(&self, sql: &str) -> EtlResult<ResultSet> {
        let start = std::time::Instant::now();

        let conn = self
            .connection
            .lock()
            .map_err(|e| EtlError::SourceUnavailable(format!("Lock error: {}", e)))?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| EtlError::QueryError(format!("Prepare failed: {}", e)))?;

        // In DuckDB 1.4+, we need to execute the query first, then get columns
        let mut result_rows = stmt
            .query([])
            .map_err(|e| EtlError::QueryError(format!("Query failed: {}", e)))?;

        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| EtlError::QueryError(format!("Row fetch error: {}", e)))?
        {
            let values = columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let value = row.get_ref(i).map_err(|e| {
                        EtlError::QueryError(format!("Failed to read column '{}': {}", column, e))
                    })?;
                    Self::value_ref_to_scalar(column, value)
                })
                .collect::<EtlResult<Vec<_>>>()?;
            rows.push(values);
        }

        Ok(ResultSet {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> EtlResult<()> {
        self.query("SELECT 1").await.map(|_| ())
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    #[tokio::test]
    async fn test_query_maps_types() {
        let source = DuckDbSource::in_memory().unwrap();
        source
            .execute_batch(
                "CREATE TABLE Turno (idTurno INTEGER, turno VARCHAR, horaInicio TIME, creado TIMESTAMP);
                 INSERT INTO Turno VALUES (1, 'Mañana', '07:00:00', '2024-01-01 08:00:00.900'),
                                          (2, NULL, NULL, NULL);",
            )
            .unwrap();

        let rs = source
            .query("SELECT idTurno, turno, horaInicio, creado FROM Turno ORDER BY idTurno")
            .await
            .unwrap();
        assert_eq!(rs.columns, vec!["idTurno", "turno", "horaInicio", "creado"]);
        assert_eq!(rs.rows[0][0], Scalar::Int(1));
        assert_eq!(rs.rows[0][1], Scalar::from("Mañana"));
        assert_eq!(
            rs.rows[0][2],
            Scalar::Time(NaiveTime::from_hms_opt(7, 0, 0).unwrap())
        );
        assert_eq!(
            rs.rows[0][3],
            Scalar::Timestamp(
                NaiveDateTime::parse_from_str("2024-01-01 08:00:00.900", "%Y-%m-%d %H:%M:%S%.f")
                    .unwrap()
            )
        );
        assert!(rs.rows[1][1].is_null());
    }

    #[tokio::test]
    async fn test_missing_table_is_query_error() {
        let source = DuckDbSource::in_memory().unwrap();
        let err = source.query("SELECT * FROM Nope").await.unwrap_err();
        assert!(matches!(err, EtlError::QueryError(_)));
    }

    #[tokio::test]
    async fn test_unsupported_type_is_query_error() {
        let source = DuckDbSource::in_memory().unwrap();
        let err = source
            .query("SELECT [1, 2, 3] AS pesos")
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::QueryError(ref m) if m.contains("pesos")));
    }

    #[tokio::test]
    async fn test_decimal_is_float() {
        let source = DuckDbSource::in_memory().unwrap();
        let rs = source
            .query("SELECT CAST(12.50 AS DECIMAL(6, 2)) AS peso")
            .await
            .unwrap();
        assert_eq!(rs.rows[0][0], Scalar::Float(12.5));
    }
}
