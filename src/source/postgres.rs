//! PostgreSQL source backend
//!
//! Reads the operational database over a single `tokio-postgres`
//! connection, opened on the first query and reopened when the server
//! drops it. Unquoted identifiers come back lowercased; result set column
//! lookups fall back to case-insensitive matching so catalog names still
//! resolve.

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use super::SourceBackend;
use crate::error::{EtlError, EtlResult};
use crate::models::{ResultSet, Scalar};

/// PostgreSQL source backend
pub struct PostgresSource {
    /// Connection string
    connection_string: String,
    /// PostgreSQL client, `None` until the first query
    client: Mutex<Option<tokio_postgres::Client>>,
}

impl PostgresSource {
    /// Create a source that connects on first use
    ///
    /// # Arguments
    /// * `connection_string` - PostgreSQL connection string
    pub fn new(connection_string: &str) -> Self {
        Self {
            connection_string: connection_string.to_string(),
            client: Mutex::new(None),
        }
    }

    /// Create a source and connect immediately
    pub async fn connect(connection_string: &str) -> EtlResult<Self> {
        let source = Self::new(connection_string);
        drop(source.connected().await?);
        Ok(source)
    }

    async fn open(connection_string: &str) -> EtlResult<tokio_postgres::Client> {
        let (client, connection) =
            tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
                .await
                .map_err(|e| {
                    EtlError::SourceUnavailable(format!("Failed to connect to PostgreSQL: {}", e))
                })?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(client)
    }

    /// Lock the client, connecting first if there is no live connection
    async fn connected(&self) -> EtlResult<MutexGuard<'_, Option<tokio_postgres::Client>>> {
        let mut guard = self.client.lock().await;
        if guard.as_ref().is_none_or(|c| c.is_closed()) {
            tracing::debug!(
                connection = %self.connection_string_masked(),
                "Connecting to PostgreSQL"
            );
            *guard = Some(Self::open(&self.connection_string).await?);
        }
        Ok(guard)
    }

    /// Whether a live connection is currently held
    pub async fn is_connected(&self) -> bool {
        self.client
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| !c.is_closed())
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> String {
        mask_password(&self.connection_string)
    }

    /// Map a driver error to the per-entity taxonomy
    ///
    /// Errors reported by the server are query errors; anything else means
    /// the connection itself is gone.
    fn map_error(e: tokio_postgres::Error) -> EtlError {
        if e.as_db_error().is_some() {
            EtlError::QueryError(e.to_string())
        } else if e.is_closed() {
            EtlError::SourceUnavailable(format!("Connection closed: {}", e))
        } else {
            EtlError::QueryError(e.to_string())
        }
    }

    /// Get a column value as a scalar
    fn get_column_value(row: &tokio_postgres::Row, idx: usize) -> EtlResult<Scalar> {
        // Try different types
        if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
            return Ok(v.map(Scalar::Text).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
            return Ok(v.map(Scalar::Int).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
            return Ok(v.map(Scalar::from).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<i16>>(idx) {
            return Ok(v.map(|n| Scalar::Int(i64::from(n))).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
            return Ok(v.map(Scalar::Float).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<f32>>(idx) {
            return Ok(v.map(|f| Scalar::Float(f64::from(f))).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
            return Ok(v.map(Scalar::Bool).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<chrono::NaiveDateTime>>(idx) {
            return Ok(v.map(Scalar::Timestamp).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx) {
            return Ok(v.map(|t| Scalar::Timestamp(t.naive_utc())).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<chrono::NaiveDate>>(idx) {
            return Ok(v.map(Scalar::Date).unwrap_or(Scalar::Null));
        }
        if let Ok(v) = row.try_get::<_, Option<chrono::NaiveTime>>(idx) {
            return Ok(v.map(Scalar::Time).unwrap_or(Scalar::Null));
        }

        let column = &row.columns()[idx];
        Err(EtlError::QueryError(format!(
            "column '{}' has unsupported type {}; cast it in the query",
            column.name(),
            column.type_()
        )))
    }
}

fn mask_password(connection_string: &str) -> String {
    if let Some(at_pos) = connection_string.find('@')
        && let Some(colon_pos) = connection_string[..at_pos].rfind(':')
        && !connection_string[colon_pos + 1..].starts_with("//")
    {
        let prefix = &connection_string[..colon_pos + 1];
        let suffix = &connection_string[at_pos..];
        return format!("{}****{}", prefix, suffix);
    }
    connection_string.to_string()
}

#[async_trait(?Send)]
impl SourceBackend for PostgresSource {
    async fn query(&self, sql: &str) -> EtlResult<ResultSet> {
        let start = std::time::Instant::now();
        let guard = self.connected().await?;
        let Some(client) = guard.as_ref() else {
            return Err(EtlError::SourceUnavailable(
                "PostgreSQL connection is not open".to_string(),
            ));
        };

        // Prepare first so column names are known even for empty results
        let statement = client.prepare(sql).await.map_err(Self::map_error)?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = client
            .query(&statement, &[])
            .await
            .map_err(Self::map_error)?;

        let rows = rows
            .iter()
            .map(|row| {
                (0..columns.len())
                    .map(|i| Self::get_column_value(row, i))
                    .collect::<EtlResult<Vec<_>>>()
            })
            .collect::<EtlResult<Vec<_>>>()?;

        Ok(ResultSet {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn health_check(&self) -> EtlResult<()> {
        let guard = self.connected().await?;
        let Some(client) = guard.as_ref() else {
            return Err(EtlError::SourceUnavailable(
                "PostgreSQL connection is not open".to_string(),
            ));
        };
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| EtlError::SourceUnavailable(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}
