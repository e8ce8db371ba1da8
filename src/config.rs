//! Pipeline configuration file support
//!
//! Handles parsing of `etl.toml` configuration files and environment
//! variable overrides. The resulting [`EtlConfig`] is an immutable value
//! handed to the orchestrator; nothing reads process-wide settings later.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::catalog::Locale;
use crate::error::{EtlError, EtlResult};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "etl.toml";

/// Default scratch directory for staged files
pub const DEFAULT_SCRATCH_DIR: &str = "data_temp";

/// Default BigQuery REST endpoint
pub const DEFAULT_BIGQUERY_API: &str = "https://bigquery.googleapis.com";

/// Environment variable for the source backend
pub const ENV_SOURCE_BACKEND: &str = "ETL_SOURCE_BACKEND";

/// Environment variable for the PostgreSQL source connection string
pub const ENV_SOURCE_URL: &str = "ETL_SOURCE_URL";

/// Environment variable for the DuckDB source path
pub const ENV_SOURCE_PATH: &str = "ETL_SOURCE_PATH";

/// Environment variable for the source schema qualifier
pub const ENV_SOURCE_SCHEMA: &str = "ETL_SOURCE_SCHEMA";

/// Environment variable for the warehouse backend
pub const ENV_WAREHOUSE_BACKEND: &str = "ETL_WAREHOUSE_BACKEND";

/// Environment variable for the BigQuery project
pub const ENV_BIGQUERY_PROJECT: &str = "ETL_BIGQUERY_PROJECT";

/// Environment variable for the BigQuery dataset
pub const ENV_BIGQUERY_DATASET: &str = "ETL_BIGQUERY_DATASET";

/// Environment variable for the BigQuery OAuth access token
pub const ENV_BIGQUERY_TOKEN: &str = "ETL_BIGQUERY_TOKEN";

/// Environment variable for the DuckDB warehouse path
pub const ENV_WAREHOUSE_PATH: &str = "ETL_WAREHOUSE_PATH";

/// Environment variable for the scratch directory
pub const ENV_SCRATCH_DIR: &str = "ETL_SCRATCH_DIR";

/// Operational source backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceBackendType {
    /// PostgreSQL (default)
    #[default]
    Postgres,
    /// DuckDB database file
    DuckDB,
}

impl std::str::FromStr for SourceBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(SourceBackendType::Postgres),
            "duckdb" => Ok(SourceBackendType::DuckDB),
            _ => Err(format!(
                "Unknown source backend: {}. Use 'postgres' or 'duckdb'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for SourceBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceBackendType::Postgres => write!(f, "postgres"),
            SourceBackendType::DuckDB => write!(f, "duckdb"),
        }
    }
}

/// Warehouse backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseBackendType {
    /// Google BigQuery (default)
    #[default]
    BigQuery,
    /// DuckDB database file
    DuckDB,
}

impl std::str::FromStr for WarehouseBackendType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bigquery" | "bq" => Ok(WarehouseBackendType::BigQuery),
            "duckdb" => Ok(WarehouseBackendType::DuckDB),
            _ => Err(format!(
                "Unknown warehouse backend: {}. Use 'bigquery' or 'duckdb'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for WarehouseBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WarehouseBackendType::BigQuery => write!(f, "bigquery"),
            WarehouseBackendType::DuckDB => write!(f, "duckdb"),
        }
    }
}

/// Operational source configuration section
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SourceSection {
    /// Source backend type
    #[serde(default)]
    pub backend: SourceBackendType,

    /// Connection string (e.g., "postgresql://etl@localhost/procesadora")
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Path to a DuckDB source file
    #[serde(default)]
    pub path: Option<String>,

    /// Schema qualifier substituted for `{schema}` in query templates
    #[serde(default)]
    pub schema: Option<String>,
}

/// Warehouse configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseSection {
    /// Warehouse backend type
    #[serde(default)]
    pub backend: WarehouseBackendType,

    /// BigQuery project id
    #[serde(default)]
    pub project_id: Option<String>,

    /// BigQuery dataset id
    #[serde(default)]
    pub dataset_id: Option<String>,

    /// BigQuery job location
    #[serde(default = "default_location")]
    pub location: String,

    /// BigQuery REST endpoint (overridable for emulators)
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Interval between load job status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// OAuth access token; supplied at runtime and never written back
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    /// Path to a DuckDB warehouse file
    #[serde(default)]
    pub path: Option<String>,
}

fn default_location() -> String {
    "US".to_string()
}

fn default_api_base() -> String {
    DEFAULT_BIGQUERY_API.to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            backend: WarehouseBackendType::default(),
            project_id: None,
            dataset_id: None,
            location: default_location(),
            api_base: default_api_base(),
            poll_interval_ms: default_poll_interval_ms(),
            access_token: None,
            path: None,
        }
    }
}

/// Staging configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingSection {
    /// Scratch directory, deleted and recreated at the start of each run
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from(DEFAULT_SCRATCH_DIR)
}

impl Default for StagingSection {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
        }
    }
}

/// Run behaviour section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSection {
    /// Exit with a distinct status when any entity failed
    #[serde(default = "default_fail_on_partial")]
    pub fail_on_partial: bool,

    /// Language of month and weekday names in the time dimension
    #[serde(default)]
    pub locale: Locale,

    /// Restrict the run to these entities (catalog order is kept)
    #[serde(default)]
    pub entities: Vec<String>,
}

fn default_fail_on_partial() -> bool {
    true
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            fail_on_partial: default_fail_on_partial(),
            locale: Locale::default(),
            entities: Vec::new(),
        }
    }
}

/// Main configuration structure
///
/// Represents the `etl.toml` configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EtlConfig {
    /// Operational source
    #[serde(default)]
    pub source: SourceSection,

    /// Destination warehouse
    #[serde(default)]
    pub warehouse: WarehouseSection,

    /// Scratch area
    #[serde(default)]
    pub staging: StagingSection,

    /// Run behaviour
    #[serde(default)]
    pub run: RunSection,
}

impl EtlConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// A missing file falls back to defaults. Environment overrides are
    /// applied in both cases.
    pub fn load(path: &Path) -> EtlResult<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| {
                EtlError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;

            Self::parse(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> EtlResult<Self> {
        toml::from_str(content)
            .map_err(|e| EtlError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> EtlResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| EtlError::Config(format!("Failed to serialize config: {}", e)))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(backend) = std::env::var(ENV_SOURCE_BACKEND)
            && let Ok(backend_type) = backend.parse()
        {
            self.source.backend = backend_type;
        }

        if let Ok(url) = std::env::var(ENV_SOURCE_URL) {
            self.source.connection_string = Some(url);
        }

        if let Ok(path) = std::env::var(ENV_SOURCE_PATH) {
            self.source.path = Some(path);
        }

        if let Ok(schema) = std::env::var(ENV_SOURCE_SCHEMA) {
            self.source.schema = Some(schema);
        }

        if let Ok(backend) = std::env::var(ENV_WAREHOUSE_BACKEND)
            && let Ok(backend_type) = backend.parse()
        {
            self.warehouse.backend = backend_type;
        }

        if let Ok(project) = std::env::var(ENV_BIGQUERY_PROJECT) {
            self.warehouse.project_id = Some(project);
        }

        if let Ok(dataset) = std::env::var(ENV_BIGQUERY_DATASET) {
            self.warehouse.dataset_id = Some(dataset);
        }

        if let Ok(token) = std::env::var(ENV_BIGQUERY_TOKEN) {
            self.warehouse.access_token = Some(token);
        }

        if let Ok(path) = std::env::var(ENV_WAREHOUSE_PATH) {
            self.warehouse.path = Some(path);
        }

        if let Ok(dir) = std::env::var(ENV_SCRATCH_DIR) {
            self.staging.scratch_dir = PathBuf::from(dir);
        }
    }

    /// Check that the selected backends have what they need to connect
    pub fn validate(&self) -> EtlResult<()> {
        match self.source.backend {
            SourceBackendType::Postgres if self.source.connection_string.is_none() => {
                return Err(EtlError::Config(format!(
                    "source.connection_string is required for postgres (or set {})",
                    ENV_SOURCE_URL
                )));
            }
            SourceBackendType::DuckDB if self.source.path.is_none() => {
                return Err(EtlError::Config(format!(
                    "source.path is required for duckdb (or set {})",
                    ENV_SOURCE_PATH
                )));
            }
            _ => {}
        }

        match self.warehouse.backend {
            WarehouseBackendType::BigQuery => {
                if self.warehouse.project_id.is_none() || self.warehouse.dataset_id.is_none() {
                    return Err(EtlError::Config(
                        "warehouse.project_id and warehouse.dataset_id are required for bigquery"
                            .to_string(),
                    ));
                }
                if self.warehouse.access_token.is_none() {
                    return Err(EtlError::Config(format!(
                        "BigQuery access token missing; set {}",
                        ENV_BIGQUERY_TOKEN
                    )));
                }
            }
            WarehouseBackendType::DuckDB if self.warehouse.path.is_none() => {
                return Err(EtlError::Config(format!(
                    "warehouse.path is required for duckdb (or set {})",
                    ENV_WAREHOUSE_PATH
                )));
            }
            _ => {}
        }

        Ok(())
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Warehouse ETL configuration

[source]
# Operational database: "postgres" (default) or "duckdb"
backend = "postgres"
connection_string = "postgresql://etl@localhost:5432/procesadora"
# Qualifier prepended to every source table
schema = "public"

[warehouse]
# Destination: "bigquery" (default) or "duckdb"
backend = "bigquery"
project_id = "procesadora-dm"
dataset_id = "procesadora_dm"
location = "US"
poll_interval_ms = 1000
# The access token is read from ETL_BIGQUERY_TOKEN

[staging]
# Deleted and recreated on every run
scratch_dir = "data_temp"

[run]
# Exit with status 2 when any entity failed
fail_on_partial = true
# Month and weekday names in DimTiempo: "es" or "en"
locale = "es"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = EtlConfig::new();
        assert_eq!(config.source.backend, SourceBackendType::Postgres);
        assert_eq!(config.warehouse.backend, WarehouseBackendType::BigQuery);
        assert_eq!(config.staging.scratch_dir, PathBuf::from(DEFAULT_SCRATCH_DIR));
        assert_eq!(config.warehouse.location, "US");
        assert!(config.run.fail_on_partial);
        assert_eq!(config.run.locale, Locale::Es);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[source]
backend = "duckdb"
path = "ops.duckdb"

[warehouse]
backend = "duckdb"
path = "dw.duckdb"

[staging]
scratch_dir = "/tmp/etl"

[run]
fail_on_partial = false
locale = "en"
entities = ["DimTurno"]
"#;
        let config = EtlConfig::parse(toml).unwrap();
        assert_eq!(config.source.backend, SourceBackendType::DuckDB);
        assert_eq!(config.source.path.as_deref(), Some("ops.duckdb"));
        assert_eq!(config.warehouse.backend, WarehouseBackendType::DuckDB);
        assert_eq!(config.staging.scratch_dir, PathBuf::from("/tmp/etl"));
        assert!(!config.run.fail_on_partial);
        assert_eq!(config.run.locale, Locale::En);
        assert_eq!(config.run.entities, vec!["DimTurno".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        let toml = r#"
[source]
backend = "oracle"
"#;
        let err = EtlConfig::parse(toml).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_token_is_not_serialized() {
        let mut config = EtlConfig::new();
        config.warehouse.access_token = Some("ya29.secret".to_string());
        let toml = config.to_toml().unwrap();
        assert!(!toml.contains("ya29.secret"));
    }

    #[test]
    fn test_validate_requires_connection_details() {
        let config = EtlConfig::new();
        assert!(config.validate().is_err());

        let mut config = EtlConfig::new();
        config.source.connection_string = Some("postgresql://localhost/ops".to_string());
        config.warehouse.project_id = Some("p".to_string());
        config.warehouse.dataset_id = Some("d".to_string());
        assert!(config.validate().is_err());

        config.warehouse.access_token = Some("token".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = EtlConfig::load(&dir.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(config.warehouse.poll_interval_ms, 1000);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[warehouse]\nproject_id = \"p1\"\n").unwrap();
        let config = EtlConfig::load(&path).unwrap();
        assert_eq!(config.warehouse.project_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_backend_type_from_str() {
        assert_eq!(
            "postgresql".parse::<SourceBackendType>().unwrap(),
            SourceBackendType::Postgres
        );
        assert_eq!(
            "bq".parse::<WarehouseBackendType>().unwrap(),
            WarehouseBackendType::BigQuery
        );
        assert!("invalid".parse::<WarehouseBackendType>().is_err());
    }

    #[test]
    fn test_sample_config_is_valid() {
        let result = EtlConfig::parse(sample_config());
        assert!(result.is_ok(), "Sample config should be valid TOML");
    }
}
