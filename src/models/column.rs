//! Declared output columns of a transformation

use serde::{Deserialize, Serialize};

/// Warehouse data type of an output column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// 64-bit signed integer (keys, counters)
    Int64,
    /// 64-bit float (measures)
    Float64,
    /// UTF-8 text
    String,
    /// Calendar date
    Date,
    /// Time of day
    Time,
    /// Date and time without zone
    DateTime,
    /// Boolean
    Bool,
}

impl DataType {
    /// BigQuery standard SQL type name
    pub fn bigquery_type(&self) -> &'static str {
        match self {
            DataType::Int64 => "INT64",
            DataType::Float64 => "FLOAT64",
            DataType::String => "STRING",
            DataType::Date => "DATE",
            DataType::Time => "TIME",
            DataType::DateTime => "DATETIME",
            DataType::Bool => "BOOL",
        }
    }

    /// DuckDB type name
    pub fn duckdb_type(&self) -> &'static str {
        match self {
            DataType::Int64 => "BIGINT",
            DataType::Float64 => "DOUBLE",
            DataType::String => "VARCHAR",
            DataType::Date => "DATE",
            DataType::Time => "TIME",
            DataType::DateTime => "TIMESTAMP",
            DataType::Bool => "BOOLEAN",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.bigquery_type())
    }
}

/// A column of a transformation's declared output schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputColumn {
    /// Column name as published in the warehouse
    pub name: String,
    /// Column type as published in the warehouse
    pub data_type: DataType,
}

impl OutputColumn {
    /// Create a new output column
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Int64)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Float64)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, DataType::String)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, DataType::DateTime)
    }

    pub fn time(name: impl Into<String>) -> Self {
        Self::new(name, DataType::Time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(DataType::Int64.bigquery_type(), "INT64");
        assert_eq!(DataType::DateTime.bigquery_type(), "DATETIME");
        assert_eq!(DataType::DateTime.duckdb_type(), "TIMESTAMP");
        assert_eq!(DataType::String.duckdb_type(), "VARCHAR");
    }

    #[test]
    fn test_serde_lowercase() {
        let column = OutputColumn::float("PesoMerma");
        let json = serde_json::to_string(&column).unwrap();
        assert_eq!(json, r#"{"name":"PesoMerma","data_type":"float64"}"#);
    }
}
