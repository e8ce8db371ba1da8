//! Query catalog
//!
//! An ordered, immutable mapping from entity name to the
//! [`TransformationDefinition`] that produces the entity. Iteration follows
//! insertion order so runs and their log output are reproducible.
//!
//! ## Example
//!
//! ```rust
//! use warehouse_etl::catalog::QueryCatalog;
//!
//! let catalog = QueryCatalog::builtin();
//! assert_eq!(catalog.iter().next().unwrap().name(), "DimTiempo");
//! ```

mod calendar;
mod definitions;
mod transform;
mod validate;

pub use calendar::Locale;
pub use definitions::{AUDIT_COLUMN, TIME_KEY_COLUMN, builtin_definitions};
pub use transform::{TIME_DIMENSION_COLUMNS, Transform, TransformContext};
pub use validate::{validate_definition, validate_entity_name, validate_query};

use serde::Serialize;

use crate::error::{EtlError, EtlResult};
use crate::models::{OutputColumn, ResultSet};

/// Placeholder for the configured schema qualifier in query templates
pub const SCHEMA_PLACEHOLDER: &str = "{schema}";

/// Role of an entity in the star schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Descriptive entities keyed by a surrogate key
    Dimension,
    /// Event rows referencing dimensions and carrying measures
    Fact,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Dimension => write!(f, "dimension"),
            EntityKind::Fact => write!(f, "fact"),
        }
    }
}

/// Foreign key column of a fact and the dimension it points into
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionRef {
    /// Column of the fact holding the key
    pub column: String,
    /// Entity name of the referenced dimension
    pub dimension: String,
}

/// A named transformation producing one warehouse table
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationDefinition {
    name: String,
    kind: EntityKind,
    query: String,
    transforms: Vec<Transform>,
    columns: Vec<OutputColumn>,
    references: Vec<DimensionRef>,
}

impl TransformationDefinition {
    /// Create a dimension definition
    pub fn dimension(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(name, EntityKind::Dimension, query)
    }

    /// Create a fact definition
    pub fn fact(name: impl Into<String>, query: impl Into<String>) -> Self {
        Self::new(name, EntityKind::Fact, query)
    }

    fn new(name: impl Into<String>, kind: EntityKind, query: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            query: query.into(),
            transforms: Vec::new(),
            columns: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Append a transform step
    pub fn step(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Declare the output schema (in published column order)
    pub fn columns(mut self, columns: Vec<OutputColumn>) -> Self {
        self.columns = columns;
        self
    }

    /// Declare that `column` holds keys of `dimension`
    pub fn references(mut self, column: &str, dimension: &str) -> Self {
        self.references.push(DimensionRef {
            column: column.to_string(),
            dimension: dimension.to_string(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Raw query template, `{schema}` placeholders included
    pub fn query_template(&self) -> &str {
        &self.query
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn output_columns(&self) -> &[OutputColumn] {
        &self.columns
    }

    pub fn dimension_refs(&self) -> &[DimensionRef] {
        &self.references
    }

    /// Surrogate key column (the first declared column)
    pub fn key_column(&self) -> Option<&str> {
        self.columns.first().map(|c| c.name.as_str())
    }

    /// Expand the template for a schema qualifier
    pub fn render_query(&self, schema: Option<&str>) -> String {
        let prefix = match schema {
            Some(s) if !s.is_empty() => format!("{}.", s),
            _ => String::new(),
        };
        self.query.replace(SCHEMA_PLACEHOLDER, &prefix)
    }

    /// Turn the raw query result into the published rows
    ///
    /// Runs every transform step in order, then projects onto the declared
    /// output columns.
    pub fn apply(&self, mut raw: ResultSet, ctx: &TransformContext) -> EtlResult<ResultSet> {
        for transform in &self.transforms {
            transform.apply(&mut raw, ctx)?;
        }

        let positions: Vec<usize> = self
            .columns
            .iter()
            .map(|c| {
                raw.column_index(&c.name).ok_or_else(|| {
                    EtlError::transform(&c.name, "declared output column missing after transforms")
                })
            })
            .collect::<EtlResult<_>>()?;

        let rows = raw
            .rows
            .into_iter()
            .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(ResultSet {
            columns: self.columns.iter().map(|c| c.name.clone()).collect(),
            rows,
            execution_time_ms: raw.execution_time_ms,
        })
    }
}

/// Ordered set of transformation definitions
#[derive(Debug, Clone, Default)]
pub struct QueryCatalog {
    definitions: Vec<TransformationDefinition>,
}

impl QueryCatalog {
    /// Build a catalog, rejecting duplicate or invalid entries
    pub fn new(definitions: Vec<TransformationDefinition>) -> EtlResult<Self> {
        let mut seen = std::collections::HashSet::new();
        for definition in &definitions {
            if !seen.insert(definition.name().to_string()) {
                return Err(EtlError::Config(format!(
                    "duplicate catalog entity: {}",
                    definition.name()
                )));
            }
            validate_definition(definition)?;
        }
        Ok(Self { definitions })
    }

    /// The dimensional model of the processing plant
    pub fn builtin() -> Self {
        Self {
            definitions: builtin_definitions(),
        }
    }

    /// Keep only the named entities, preserving catalog order
    pub fn select(&self, names: &[String]) -> EtlResult<Self> {
        if let Some(unknown) = names.iter().find(|n| self.get(n).is_none()) {
            return Err(EtlError::Config(format!("unknown catalog entity: {}", unknown)));
        }
        Ok(Self {
            definitions: self
                .definitions
                .iter()
                .filter(|d| names.iter().any(|n| n == d.name()))
                .cloned()
                .collect(),
        })
    }

    /// Look up a definition by entity name
    pub fn get(&self, name: &str) -> Option<&TransformationDefinition> {
        self.definitions.iter().find(|d| d.name() == name)
    }

    /// Definitions in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &TransformationDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Entity names in catalog order
    pub fn names(&self) -> Vec<&str> {
        self.definitions.iter().map(|d| d.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scalar;

    fn turno() -> TransformationDefinition {
        TransformationDefinition::dimension(
            "DimTurno",
            "SELECT idTurno, turno AS Turno FROM {schema}Turno",
        )
        .step(Transform::SurrogateKey {
            source: "idTurno".to_string(),
            target: "TurnoKey".to_string(),
        })
        .columns(vec![
            OutputColumn::int("TurnoKey"),
            OutputColumn::int("idTurno"),
            OutputColumn::string("Turno"),
        ])
    }

    #[test]
    fn test_render_query() {
        let def = turno();
        assert_eq!(
            def.render_query(Some("dbo")),
            "SELECT idTurno, turno AS Turno FROM dbo.Turno"
        );
        assert_eq!(
            def.render_query(None),
            "SELECT idTurno, turno AS Turno FROM Turno"
        );
        assert_eq!(def.render_query(Some("")), def.render_query(None));
    }

    #[test]
    fn test_apply_projects_declared_columns() {
        let raw = ResultSet::from_rows(
            &["turno", "idturno"],
            vec![vec![Scalar::from("Noche"), Scalar::Int(2)]],
        );
        let ctx = TransformContext::now(Locale::Es);
        let out = turno().apply(raw, &ctx).unwrap();
        assert_eq!(out.columns, vec!["TurnoKey", "idTurno", "Turno"]);
        assert_eq!(
            out.rows[0],
            vec![Scalar::Int(2), Scalar::Int(2), Scalar::from("Noche")]
        );
    }

    #[test]
    fn test_apply_reports_missing_declared_column() {
        let def = turno().columns(vec![OutputColumn::string("Nope")]);
        let raw = ResultSet::from_rows(&["idTurno"], vec![vec![Scalar::Int(1)]]);
        let err = def.apply(raw, &TransformContext::now(Locale::Es)).unwrap_err();
        assert!(matches!(err, EtlError::Transform { .. }));
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let result = QueryCatalog::new(vec![turno(), turno()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_catalog_preserves_order_and_selects() {
        let catalog = QueryCatalog::builtin();
        let selected = catalog
            .select(&["HechoParadas".to_string(), "DimTurno".to_string()])
            .unwrap();
        assert_eq!(selected.names(), vec!["DimTurno", "HechoParadas"]);
        assert!(catalog.select(&["Missing".to_string()]).is_err());
    }
}
