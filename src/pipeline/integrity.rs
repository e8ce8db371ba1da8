//! Referential completeness between facts and the dimensions they reference

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::catalog::{EntityKind, TransformationDefinition};
use crate::keys::UNKNOWN_KEY;
use crate::models::ResultSet;

/// Foreign key values of a fact that have no row in their dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanedKeys {
    /// Fact column holding the keys
    pub column: String,
    /// Dimension the column references
    pub dimension: String,
    /// Distinct orphaned values, sorted
    pub values: Vec<String>,
    /// Fact rows carrying one of those values
    pub rows: usize,
}

/// Surrogate keys of the dimensions loaded so far in a run
#[derive(Debug, Default)]
pub struct KeyRegistry {
    keys: HashMap<String, HashSet<String>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the keys of a loaded dimension
    ///
    /// Facts and dimensions without a key column are ignored.
    pub fn record(&mut self, definition: &TransformationDefinition, rows: &ResultSet) {
        if definition.kind() != EntityKind::Dimension {
            return;
        }
        let Some(values) = definition
            .key_column()
            .and_then(|column| rows.column_values(column))
        else {
            return;
        };

        self.keys.insert(
            definition.name().to_string(),
            values.into_iter().map(|v| v.render()).collect(),
        );
    }

    /// Whether a dimension's keys are known
    pub fn contains(&self, dimension: &str) -> bool {
        self.keys.contains_key(dimension)
    }

    /// Check a fact's foreign keys against the recorded dimensions
    ///
    /// The `-1` sentinel always resolves. References into dimensions that
    /// were not loaded in this run cannot be checked and are skipped.
    pub fn check(
        &self,
        definition: &TransformationDefinition,
        rows: &ResultSet,
    ) -> Vec<OrphanedKeys> {
        let unknown = UNKNOWN_KEY.to_string();
        let mut orphans = Vec::new();

        for reference in definition.dimension_refs() {
            let Some(known) = self.keys.get(&reference.dimension) else {
                tracing::debug!(
                    entity = definition.name(),
                    dimension = %reference.dimension,
                    "Dimension not loaded in this run, skipping reference check"
                );
                continue;
            };
            let Some(values) = rows.column_values(&reference.column) else {
                continue;
            };

            let mut distinct = HashSet::new();
            let mut count = 0;
            for value in values.into_iter().map(|v| v.render()) {
                if value != unknown && !known.contains(&value) {
                    count += 1;
                    distinct.insert(value);
                }
            }

            if count > 0 {
                let mut values: Vec<String> = distinct.into_iter().collect();
                values.sort();
                orphans.push(OrphanedKeys {
                    column: reference.column.clone(),
                    dimension: reference.dimension.clone(),
                    values,
                    rows: count,
                });
            }
        }
        orphans
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutputColumn, Scalar};

    fn dim() -> TransformationDefinition {
        TransformationDefinition::dimension("DimTurno", "SELECT 1")
            .columns(vec![OutputColumn::int("TurnoKey"), OutputColumn::string("Turno")])
    }

    fn fact() -> TransformationDefinition {
        TransformationDefinition::fact("HechoX", "SELECT 1")
            .columns(vec![OutputColumn::int("XKey"), OutputColumn::int("TurnoKey")])
            .references("TurnoKey", "DimTurno")
    }

    #[test]
    fn test_sentinel_and_known_keys_resolve() {
        let mut registry = KeyRegistry::new();
        registry.record(
            &dim(),
            &ResultSet::from_rows(
                &["TurnoKey", "Turno"],
                vec![
                    vec![Scalar::Int(1), Scalar::from("Mañana")],
                    vec![Scalar::Int(2), Scalar::from("Tarde")],
                ],
            ),
        );
        assert!(registry.contains("DimTurno"));

        let rows = ResultSet::from_rows(
            &["XKey", "TurnoKey"],
            vec![
                vec![Scalar::Int(1), Scalar::Int(1)],
                vec![Scalar::Int(2), Scalar::Int(-1)],
                vec![Scalar::Int(3), Scalar::Int(7)],
                vec![Scalar::Int(4), Scalar::Int(7)],
            ],
        );
        let orphans = registry.check(&fact(), &rows);
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].values, vec!["7".to_string()]);
        assert_eq!(orphans[0].rows, 2);
    }

    #[test]
    fn test_unloaded_dimension_is_not_checked() {
        let registry = KeyRegistry::new();
        let rows = ResultSet::from_rows(
            &["XKey", "TurnoKey"],
            vec![vec![Scalar::Int(1), Scalar::Int(99)]],
        );
        assert!(registry.check(&fact(), &rows).is_empty());
    }
}
